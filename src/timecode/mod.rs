//! # Time-Code Module
//!
//! Turns the time-code document (the pre-generated file pairing audio
//! timestamps with score element references) into an index the synchronizer
//! can query every animation frame.
//!
//! ## Sub-modules
//! - `document` - raw document parsing and flow-entry classification
//! - `store` - the immutable [`TimeCodeStore`] and its [`BarCache`]
//!
//! ## Lookups
//! - [`TimeCodeStore::measure_at`] - binary search over sorted bar boundaries
//! - [`TimeCodeStore::elements_for_measure`] - O(1) bar-cache access
//! - [`TimeCodeStore::active_notes_in_window`] - binary search bounded by the
//!   longest note, then a short linear filter
//!
//! ## Example
//! ```rust
//! use hyplayer::timecode::{TimeCodeDocument, TimeCodeStore};
//!
//! let source = r#"
//! meta: { firstBar: 1, totalBars: 3, leadTimeSeconds: 0.0 }
//! flow:
//!   - [0, 1]
//!   - [10, 2]
//!   - [12, 0, ["n1"], 13]
//!   - [20, 3]
//! "#;
//!
//! let document = TimeCodeDocument::from_yaml(source).unwrap();
//! let store = TimeCodeStore::build(&document).unwrap();
//!
//! assert_eq!(store.measure_at(15.0), 2);
//! assert_eq!(store.active_notes_in_window(11.5, 12.5).len(), 1);
//! assert!(store.active_notes_in_window(13.5, 14.0).is_empty());
//! ```
//!
//! ## Ordering
//! The flow is expected in time order but is sorted (stably) anyway. Bar
//! markers sharing a timestamp resolve to the later one in document order.

mod document;
mod store;


pub use document::{BarMarker, FlowEvent, NoteEvent, TimeCodeDocument, TimeCodeMeta};
pub use store::{BarCache, BarCacheEntry, TimeCodeStore, TimedNote, MAX_BARS};
