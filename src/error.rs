//! # Error Types
//!
//! Two tiers of failure exist in the player:
//!
//! - [`PlayerError`] is fatal. Anything that would corrupt the derived
//!   time-code index (missing `meta`/`flow`, a flow entry of unknown shape)
//!   aborts the load, and no synchronizer is ever attached.
//! - [`PlayerWarning`] is confined to one visual element or one optional
//!   overlay. It is logged through `tracing` and the player degrades to a safe
//!   default instead of returning it.
//!
//! ## Usage
//! ```rust
//! use hyplayer::{PlayerError, TimeCodeDocument};
//!
//! match TimeCodeDocument::from_yaml("flow: []") {
//!     Err(PlayerError::MalformedTimeCode(message)) => {
//!         assert!(message.contains("meta"));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// The time-code document is missing a required section or contains a
    /// flow entry that is neither a bar marker nor a note marker.
    ///
    /// # Example
    /// ```
    /// # use hyplayer::PlayerError;
    /// let err = PlayerError::MalformedTimeCode("Sync data missing \"flow\" section".to_string());
    /// assert_eq!(err.to_string(), "Malformed time-code document: Sync data missing \"flow\" section");
    /// ```
    #[error("Malformed time-code document: {0}")]
    MalformedTimeCode(String),

    /// A score, audio or sync asset could not be obtained or read.
    #[error("Failed to load {asset}: {message}")]
    AssetLoad { asset: String, message: String },

    /// The work or player configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The synchronizer was cleaned up and cannot be driven again.
    #[error("Synchronizer has been disposed")]
    Disposed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    pub fn asset(asset: impl Into<String>, message: impl Into<String>) -> Self {
        PlayerError::AssetLoad {
            asset: asset.into(),
            message: message.into(),
        }
    }
}

/// Non-fatal conditions. These are logged, never thrown.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerWarning {
    #[error("Structure '{0}' not found")]
    UnknownStructure(String),

    #[error("Structure '{name}' has unknown type '{kind}'")]
    UnknownStructureKind { name: String, kind: String },

    #[error("Unknown condition type: {0}")]
    UnknownCondition(String),

    #[error("No score element carries data-ref=\"{0}\"")]
    MissingElement(String),

    #[error("Skipping malformed note event #{index}: {reason}")]
    MalformedNote { index: usize, reason: String },
}

impl PlayerWarning {
    /// Emit the warning on the `tracing` pipeline.
    pub fn log(&self) {
        tracing::warn!("{self}");
    }
}
