pub mod colors;
pub mod config;
pub mod debounce;
pub mod device;
pub mod error;
pub mod highlight;
pub mod host;
pub mod player;
pub mod score;
pub mod scroll;
pub mod sync;
pub mod timecode;

pub use colors::{map_channels_to_colors, ChannelColors, ThemePalette};
pub use config::{load_config, PlayerConfig, WorkConfig};
pub use device::{DeviceClassifier, StaticDevice, UserAgentClassifier};
pub use error::*;
pub use highlight::Highlighter;
pub use host::Host;
pub use player::{Player, WorkAssets};
pub use score::{ElementId, ScoreIndex};
pub use sync::{SyncCallbacks, SyncOptions, SyncPhase, SyncStats, Synchronizer};
pub use timecode::{TimeCodeDocument, TimeCodeStore};

/// Parse a time-code document and index it against an optional SVG score.
/// This is the main entry point for offline inspection.
pub fn load_store(timecode: &str, svg: Option<&str>) -> Result<TimeCodeStore, PlayerError> {
    let document = TimeCodeDocument::from_yaml(timecode)?;
    let score = match svg {
        Some(markup) => ScoreIndex::parse(markup)?,
        None => ScoreIndex::default(),
    };
    TimeCodeStore::build_with_score(&document, &score)
}
