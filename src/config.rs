//! Configuration.
//!
//! Two files feed the player:
//!
//! - [`PlayerConfig`]: engine tunables in TOML. Every key is optional, and a
//!   missing or invalid file falls back to the defaults so a page can still
//!   play.
//! - [`WorkConfig`]: one entry per work in YAML (camelCase keys), naming its
//!   assets, its bar count and any structure overlays. Unlike the player
//!   config, a broken work config is an error.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::colors::ThemePalette;
use crate::error::PlayerError;
use crate::highlight::StructureConfig;
use crate::scroll::{AutoScroll, ScrollSpy};
use crate::sync::SyncOptions;

/// Engine tunables; deserializable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_header_height")]
    pub header_height: f64,
    #[serde(default = "default_scroll_padding")]
    pub scroll_padding: f64,
    #[serde(default = "default_debounce_quiet_ms")]
    pub debounce_quiet_ms: u64,
    #[serde(default = "default_highlight_margin_seconds")]
    pub highlight_margin_seconds: f64,
    #[serde(default = "default_mobile_lead_time_seconds")]
    pub mobile_lead_time_seconds: f64,
    #[serde(default = "default_svg_top_tolerance")]
    pub svg_top_tolerance: f64,
    #[serde(default)]
    pub theme_palette: ThemePalette,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            header_height: default_header_height(),
            scroll_padding: default_scroll_padding(),
            debounce_quiet_ms: default_debounce_quiet_ms(),
            highlight_margin_seconds: default_highlight_margin_seconds(),
            mobile_lead_time_seconds: default_mobile_lead_time_seconds(),
            svg_top_tolerance: default_svg_top_tolerance(),
            theme_palette: ThemePalette::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl PlayerConfig {
    pub fn debounce_quiet(&self) -> Duration {
        Duration::from_millis(self.debounce_quiet_ms)
    }

    pub fn auto_scroll(&self) -> AutoScroll {
        AutoScroll {
            header_height: self.header_height,
            padding: self.scroll_padding,
        }
    }

    pub fn scroll_spy(&self) -> ScrollSpy {
        ScrollSpy {
            header_height: self.header_height,
            tolerance: self.svg_top_tolerance,
        }
    }

    /// Take channel colors from the page's stylesheet. A stylesheet without
    /// any color slots leaves the configured palette in place.
    pub fn apply_theme_css(&mut self, css: &str) -> bool {
        let palette = ThemePalette::from_css(css);
        if palette.is_empty() {
            return false;
        }
        debug!(slots = palette.colors().len(), "Using theme color slots");
        self.theme_palette = palette;
        true
    }

    /// Synchronizer options for one work. The work's own lead time, when set,
    /// overrides the time-code document's.
    pub fn sync_options(&self, work: &WorkConfig) -> SyncOptions {
        SyncOptions {
            lead_time: work.musical_structure.visual_lead_time_seconds,
            highlight_margin: self.highlight_margin_seconds,
            mobile_adjustment: self.mobile_lead_time_seconds,
            resize_quiet: self.debounce_quiet(),
            scroll: self.auto_scroll(),
        }
    }
}

fn default_header_height() -> f64 {
    120.0
}

fn default_scroll_padding() -> f64 {
    32.0
}

fn default_debounce_quiet_ms() -> u64 {
    50
}

fn default_highlight_margin_seconds() -> f64 {
    0.015
}

fn default_mobile_lead_time_seconds() -> f64 {
    0.2
}

fn default_svg_top_tolerance() -> f64 {
    50.0
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Parse player configuration from TOML text.
pub fn parse_config(source: &str) -> Result<PlayerConfig, PlayerError> {
    toml::from_str(source).map_err(|err| PlayerError::InvalidConfig(err.to_string()))
}

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> PlayerConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded player config");
            data
        }
        Err(err) => {
            warn!(path = %path.display(), "Falling back to default config: {err}");
            return PlayerConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            debug!("Parsed player configuration");
            config
        }
        Err(err) => {
            warn!(path = %path.display(), "{err}");
            PlayerConfig::default()
        }
    }
}

/// Per-work metadata, as listed in the work catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkConfig {
    pub work_info: WorkInfo,
    pub urls: WorkUrls,
    pub musical_structure: MusicalStructure,
    #[serde(default)]
    pub measure_highlighters: BTreeMap<String, StructureConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkInfo {
    pub work_id: String,
    pub title: String,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub work_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUrls {
    /// Absent or empty for entries without a recording.
    #[serde(default)]
    pub audio: Option<String>,
    pub svg: String,
    pub sync: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicalStructure {
    pub total_measures: u32,
    #[serde(default)]
    pub total_duration_seconds: Option<f64>,
    #[serde(default)]
    pub visual_lead_time_seconds: Option<f64>,
}

impl WorkConfig {
    pub fn from_yaml(source: &str) -> Result<Self, PlayerError> {
        let work: WorkConfig = serde_yaml::from_str(source)
            .map_err(|err| PlayerError::InvalidConfig(format!("work config: {err}")))?;
        work.validate()?;
        Ok(work)
    }

    /// Parse a catalog: a YAML sequence of works.
    pub fn catalog_from_yaml(source: &str) -> Result<Vec<Self>, PlayerError> {
        let works: Vec<WorkConfig> = serde_yaml::from_str(source)
            .map_err(|err| PlayerError::InvalidConfig(format!("work catalog: {err}")))?;
        for work in &works {
            work.validate()?;
        }
        Ok(works)
    }

    fn validate(&self) -> Result<(), PlayerError> {
        if self.work_info.work_id.trim().is_empty() {
            return Err(PlayerError::InvalidConfig("workInfo.workId is empty".to_string()));
        }
        if let Some(lead) = self.musical_structure.visual_lead_time_seconds {
            if !lead.is_finite() {
                return Err(PlayerError::InvalidConfig(format!(
                    "{}: visualLeadTimeSeconds must be finite",
                    self.work_info.work_id
                )));
            }
        }
        Ok(())
    }

    /// `Title (Instrument)`, or just the title.
    pub fn display_title(&self) -> String {
        match &self.work_info.instrument {
            Some(instrument) if !instrument.is_empty() => {
                format!("{} ({instrument})", self.work_info.title)
            }
            _ => self.work_info.title.clone(),
        }
    }

    /// Audio URL, treating an empty string as absent.
    pub fn audio_url(&self) -> Option<&str> {
        self.urls.audio.as_deref().filter(|url| !url.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: &str = r##"
workInfo:
  workId: bach-minuet
  title: Minuet in G
  instrument: Piano
  workType: Score
urls:
  audio: audio/minuet.mp3
  svg: svg/minuet.svg
  sync: sync/minuet.yaml
musicalStructure:
  totalMeasures: 32
  totalDurationSeconds: 95.5
  visualLeadTimeSeconds: 0.1
measureHighlighters:
  phrases:
    type: alternating
    colors: ["#ffcdd2", "#c8e6c9"]
"##;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.debounce_quiet(), Duration::from_millis(50));
        assert_eq!(config.theme_palette.colors().len(), 8);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = parse_config(
            r##"
header_height = 80
theme_palette = ["#000000", "#ffffff"]
log_level = "debug"
"##,
        )
        .unwrap();
        assert_eq!(config.header_height, 80.0);
        assert_eq!(config.scroll_padding, 32.0);
        assert_eq!(config.theme_palette.colors(), ["#000000", "#ffffff"]);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_theme_css_replaces_palette() {
        let mut config = PlayerConfig::default();
        let css = ":root { --channel-color-1: #222222; --channel-color-0: #111111; }";
        assert!(config.apply_theme_css(css));
        assert_eq!(config.theme_palette.colors(), ["#111111", "#222222"]);

        assert!(!config.apply_theme_css("body { color: red; }"));
        assert_eq!(config.theme_palette.colors().len(), 2);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            parse_config("header_height = \"tall\""),
            Err(PlayerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/hyplayer.toml"));
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_work_config() {
        let work = WorkConfig::from_yaml(WORK).unwrap();
        assert_eq!(work.display_title(), "Minuet in G (Piano)");
        assert_eq!(work.musical_structure.total_measures, 32);
        assert_eq!(work.audio_url(), Some("audio/minuet.mp3"));
        assert_eq!(work.measure_highlighters["phrases"].kind, "alternating");

        let options = PlayerConfig::default().sync_options(&work);
        assert_eq!(options.lead_time, Some(0.1));
        assert_eq!(options.highlight_margin, 0.015);
    }

    #[test]
    fn test_work_without_audio() {
        let source = WORK.replace("audio: audio/minuet.mp3", "audio: \"\"");
        let work = WorkConfig::from_yaml(&source).unwrap();
        assert_eq!(work.audio_url(), None);
    }

    #[test]
    fn test_work_missing_section_is_error() {
        let result = WorkConfig::from_yaml("workInfo:\n  workId: x\n  title: X\n");
        assert!(matches!(result, Err(PlayerError::InvalidConfig(_))));
    }

    #[test]
    fn test_catalog() {
        let catalog = format!("- {}", WORK.trim_start().replace('\n', "\n  "));
        let works = WorkConfig::catalog_from_yaml(&catalog).unwrap();
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].work_info.work_id, "bach-minuet");
    }
}
