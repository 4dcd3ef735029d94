//! # Highlighter
//!
//! Two independent visual layers live on the score:
//!
//! 1. **Playback highlight** - additive emphasis on the note elements that are
//!    sounding, driven every frame by the synchronizer. An element gets the
//!    [`ACTIVE_CLASS`] class and an inline fill in its channel color.
//! 2. **Structures** - named overlay rules that tint bar elements regardless
//!    of playback. Structures are mutually exclusive: applying one clears the
//!    previous one first.
//!
//! ## Structure kinds
//! - `alternating` - color `(bar - 1) mod colors`
//! - `conditional` - color index from a named condition
//!   (`line-starts`, `modulo`, `specific-bars`)
//! - `ranges` - first inclusive `[start, end]` range containing the bar
//!
//! ## Example
//! ```rust
//! use hyplayer::highlight::{Structure, StructureConfig};
//!
//! let config: StructureConfig = serde_yaml::from_str(r##"
//! type: alternating
//! colors: ["#ff0000", "#0000ff"]
//! "##).unwrap();
//! let structure = Structure::from_config("phrases", &config).unwrap();
//!
//! let fills: Vec<String> = (1..=4)
//!     .map(|bar| structure.style_for_bar(bar).unwrap().fill)
//!     .collect();
//! assert_eq!(fills, ["#ff0000", "#0000ff", "#ff0000", "#0000ff"]);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::colors::{ChannelColors, FALLBACK_COLOR};
use crate::error::PlayerWarning;
use crate::host::ScoreSurface;
use crate::score::ElementId;
use crate::timecode::BarCache;

/// Class carried by sounding note elements.
pub const ACTIVE_CLASS: &str = "active";
pub const DEFAULT_OPACITY: &str = "0.3";

const FILL: &str = "fill";
const FILL_OPACITY: &str = "fill-opacity";

/// Structure as written in the work configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructureConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub opacity: Option<Opacity>,
    #[serde(default)]
    pub condition: Option<ConditionConfig>,
    #[serde(default)]
    pub ranges: Vec<RangeConfig>,
}

/// Opacity written either as a number or as CSS text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Opacity {
    Number(f64),
    Text(String),
}

impl Opacity {
    fn to_css(&self) -> String {
        match self {
            Opacity::Number(value) => value.to_string(),
            Opacity::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub bars: Vec<i64>,
    #[serde(default)]
    pub divisor: Option<i64>,
    #[serde(default)]
    pub remainder: i64,
    #[serde(default, alias = "defaultIndex")]
    pub default_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub start: i64,
    pub end: i64,
    pub color: String,
}

/// Rule deciding which color slot a bar uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Listed bars use slot 0, all others slot 1.
    LineStarts(Vec<i64>),
    /// `bar % divisor == remainder` uses slot 0, all others slot 1.
    Modulo { divisor: i64, remainder: i64 },
    /// Listed bars use slot 1, all others `default_index`.
    SpecificBars { bars: Vec<i64>, default_index: usize },
    /// Always slot 0.
    Unknown(String),
}

impl Condition {
    /// Convert a configured condition. Unknown kinds are logged here, once.
    pub fn from_config(config: &ConditionConfig) -> Self {
        match config.kind.as_str() {
            "line-starts" => Condition::LineStarts(config.bars.clone()),
            // A zero or missing divisor never matches.
            "modulo" => Condition::Modulo {
                divisor: config.divisor.unwrap_or(0),
                remainder: config.remainder,
            },
            "specific-bars" => Condition::SpecificBars {
                bars: config.bars.clone(),
                default_index: config.default_index,
            },
            other => {
                PlayerWarning::UnknownCondition(other.to_string()).log();
                Condition::Unknown(other.to_string())
            }
        }
    }

    pub fn evaluate(&self, bar: i64) -> usize {
        match self {
            Condition::LineStarts(bars) => usize::from(!bars.contains(&bar)),
            Condition::Modulo { divisor, remainder } => {
                let matches = *divisor != 0 && bar % divisor == *remainder;
                usize::from(!matches)
            }
            Condition::SpecificBars {
                bars,
                default_index,
            } => {
                if bars.contains(&bar) {
                    1
                } else {
                    *default_index
                }
            }
            Condition::Unknown(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructureRule {
    Alternating { colors: Vec<String> },
    Conditional { colors: Vec<String>, condition: Condition },
    Ranges { ranges: Vec<RangeConfig> },
}

/// Inline style a structure gives one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarStyle {
    pub fill: String,
    pub fill_opacity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub display_name: Option<String>,
    pub opacity: String,
    pub rule: StructureRule,
}

impl Structure {
    pub fn from_config(name: &str, config: &StructureConfig) -> Result<Self, PlayerWarning> {
        let rule = match config.kind.as_str() {
            "alternating" => StructureRule::Alternating {
                colors: config.colors.clone(),
            },
            "conditional" => {
                let condition = match &config.condition {
                    Some(condition) => Condition::from_config(condition),
                    None => {
                        PlayerWarning::UnknownCondition("<missing>".to_string()).log();
                        Condition::Unknown("<missing>".to_string())
                    }
                };
                StructureRule::Conditional {
                    colors: config.colors.clone(),
                    condition,
                }
            }
            "ranges" => StructureRule::Ranges {
                ranges: config.ranges.clone(),
            },
            other => {
                return Err(PlayerWarning::UnknownStructureKind {
                    name: name.to_string(),
                    kind: other.to_string(),
                })
            }
        };

        Ok(Structure {
            display_name: config.name.clone(),
            opacity: config
                .opacity
                .as_ref()
                .map(Opacity::to_css)
                .unwrap_or_else(|| DEFAULT_OPACITY.to_string()),
            rule,
        })
    }

    /// Style for `bar`, or `None` when the rule leaves the bar unstyled.
    pub fn style_for_bar(&self, bar: i64) -> Option<BarStyle> {
        let fill = match &self.rule {
            StructureRule::Alternating { colors } => {
                if colors.is_empty() {
                    return None;
                }
                let slot = ((bar - 1) % colors.len() as i64).unsigned_abs() as usize;
                colors[slot].clone()
            }
            StructureRule::Conditional { colors, condition } => {
                colors.get(condition.evaluate(bar))?.clone()
            }
            StructureRule::Ranges { ranges } => ranges
                .iter()
                .find(|range| (range.start..=range.end).contains(&bar))?
                .color
                .clone(),
        };
        Some(BarStyle {
            fill,
            fill_opacity: self.opacity.clone(),
        })
    }
}

/// Display name for a structure key without a configured name:
/// first letter upper-cased, first `-` turned into a space.
fn default_display_name(key: &str) -> String {
    let mut chars = key.chars();
    let mut name = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if let Some(dash) = name.find('-') {
        name.replace_range(dash..dash + 1, " ");
    }
    name
}

#[derive(Debug, Clone, Default)]
pub struct Highlighter {
    colors: ChannelColors,
    lit: BTreeMap<ElementId, u32>,
    structures: BTreeMap<String, Structure>,
    applied: Option<String>,
    styled: Vec<ElementId>,
}

impl Highlighter {
    pub fn new(colors: ChannelColors) -> Self {
        Self {
            colors,
            ..Default::default()
        }
    }

    pub fn color_for(&self, channel: u32) -> &str {
        self.colors
            .get(&channel)
            .map(String::as_str)
            .unwrap_or(FALLBACK_COLOR)
    }

    pub fn channel_colors(&self) -> &ChannelColors {
        &self.colors
    }

    /// Elements currently carrying the playback highlight, with their channel.
    pub fn highlighted(&self) -> &BTreeMap<ElementId, u32> {
        &self.lit
    }

    pub fn highlight(&mut self, surface: &mut dyn ScoreSurface, elements: &[ElementId], channel: u32) {
        let color = self.color_for(channel).to_string();
        for &element in elements {
            match self.lit.insert(element, channel) {
                Some(previous) if previous == channel => {}
                Some(_) => surface.set_style(element, FILL, Some(&color)),
                None => {
                    surface.add_class(element, ACTIVE_CLASS);
                    surface.set_style(element, FILL, Some(&color));
                }
            }
        }
    }

    pub fn unhighlight(&mut self, surface: &mut dyn ScoreSurface, elements: &[ElementId]) {
        for element in elements {
            if self.lit.remove(element).is_some() {
                surface.remove_class(*element, ACTIVE_CLASS);
                surface.set_style(*element, FILL, None);
            }
        }
    }

    pub fn remove_all_highlights(&mut self, surface: &mut dyn ScoreSurface) {
        for element in std::mem::take(&mut self.lit).into_keys() {
            surface.remove_class(element, ACTIVE_CLASS);
            surface.set_style(element, FILL, None);
        }
    }

    /// Register a structure. Unknown kinds are logged and not registered.
    pub fn add_structure(&mut self, name: &str, config: &StructureConfig) -> bool {
        match Structure::from_config(name, config) {
            Ok(structure) => {
                self.structures.insert(name.to_string(), structure);
                true
            }
            Err(warning) => {
                warning.log();
                false
            }
        }
    }

    pub fn structure_names(&self) -> Vec<&str> {
        self.structures.keys().map(String::as_str).collect()
    }

    pub fn structure_display_name(&self, name: &str) -> String {
        self.structures
            .get(name)
            .and_then(|structure| structure.display_name.clone())
            .unwrap_or_else(|| default_display_name(name))
    }

    pub fn applied_structure(&self) -> Option<&str> {
        self.applied.as_deref()
    }

    /// Clear any applied structure, then style every cached bar element with
    /// `name`. Returns the number of elements styled.
    pub fn apply_structure(
        &mut self,
        surface: &mut dyn ScoreSurface,
        bars: &BarCache,
        name: &str,
    ) -> usize {
        self.clear_structures(surface);

        let Some(structure) = self.structures.get(name) else {
            PlayerWarning::UnknownStructure(name.to_string()).log();
            return 0;
        };

        for entry in bars.iter() {
            let Some(style) = structure.style_for_bar(i64::from(entry.bar)) else {
                continue;
            };
            for &element in &entry.elements {
                surface.set_style(element, FILL, Some(&style.fill));
                surface.set_style(element, FILL_OPACITY, Some(&style.fill_opacity));
                self.styled.push(element);
            }
        }
        debug!(structure = name, elements = self.styled.len(), "Applied structure");
        self.applied = Some(name.to_string());
        self.styled.len()
    }

    /// Remove structure styling from the score; registered structures stay.
    pub fn clear_structures(&mut self, surface: &mut dyn ScoreSurface) {
        for element in self.styled.drain(..) {
            surface.set_style(element, FILL, None);
            surface.set_style(element, FILL_OPACITY, None);
        }
        self.applied = None;
    }

    /// Forget every structure, for work switching.
    pub fn clear_all_structures(&mut self, surface: &mut dyn ScoreSurface) {
        self.clear_structures(surface);
        self.structures.clear();
    }
}
