//! Channel to color mapping.
//!
//! Colors come from the theme: an ordered list of color slots. Channels are
//! sorted before assignment so that the same channel set and palette always
//! yield the same mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Used only when a palette has no slots at all.
pub const FALLBACK_COLOR: &str = "#e53935";

/// CSS custom-property prefix for theme color slots, e.g. `--channel-color-0`.
pub const CSS_SLOT_PREFIX: &str = "--channel-color-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemePalette {
    colors: Vec<String>,
}

impl Default for ThemePalette {
    fn default() -> Self {
        Self::new([
            "#e53935", "#1e88e5", "#43a047", "#fb8c00", "#8e24aa", "#00acc1", "#6d4c41",
            "#3949ab",
        ])
    }
}

impl ThemePalette {
    pub fn new<I, S>(colors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            colors: colors.into_iter().map(Into::into).collect(),
        }
    }

    /// Read color slots from stylesheet text.
    ///
    /// Declarations like `--channel-color-2: #43a047;` are collected and
    /// ordered by slot number. Anything else in the text is ignored.
    pub fn from_css(css: &str) -> Self {
        let mut slots: BTreeMap<u32, String> = BTreeMap::new();
        for declaration in css.split([';', '{', '}']) {
            let Some((name, value)) = declaration.split_once(':') else {
                continue;
            };
            let Some(slot) = name.trim().strip_prefix(CSS_SLOT_PREFIX) else {
                continue;
            };
            let value = value.trim();
            if let (Ok(slot), false) = (slot.parse::<u32>(), value.is_empty()) {
                slots.insert(slot, value.to_string());
            }
        }
        Self {
            colors: slots.into_values().collect(),
        }
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Channel number to display color.
pub type ChannelColors = BTreeMap<u32, String>;

/// Assign every channel a color, wrapping around the palette when there are
/// more channels than slots.
pub fn map_channels_to_colors<I>(channel_ids: I, palette: &ThemePalette) -> ChannelColors
where
    I: IntoIterator<Item = u32>,
{
    let mut channels: Vec<u32> = channel_ids.into_iter().collect();
    channels.sort_unstable();
    channels.dedup();

    channels
        .into_iter()
        .enumerate()
        .map(|(slot, channel)| {
            let color = if palette.is_empty() {
                FALLBACK_COLOR.to_string()
            } else {
                palette.colors[slot % palette.colors.len()].clone()
            };
            (channel, color)
        })
        .collect()
}

pub fn log_channel_mapping(mapping: &ChannelColors) {
    for (channel, color) in mapping {
        debug!(channel, color = %color, "Channel color");
    }
}
