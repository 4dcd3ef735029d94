//! Scroll handling: keeping the active bar in view, and the page's
//! scroll-spy and floating-button placement.

use crate::host::{Page, Rect, ScoreSurface};
use crate::score::ElementId;

pub const DEFAULT_HEADER_HEIGHT: f64 = 120.0;
pub const DEFAULT_SCROLL_PADDING: f64 = 32.0;
pub const DEFAULT_TOP_TOLERANCE: f64 = 50.0;
/// Gap between the header and the ideal SVG position.
const TOP_GAP: f64 = 20.0;

/// Vertical extent of a set of elements: `(min top, max bottom)`.
pub fn vertical_bounds(surface: &dyn ScoreSurface, elements: &[ElementId]) -> Option<(f64, f64)> {
    elements
        .iter()
        .filter_map(|&element| surface.bounding_rect(element))
        .fold(None, |bounds, Rect { top, bottom, .. }| match bounds {
            None => Some((top, bottom)),
            Some((min_top, max_bottom)) => Some((min_top.min(top), max_bottom.max(bottom))),
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoScroll {
    pub header_height: f64,
    pub padding: f64,
}

impl Default for AutoScroll {
    fn default() -> Self {
        Self {
            header_height: DEFAULT_HEADER_HEIGHT,
            padding: DEFAULT_SCROLL_PADDING,
        }
    }
}

impl AutoScroll {
    /// Scroll target for a bar spanning `bounds`, or `None` if the bar is
    /// already fully visible below the fixed header.
    pub fn target(&self, bar: u32, bounds: (f64, f64), scroll_y: f64, inner_height: f64) -> Option<f64> {
        let (top, bottom) = bounds;
        let visible_top = self.header_height + self.padding;
        let visible_bottom = inner_height - self.padding;
        if top >= visible_top && bottom <= visible_bottom {
            return None;
        }
        if bar == 0 {
            return Some(0.0);
        }
        Some(top + scroll_y - self.header_height - self.padding)
    }

    /// Smooth-scroll the page so `bar` is visible. Returns whether a scroll
    /// was requested.
    pub fn scroll_to_bar(
        &self,
        bar: u32,
        elements: &[ElementId],
        surface: &dyn ScoreSurface,
        page: &mut dyn Page,
    ) -> bool {
        let Some(bounds) = vertical_bounds(surface, elements) else {
            return false;
        };
        match self.target(bar, bounds, page.scroll_y(), page.inner_height()) {
            Some(top) => {
                page.scroll_to(top);
                true
            }
            None => false,
        }
    }
}

/// Detects whether the score sits at its resting position under the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSpy {
    pub header_height: f64,
    pub tolerance: f64,
}

impl Default for ScrollSpy {
    fn default() -> Self {
        Self {
            header_height: DEFAULT_HEADER_HEIGHT,
            tolerance: DEFAULT_TOP_TOLERANCE,
        }
    }
}

impl ScrollSpy {
    pub fn is_at_top(&self, score_top: f64) -> bool {
        let optimal = self.header_height + TOP_GAP;
        (optimal - self.tolerance..=optimal + self.tolerance).contains(&score_top)
    }
}

/// Right offset for floating buttons so they hug the score's right edge.
pub fn button_right_offset(inner_width: f64, score_right: f64, button_width: f64) -> f64 {
    (inner_width - score_right - button_width).max(0.0).ceil()
}
