//! # Host Boundary
//!
//! The page that embeds the player owns the audio element, the rendered SVG,
//! the window and the animation-frame loop. The engine reaches them only
//! through the traits here, so the same code drives a browser (see the
//! `hyplayer-wasm` package) or an in-memory test double.
//!
//! Event delivery is inverted: the engine subscribes through `add_listener`
//! and keeps the returned [`ListenerId`]; the host calls back into the engine
//! with the event kind whenever that listener fires. Every subscription is
//! released by `cleanup`, so a host can verify that listener counts return
//! to their previous value.

use crate::score::ElementId;

/// Handle of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Handle of one requested animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(pub u64);

/// Notifications from the audio element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaEvent {
    Play,
    Pause,
    Seeking,
    Seeked,
    /// Duration became known.
    LoadedMetadata,
    Ended,
}

impl MediaEvent {
    pub const ALL: [MediaEvent; 6] = [
        MediaEvent::Play,
        MediaEvent::Pause,
        MediaEvent::Seeking,
        MediaEvent::Seeked,
        MediaEvent::LoadedMetadata,
        MediaEvent::Ended,
    ];

    /// DOM event name.
    pub fn name(self) -> &'static str {
        match self {
            MediaEvent::Play => "play",
            MediaEvent::Pause => "pause",
            MediaEvent::Seeking => "seeking",
            MediaEvent::Seeked => "seeked",
            MediaEvent::LoadedMetadata => "loadedmetadata",
            MediaEvent::Ended => "ended",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }
}

/// Window-level notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageEvent {
    Resize,
    Scroll,
}

impl PageEvent {
    pub fn name(self) -> &'static str {
        match self {
            PageEvent::Resize => "resize",
            PageEvent::Scroll => "scroll",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "resize" => Some(PageEvent::Resize),
            "scroll" => Some(PageEvent::Scroll),
            _ => None,
        }
    }
}

/// Viewport-relative bounding box, as `getBoundingClientRect` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// UI counters the page displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    CurrentBar,
    TotalBars,
}

/// The audio element. The engine reads its clock and state; `pause` and
/// `set_current_time` are only used by the host adapter when switching works.
pub trait MediaElement {
    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// `None` until metadata has loaded.
    fn duration(&self) -> Option<f64>;
    fn is_paused(&self) -> bool;
    fn pause(&mut self);
    fn add_listener(&mut self, event: MediaEvent) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);
}

/// The rendered score.
pub trait ScoreSurface {
    fn add_class(&mut self, element: ElementId, class: &str);
    fn remove_class(&mut self, element: ElementId, class: &str);
    /// Set an inline style property, or clear it with `None`.
    fn set_style(&mut self, element: ElementId, property: &str, value: Option<&str>);
    fn bounding_rect(&self, element: ElementId) -> Option<Rect>;
}

/// The window and page chrome around the score.
pub trait Page {
    fn scroll_y(&self) -> f64;
    fn inner_height(&self) -> f64;
    fn inner_width(&self) -> f64;
    /// Smooth-scroll the window so its top edge sits at `top`.
    fn scroll_to(&mut self, top: f64);
    /// Bounding box of the SVG root, if it is in the document.
    fn score_rect(&self) -> Option<Rect>;
    fn set_body_class(&mut self, class: &str, enabled: bool);
    fn set_counter(&mut self, counter: Counter, value: u32);
    /// Show the single user-facing error panel.
    fn show_error(&mut self, message: &str);
    fn hide_error(&mut self);
    /// Show or hide the loading overlay shown while a work switch runs.
    fn set_loading(&mut self, visible: bool);
    fn add_listener(&mut self, event: PageEvent) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);

    /// Width of the floating scroll-to-top button.
    fn button_width(&self) -> f64 {
        0.0
    }

    /// Distance of the floating buttons from the right window edge.
    fn set_button_offset(&mut self, _right: f64) {}
}

/// Animation-frame scheduling (`requestAnimationFrame`).
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Everything the engine touches, borrowed for the duration of one call.
pub struct Host<'a> {
    pub media: &'a mut dyn MediaElement,
    pub surface: &'a mut dyn ScoreSurface,
    pub page: &'a mut dyn Page,
    pub frames: &'a mut dyn FrameScheduler,
}

impl<'a> Host<'a> {
    pub fn new(
        media: &'a mut dyn MediaElement,
        surface: &'a mut dyn ScoreSurface,
        page: &'a mut dyn Page,
        frames: &'a mut dyn FrameScheduler,
    ) -> Self {
        Self {
            media,
            surface,
            page,
            frames,
        }
    }
}
