//! # Synchronizer
//!
//! Follows the audio element and mirrors its position onto the score:
//! the current bar, the sounding notes and the scroll position.
//!
//! ```text
//! Idle ──loadedmetadata──▶ Ready ──play──▶ Playing ⇄ Paused
//!                                              │        │
//!                                              └─stop()─┴──▶ Stopped
//! ```
//!
//! The audio element owns transport state. `Playing` and `Paused` are entered
//! only from its `play`/`pause` notifications; the synchronizer never starts
//! or pauses playback itself.
//!
//! Each frame reads the audio clock, adds the visual lead time and diffs the
//! notes sounding around that instant against what is already lit, so a
//! frame at an unchanged position writes nothing to the score.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::colors::{map_channels_to_colors, ThemePalette};
use crate::debounce::Debouncer;
use crate::device::{adjusted_lead_time, DeviceClassifier, MOBILE_LEAD_TIME_ADJUSTMENT};
use crate::error::PlayerError;
use crate::highlight::Highlighter;
use crate::host::{FrameHandle, Host, ListenerId, MediaEvent, PageEvent, ScoreSurface};
use crate::score::{ElementId, ScoreIndex};
use crate::scroll::AutoScroll;
use crate::timecode::{BarCache, TimeCodeDocument, TimeCodeStore};

/// Half-width of the note window around the query time.
pub const DEFAULT_HIGHLIGHT_MARGIN: f64 = 0.015;
pub const DEFAULT_RESIZE_QUIET: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Ready,
    Playing,
    Paused,
    Stopped,
}

/// Playback-derived state, recomputed from the audio clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_bar: u32,
    pub playing: bool,
    pub seeking: bool,
    /// Effective lead time after the device adjustment.
    pub lead_time: f64,
    /// Indices of the notes inside the last query window.
    pub active_notes: Vec<usize>,
}

/// Host-supplied notifications, invoked synchronously.
#[derive(Default)]
pub struct SyncCallbacks {
    on_play_state_change: Option<Box<dyn FnMut(bool)>>,
    on_bar_change: Option<Box<dyn FnMut(u32)>>,
    on_seek_start: Option<Box<dyn FnMut()>>,
    on_seek_end: Option<Box<dyn FnMut()>>,
}

impl SyncCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_play_state_change(mut self, callback: impl FnMut(bool) + 'static) -> Self {
        self.on_play_state_change = Some(Box::new(callback));
        self
    }

    pub fn on_bar_change(mut self, callback: impl FnMut(u32) + 'static) -> Self {
        self.on_bar_change = Some(Box::new(callback));
        self
    }

    pub fn on_seek_start(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_seek_start = Some(Box::new(callback));
        self
    }

    pub fn on_seek_end(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_seek_end = Some(Box::new(callback));
        self
    }

    fn play_state_changed(&mut self, playing: bool) {
        if let Some(callback) = self.on_play_state_change.as_mut() {
            callback(playing);
        }
    }

    fn bar_changed(&mut self, bar: u32) {
        if let Some(callback) = self.on_bar_change.as_mut() {
            callback(bar);
        }
    }

    fn seek_started(&mut self) {
        if let Some(callback) = self.on_seek_start.as_mut() {
            callback();
        }
    }

    fn seek_ended(&mut self) {
        if let Some(callback) = self.on_seek_end.as_mut() {
            callback();
        }
    }
}

impl fmt::Debug for SyncCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCallbacks")
            .field("on_play_state_change", &self.on_play_state_change.is_some())
            .field("on_bar_change", &self.on_bar_change.is_some())
            .field("on_seek_start", &self.on_seek_start.is_some())
            .field("on_seek_end", &self.on_seek_end.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Base lead time; `None` uses the document's `meta` value.
    pub lead_time: Option<f64>,
    pub highlight_margin: f64,
    pub mobile_adjustment: f64,
    pub resize_quiet: Duration,
    pub scroll: AutoScroll,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lead_time: None,
            highlight_margin: DEFAULT_HIGHLIGHT_MARGIN,
            mobile_adjustment: MOBILE_LEAD_TIME_ADJUSTMENT,
            resize_quiet: DEFAULT_RESIZE_QUIET,
            scroll: AutoScroll::default(),
        }
    }
}

/// What one update changed on the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub bar_changed: bool,
    pub added: usize,
    pub removed: usize,
}

impl FrameOutcome {
    pub fn is_noop(&self) -> bool {
        !self.bar_changed && self.added == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_notes: usize,
    pub total_bars: u32,
    pub first_bar: u32,
    pub channels: usize,
    pub skipped_notes: usize,
    pub missing_refs: usize,
    pub lead_time: f64,
    pub frames_rendered: u64,
}

pub struct Synchronizer {
    store: TimeCodeStore,
    highlighter: Highlighter,
    options: SyncOptions,
    callbacks: SyncCallbacks,
    phase: SyncPhase,
    state: PlaybackState,
    media_listeners: Vec<ListenerId>,
    page_listeners: Vec<ListenerId>,
    pending_frame: Option<FrameHandle>,
    last_frame: Option<Duration>,
    resize: Debouncer,
    frames_rendered: u64,
    attached: bool,
    disposed: bool,
}

impl Synchronizer {
    /// Create a synchronizer over a validated store. Starts `Idle` and
    /// touches no host resource until [`attach`](Self::attach).
    pub fn new(
        store: TimeCodeStore,
        highlighter: Highlighter,
        options: SyncOptions,
        device: &dyn DeviceClassifier,
    ) -> Result<Self, PlayerError> {
        let base = options.lead_time.unwrap_or(store.meta().lead_time_seconds);
        if !base.is_finite() || !options.mobile_adjustment.is_finite() {
            return Err(PlayerError::InvalidConfig(format!(
                "lead time must be finite (base {base}, mobile adjustment {})",
                options.mobile_adjustment
            )));
        }
        if !options.highlight_margin.is_finite() || options.highlight_margin < 0.0 {
            return Err(PlayerError::InvalidConfig(format!(
                "highlight margin must be a non-negative number, got {}",
                options.highlight_margin
            )));
        }

        let lead_time = adjusted_lead_time(base, device, options.mobile_adjustment);
        debug!(base, lead_time, "Resolved visual lead time");

        let state = PlaybackState {
            current_bar: store.first_bar(),
            playing: false,
            seeking: false,
            lead_time,
            active_notes: Vec::new(),
        };
        let resize = Debouncer::new(options.resize_quiet);

        Ok(Self {
            store,
            highlighter,
            options,
            callbacks: SyncCallbacks::default(),
            phase: SyncPhase::Idle,
            state,
            media_listeners: Vec::new(),
            page_listeners: Vec::new(),
            pending_frame: None,
            last_frame: None,
            resize,
            frames_rendered: 0,
            attached: false,
            disposed: false,
        })
    }

    /// Build the store against `score`, map channel colors and create the
    /// synchronizer in one step.
    pub fn from_document(
        document: &TimeCodeDocument,
        score: &ScoreIndex,
        palette: &ThemePalette,
        options: SyncOptions,
        device: &dyn DeviceClassifier,
    ) -> Result<Self, PlayerError> {
        let store = TimeCodeStore::build_with_score(document, score)?;
        let colors = map_channels_to_colors(store.channels(), palette);
        Self::new(store, Highlighter::new(colors), options, device)
    }

    pub fn set_callbacks(&mut self, callbacks: SyncCallbacks) {
        self.callbacks = callbacks;
    }

    /// Subscribe to the audio element and the window. Attaching twice is a
    /// no-op; attaching after [`cleanup`](Self::cleanup) fails.
    pub fn attach(&mut self, host: &mut Host<'_>) -> Result<(), PlayerError> {
        if self.disposed {
            return Err(PlayerError::Disposed);
        }
        if self.attached {
            return Ok(());
        }

        for event in MediaEvent::ALL {
            self.media_listeners.push(host.media.add_listener(event));
        }
        self.page_listeners.push(host.page.add_listener(PageEvent::Resize));
        self.attached = true;

        if host.media.duration().is_some() {
            self.phase = SyncPhase::Ready;
        }
        if !host.media.is_paused() {
            self.enter_playing(host);
        } else if self.phase == SyncPhase::Ready {
            self.refresh(host);
        }
        debug!(
            listeners = self.media_listeners.len() + self.page_listeners.len(),
            phase = ?self.phase,
            "Synchronizer attached"
        );
        Ok(())
    }

    /// Dispatch a notification from the audio element.
    pub fn handle_media_event(&mut self, event: MediaEvent, host: &mut Host<'_>) {
        if !self.is_live() {
            return;
        }
        match event {
            MediaEvent::LoadedMetadata => {
                if self.phase == SyncPhase::Idle {
                    self.phase = SyncPhase::Ready;
                    self.refresh(host);
                }
            }
            MediaEvent::Play => self.enter_playing(host),
            MediaEvent::Pause | MediaEvent::Ended => {
                self.cancel_frame(host);
                self.phase = SyncPhase::Paused;
                if self.state.playing {
                    self.state.playing = false;
                    self.callbacks.play_state_changed(false);
                }
                self.refresh(host);
            }
            MediaEvent::Seeking => {
                self.state.seeking = true;
                self.callbacks.seek_started();
            }
            MediaEvent::Seeked => {
                self.state.seeking = false;
                self.callbacks.seek_ended();
                // Recompute now instead of on the next frame.
                let outcome = self.refresh(host);
                if !outcome.bar_changed {
                    self.scroll_to_current_bar(host);
                }
            }
        }
    }

    /// Dispatch a window notification received at monotonic time `now`.
    pub fn handle_page_event(&mut self, event: PageEvent, now: Duration, host: &mut Host<'_>) {
        if !self.is_live() {
            return;
        }
        match event {
            PageEvent::Resize => self.resize.call(now),
            PageEvent::Scroll => {}
        }
        self.tick(now, host);
    }

    /// Run debounced work that is due at `now`. Frames call this while
    /// playing; hosts call it from a timer otherwise.
    pub fn tick(&mut self, now: Duration, host: &mut Host<'_>) {
        if self.is_live() && self.resize.poll(now) {
            self.scroll_to_current_bar(host);
        }
    }

    /// Animation-frame callback. Stale handles are ignored, and a new frame
    /// is requested while still playing.
    pub fn on_animation_frame(
        &mut self,
        handle: FrameHandle,
        now: Duration,
        host: &mut Host<'_>,
    ) -> FrameOutcome {
        if self.pending_frame != Some(handle) {
            return FrameOutcome::default();
        }
        self.pending_frame = None;
        if self.phase != SyncPhase::Playing {
            return FrameOutcome::default();
        }

        let now = match self.last_frame {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_frame = Some(now);

        self.tick(now, host);
        let outcome = self.refresh(host);
        self.frames_rendered += 1;
        self.pending_frame = Some(host.frames.request_frame());
        outcome
    }

    /// Recompute bar and highlights from the audio clock.
    pub fn refresh(&mut self, host: &mut Host<'_>) -> FrameOutcome {
        if !self.is_live() {
            return FrameOutcome::default();
        }
        let position = host.media.current_time();
        if !position.is_finite() {
            return FrameOutcome::default();
        }
        let query = position + self.state.lead_time;

        let mut outcome = FrameOutcome::default();
        let bar = self.store.measure_at(query);
        if bar != self.state.current_bar {
            self.state.current_bar = bar;
            outcome.bar_changed = true;
            self.callbacks.bar_changed(bar);
            if !self.state.seeking {
                self.scroll_to_current_bar(host);
            }
        }

        let margin = self.options.highlight_margin;
        let notes = self.store.active_notes_in_window(query - margin, query + margin);
        let mut wanted: BTreeMap<ElementId, u32> = BTreeMap::new();
        for note in &notes {
            for &element in &note.elements {
                wanted.insert(element, note.channel);
            }
        }
        self.state.active_notes = notes.iter().map(|note| note.index).collect();

        let lit = self.highlighter.highlighted();
        let removed: Vec<ElementId> = lit
            .keys()
            .filter(|element| !wanted.contains_key(element))
            .copied()
            .collect();
        let mut added: BTreeMap<u32, Vec<ElementId>> = BTreeMap::new();
        for (&element, &channel) in &wanted {
            if lit.get(&element) != Some(&channel) {
                added.entry(channel).or_default().push(element);
            }
        }

        outcome.removed = removed.len();
        self.highlighter.unhighlight(host.surface, &removed);
        for (channel, elements) in added {
            outcome.added += elements.len();
            self.highlighter.highlight(host.surface, &elements, channel);
        }
        outcome
    }

    /// Stop following the audio element and clear the playback highlight.
    /// Listeners stay registered until [`cleanup`](Self::cleanup).
    pub fn stop(&mut self, host: &mut Host<'_>) {
        if self.phase == SyncPhase::Stopped {
            return;
        }
        self.cancel_frame(host);
        self.highlighter.remove_all_highlights(host.surface);
        self.state.playing = false;
        self.state.seeking = false;
        self.state.active_notes.clear();
        self.phase = SyncPhase::Stopped;
    }

    /// Release every listener, frame and pending timer. Safe to call more
    /// than once; the instance cannot be attached again afterwards.
    pub fn cleanup(&mut self, host: &mut Host<'_>) {
        if self.disposed {
            return;
        }
        self.stop(host);
        for id in self.media_listeners.drain(..) {
            host.media.remove_listener(id);
        }
        for id in self.page_listeners.drain(..) {
            host.page.remove_listener(id);
        }
        self.resize.cancel();
        self.highlighter.clear_all_structures(host.surface);
        self.callbacks = SyncCallbacks::default();
        self.disposed = true;
        debug!("Synchronizer cleaned up");
    }

    /// Apply a named structure overlay to the cached bars.
    pub fn apply_structure(&mut self, surface: &mut dyn ScoreSurface, name: &str) -> usize {
        self.highlighter
            .apply_structure(surface, self.store.bar_cache(), name)
    }

    pub fn clear_structures(&mut self, surface: &mut dyn ScoreSurface) {
        self.highlighter.clear_structures(surface);
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            total_notes: self.store.notes().len(),
            total_bars: self.store.total_bars(),
            first_bar: self.store.first_bar(),
            channels: self.highlighter.channel_colors().len(),
            skipped_notes: self.store.skipped_notes(),
            missing_refs: self.store.missing_refs(),
            lead_time: self.state.lead_time,
            frames_rendered: self.frames_rendered,
        }
    }

    pub fn bar_cache(&self) -> &BarCache {
        self.store.bar_cache()
    }

    pub fn store(&self) -> &TimeCodeStore {
        &self.store
    }

    pub fn first_bar(&self) -> u32 {
        self.store.first_bar()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn highlighter(&self) -> &Highlighter {
        &self.highlighter
    }

    fn is_live(&self) -> bool {
        self.attached && !self.disposed && self.phase != SyncPhase::Stopped
    }

    fn enter_playing(&mut self, host: &mut Host<'_>) {
        self.phase = SyncPhase::Playing;
        if !self.state.playing {
            self.state.playing = true;
            self.callbacks.play_state_changed(true);
        }
        if self.pending_frame.is_none() {
            self.pending_frame = Some(host.frames.request_frame());
        }
        self.refresh(host);
    }

    fn cancel_frame(&mut self, host: &mut Host<'_>) {
        if let Some(handle) = self.pending_frame.take() {
            host.frames.cancel_frame(handle);
        }
    }

    fn scroll_to_current_bar(&mut self, host: &mut Host<'_>) {
        let bar = self.state.current_bar;
        let elements = self.store.elements_for_measure(bar);
        if self
            .options
            .scroll
            .scroll_to_bar(bar, elements, &*host.surface, &mut *host.page)
        {
            debug!(bar, "Scrolled to bar");
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("listeners", &(self.media_listeners.len() + self.page_listeners.len()))
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        let leaked = self.media_listeners.len() + self.page_listeners.len();
        if leaked > 0 {
            warn!(leaked, "Synchronizer dropped without cleanup");
        } else if self.attached {
            info!(frames = self.frames_rendered, "Synchronizer released");
        }
    }
}
