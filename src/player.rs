//! # Player
//!
//! The owning context for one audio element: holds the single live
//! [`Synchronizer`], the page chrome derived from it (bar counter, body
//! classes, error panel) and the debounced layout work of the page.
//!
//! Switching works goes through [`Player::load_work`], which tears the old
//! synchronizer down completely before the new one is created, so at most one
//! instance ever listens to the audio element.
//!
//! A work's structure overlays are registered on load but none is applied:
//! the score starts untinted and [`Player::apply_structure`] picks one on
//! request, rather than leaving the last configured structure showing.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::colors::{log_channel_mapping, map_channels_to_colors};
use crate::config::{PlayerConfig, WorkConfig};
use crate::debounce::Debouncer;
use crate::device::DeviceClassifier;
use crate::error::PlayerError;
use crate::highlight::Highlighter;
use crate::host::{Counter, FrameHandle, Host, ListenerId, MediaEvent, Page, PageEvent, ScoreSurface};
use crate::score::{ElementId, ScoreIndex};
use crate::scroll::{button_right_offset, ScrollSpy};
use crate::sync::{FrameOutcome, SyncCallbacks, Synchronizer};
use crate::timecode::{TimeCodeDocument, TimeCodeStore};

pub const PLAYING_CLASS: &str = "playing";
pub const SEEKING_CLASS: &str = "seeking";
pub const SVG_AT_TOP_CLASS: &str = "svg-at-top";

/// Fetched contents of a work's assets.
#[derive(Debug, Clone, Copy)]
pub struct WorkAssets<'s> {
    pub svg: &'s str,
    /// Time-code document, YAML or JSON.
    pub timecode: &'s str,
}

/// Page chrome as the player wants it shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PageState {
    current_bar: Option<u32>,
    playing: bool,
    seeking: bool,
    svg_at_top: bool,
}

pub struct Player {
    config: PlayerConfig,
    device: Box<dyn DeviceClassifier>,
    spy: ScrollSpy,
    sync: Option<Synchronizer>,
    work: Option<WorkConfig>,
    wanted: Rc<RefCell<PageState>>,
    shown: PageState,
    channel_classes: Vec<(ElementId, String)>,
    page_listeners: Vec<ListenerId>,
    layout: Debouncer,
    loads: u32,
    last_error: Option<String>,
}

impl Player {
    pub fn new(config: PlayerConfig, device: Box<dyn DeviceClassifier>) -> Self {
        let spy = config.scroll_spy();
        let layout = Debouncer::new(config.debounce_quiet());
        Self {
            config,
            device,
            spy,
            sync: None,
            work: None,
            wanted: Rc::new(RefCell::new(PageState::default())),
            shown: PageState::default(),
            channel_classes: Vec::new(),
            page_listeners: Vec::new(),
            layout,
            loads: 0,
            last_error: None,
        }
    }

    /// Load a work, replacing whatever was playing.
    ///
    /// A switch away from a loaded work shows the loading overlay until the
    /// new work is ready. On failure the error is shown on the page and
    /// returned, and neither a synchronizer nor a current work is left
    /// behind. A later successful load hides the error again.
    pub fn load_work(
        &mut self,
        work: WorkConfig,
        assets: WorkAssets<'_>,
        host: &mut Host<'_>,
    ) -> Result<(), PlayerError> {
        host.page
            .set_counter(Counter::TotalBars, work.musical_structure.total_measures);

        self.teardown(host);
        let switching = self.loads > 0;
        if switching {
            host.page.set_loading(true);
            host.media.pause();
            host.media.set_current_time(0.0);
        }
        self.loads += 1;

        if work.audio_url().is_none() {
            warn!(work = %work.work_info.work_id, "Work has no audio source; highlights follow the media clock only");
        }

        match self.start(&work, assets, host) {
            Ok(sync) => {
                let stats = sync.get_stats();
                info!(
                    work = %work.work_info.work_id,
                    "loaded work: {} notes, {} bars",
                    stats.total_notes,
                    stats.total_bars
                );
                self.sync = Some(sync);
                self.work = Some(work);
                if self.last_error.take().is_some() {
                    host.page.hide_error();
                }
                if switching {
                    host.page.set_loading(false);
                }
                self.ensure_page_listeners(host.page);
                self.flush_page(host.page);
                Ok(())
            }
            Err(err) => {
                error!(work = %work.work_info.work_id, "Failed to load work: {err}");
                if switching {
                    host.page.set_loading(false);
                }
                host.page.show_error(&err.to_string());
                self.last_error = Some(err.to_string());
                self.work = None;
                self.wanted.borrow_mut().current_bar = None;
                self.flush_page(host.page);
                Err(err)
            }
        }
    }

    fn start(
        &mut self,
        work: &WorkConfig,
        assets: WorkAssets<'_>,
        host: &mut Host<'_>,
    ) -> Result<Synchronizer, PlayerError> {
        let document = TimeCodeDocument::from_yaml(assets.timecode)?;
        let score = ScoreIndex::parse(assets.svg)?;
        let store = TimeCodeStore::build_with_score(&document, &score)?;

        let colors = map_channels_to_colors(store.channels(), &self.config.theme_palette);
        log_channel_mapping(&colors);

        let mut highlighter = Highlighter::new(colors);
        for (name, structure) in &work.measure_highlighters {
            highlighter.add_structure(name, structure);
        }

        let mut sync = Synchronizer::new(
            store,
            highlighter,
            self.config.sync_options(work),
            self.device.as_ref(),
        )?;
        sync.set_callbacks(self.callbacks());
        self.wanted.borrow_mut().current_bar = Some(sync.first_bar());
        sync.attach(host)?;

        self.apply_channel_classes(sync.store(), host.surface);
        Ok(sync)
    }

    fn callbacks(&self) -> SyncCallbacks {
        let play = Rc::clone(&self.wanted);
        let bar = Rc::clone(&self.wanted);
        let seek_start = Rc::clone(&self.wanted);
        let seek_end = Rc::clone(&self.wanted);
        SyncCallbacks::new()
            .on_play_state_change(move |playing| {
                let mut state = play.borrow_mut();
                state.playing = playing;
                if playing {
                    state.svg_at_top = false;
                }
            })
            .on_bar_change(move |current| bar.borrow_mut().current_bar = Some(current))
            .on_seek_start(move || seek_start.borrow_mut().seeking = true)
            .on_seek_end(move || seek_end.borrow_mut().seeking = false)
    }

    fn apply_channel_classes(&mut self, store: &TimeCodeStore, surface: &mut dyn ScoreSurface) {
        let mut seen = BTreeSet::new();
        for note in store.notes() {
            for &element in &note.elements {
                if seen.insert((element, note.channel)) {
                    let class = format!("channel-{}", note.channel);
                    surface.add_class(element, &class);
                    self.channel_classes.push((element, class));
                }
            }
        }
    }

    /// Stop and dispose the live synchronizer and undo per-work styling.
    fn teardown(&mut self, host: &mut Host<'_>) {
        if let Some(mut sync) = self.sync.take() {
            sync.cleanup(host);
        }
        for (element, class) in self.channel_classes.drain(..) {
            host.surface.remove_class(element, &class);
        }
        let mut wanted = self.wanted.borrow_mut();
        wanted.current_bar = None;
        wanted.playing = false;
        wanted.seeking = false;
    }

    /// Unload the current work. Page listeners stay registered.
    pub fn unload(&mut self, host: &mut Host<'_>) {
        self.teardown(host);
        self.work = None;
        self.flush_page(host.page);
    }

    /// Unload and release every page listener.
    pub fn shutdown(&mut self, host: &mut Host<'_>) {
        self.unload(host);
        for id in self.page_listeners.drain(..) {
            host.page.remove_listener(id);
        }
        self.layout.cancel();
    }

    pub fn handle_media_event(&mut self, event: MediaEvent, host: &mut Host<'_>) {
        if let Some(sync) = self.sync.as_mut() {
            sync.handle_media_event(event, host);
        }
        self.flush_page(host.page);
    }

    pub fn handle_page_event(&mut self, event: PageEvent, now: Duration, host: &mut Host<'_>) {
        self.layout.call(now);
        if let Some(sync) = self.sync.as_mut() {
            sync.handle_page_event(event, now, host);
        }
        self.tick(now, host);
    }

    pub fn on_animation_frame(
        &mut self,
        handle: FrameHandle,
        now: Duration,
        host: &mut Host<'_>,
    ) -> FrameOutcome {
        let outcome = match self.sync.as_mut() {
            Some(sync) => sync.on_animation_frame(handle, now, host),
            None => FrameOutcome::default(),
        };
        self.tick(now, host);
        outcome
    }

    /// Run debounced page work due at `now`.
    pub fn tick(&mut self, now: Duration, host: &mut Host<'_>) {
        if let Some(sync) = self.sync.as_mut() {
            sync.tick(now, host);
        }
        if self.layout.poll(now) {
            self.update_layout(host.page);
        }
        self.flush_page(host.page);
    }

    /// Place the floating buttons and run the scroll spy.
    fn update_layout(&mut self, page: &mut dyn Page) {
        let Some(rect) = page.score_rect() else {
            return;
        };
        let offset = button_right_offset(page.inner_width(), rect.right, page.button_width());
        page.set_button_offset(offset);

        let mut wanted = self.wanted.borrow_mut();
        if !wanted.playing {
            wanted.svg_at_top = self.spy.is_at_top(rect.top);
        }
    }

    /// Apply a named structure overlay of the current work.
    pub fn apply_structure(&mut self, name: &str, surface: &mut dyn ScoreSurface) -> usize {
        match self.sync.as_mut() {
            Some(sync) => sync.apply_structure(surface, name),
            None => 0,
        }
    }

    pub fn clear_structures(&mut self, surface: &mut dyn ScoreSurface) {
        if let Some(sync) = self.sync.as_mut() {
            sync.clear_structures(surface);
        }
    }

    /// Structure keys of the current work with their display names.
    pub fn structures(&self) -> Vec<(String, String)> {
        let Some(sync) = self.sync.as_ref() else {
            return Vec::new();
        };
        let highlighter = sync.highlighter();
        highlighter
            .structure_names()
            .into_iter()
            .map(|name| (name.to_string(), highlighter.structure_display_name(name)))
            .collect()
    }

    pub fn sync(&self) -> Option<&Synchronizer> {
        self.sync.as_ref()
    }

    pub fn current_work(&self) -> Option<&WorkConfig> {
        self.work.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn ensure_page_listeners(&mut self, page: &mut dyn Page) {
        if self.page_listeners.is_empty() {
            self.page_listeners.push(page.add_listener(PageEvent::Resize));
            self.page_listeners.push(page.add_listener(PageEvent::Scroll));
        }
    }

    /// Write only what changed since the last flush.
    fn flush_page(&mut self, page: &mut dyn Page) {
        let wanted = self.wanted.borrow().clone();
        if wanted.current_bar != self.shown.current_bar {
            // No live work reads as bar 0.
            page.set_counter(Counter::CurrentBar, wanted.current_bar.unwrap_or(0));
        }
        if wanted.playing != self.shown.playing {
            page.set_body_class(PLAYING_CLASS, wanted.playing);
        }
        if wanted.seeking != self.shown.seeking {
            page.set_body_class(SEEKING_CLASS, wanted.seeking);
        }
        if wanted.svg_at_top != self.shown.svg_at_top {
            page.set_body_class(SVG_AT_TOP_CLASS, wanted.svg_at_top);
        }
        self.shown = wanted;
    }
}
