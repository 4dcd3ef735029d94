//! Integration tests for the synchronizer state machine
//!
//! Drives a `Synchronizer` against in-memory host doubles.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use common::*;
use hyplayer::device::StaticDevice;
use hyplayer::host::{MediaEvent, PageEvent};
use hyplayer::{
    PlayerError, ScoreIndex, SyncCallbacks, SyncOptions, SyncPhase, Synchronizer, ThemePalette,
    TimeCodeDocument,
};

fn synchronizer(timecode: &str) -> Synchronizer {
    let document = TimeCodeDocument::from_yaml(timecode).unwrap();
    let score = ScoreIndex::parse(SVG).unwrap();
    Synchronizer::from_document(
        &document,
        &score,
        &ThemePalette::default(),
        SyncOptions::default(),
        &StaticDevice(false),
    )
    .unwrap()
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Run the pending animation frame, if any.
fn frame(sync: &mut Synchronizer, fx: &mut Fixture, now: Duration) -> hyplayer::sync::FrameOutcome {
    let handle = fx.frames.next_frame().expect("a frame is pending");
    fx.frames.pending.remove(&handle);
    sync.on_animation_frame(handle, now, &mut fx.host())
}

#[test]
fn test_idle_until_metadata() {
    let mut fx = Fixture::new();
    fx.media.duration = None;
    let mut sync = synchronizer(TIMECODE);

    sync.attach(&mut fx.host()).unwrap();
    assert_eq!(sync.phase(), SyncPhase::Idle);

    fx.media.duration = Some(12.0);
    sync.handle_media_event(MediaEvent::LoadedMetadata, &mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Ready);
}

#[test]
fn test_attach_with_known_duration_is_ready() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();

    assert_eq!(sync.phase(), SyncPhase::Ready);
    assert_eq!(fx.media.listeners.len(), MediaEvent::ALL.len());
    assert_eq!(fx.page.listeners.len(), 1);

    // A second attach does not subscribe again.
    sync.attach(&mut fx.host()).unwrap();
    assert_eq!(fx.media.listeners.len(), MediaEvent::ALL.len());
}

#[test]
fn test_attach_while_already_playing() {
    let mut fx = Fixture::new();
    fx.media.paused = false;
    fx.media.current_time = 0.7;
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();

    assert_eq!(sync.phase(), SyncPhase::Playing);
    assert!(fx.frames.next_frame().is_some());
    assert!(fx.surface.has_class(N1, "active"));
}

#[test]
fn test_play_pause_follow_media_element() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    let changes = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&changes);
    sync.set_callbacks(
        SyncCallbacks::new().on_play_state_change(move |playing| recorded.borrow_mut().push(playing)),
    );
    sync.attach(&mut fx.host()).unwrap();

    fx.media.paused = false;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Playing);
    assert!(sync.is_playing());
    assert_eq!(fx.frames.pending.len(), 1);

    fx.media.paused = true;
    sync.handle_media_event(MediaEvent::Pause, &mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Paused);
    assert!(fx.frames.pending.is_empty());

    fx.media.paused = false;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    sync.handle_media_event(MediaEvent::Ended, &mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Paused);

    assert_eq!(*changes.borrow(), vec![true, false, true, false]);
}

#[test]
fn test_frame_at_same_position_is_idempotent() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.paused = false;
    fx.media.current_time = 1.2;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());

    assert_eq!(fx.lit(), [N1, N2].into_iter().collect());
    let writes = fx.surface.writes;

    let outcome = frame(&mut sync, &mut fx, ms(16));
    assert!(outcome.is_noop());
    assert_eq!(fx.surface.writes, writes);

    let outcome = frame(&mut sync, &mut fx, ms(32));
    assert!(outcome.is_noop());
    assert_eq!(fx.surface.writes, writes);
    assert_eq!(sync.get_stats().frames_rendered, 2);
}

#[test]
fn test_frames_diff_highlights_and_follow_bars() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    let bars = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&bars);
    sync.set_callbacks(SyncCallbacks::new().on_bar_change(move |bar| recorded.borrow_mut().push(bar)));
    sync.attach(&mut fx.host()).unwrap();

    fx.media.paused = false;
    fx.media.current_time = 0.7;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    assert_eq!(fx.lit(), [N1].into_iter().collect());
    assert_eq!(fx.surface.style(N1, "fill"), Some("#e53935"));

    fx.media.current_time = 1.7;
    let outcome = frame(&mut sync, &mut fx, ms(16));
    assert_eq!((outcome.added, outcome.removed), (1, 1));
    assert_eq!(fx.lit(), [N2].into_iter().collect());
    assert_eq!(fx.surface.style(N1, "fill"), None);

    fx.media.current_time = 4.6;
    let outcome = frame(&mut sync, &mut fx, ms(32));
    assert!(outcome.bar_changed);
    assert_eq!(fx.lit(), [N3].into_iter().collect());
    assert_eq!(*bars.borrow(), vec![2]);
    assert_eq!(sync.state().current_bar, 2);
    // Bar 2 sits below the fold: scroll it under the header.
    assert_eq!(fx.page.scrolls, vec![1200.0 - 120.0 - 32.0]);
}

#[test]
fn test_seek_recomputes_immediately() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    let seeks = Rc::new(RefCell::new(Vec::new()));
    let (start, end) = (Rc::clone(&seeks), Rc::clone(&seeks));
    sync.set_callbacks(
        SyncCallbacks::new()
            .on_seek_start(move || start.borrow_mut().push("start"))
            .on_seek_end(move || end.borrow_mut().push("end")),
    );
    sync.attach(&mut fx.host()).unwrap();
    fx.media.current_time = 0.7;
    sync.refresh(&mut fx.host());
    assert_eq!(fx.lit(), [N1].into_iter().collect());

    sync.handle_media_event(MediaEvent::Seeking, &mut fx.host());
    assert!(sync.state().seeking);
    fx.media.current_time = 8.6;
    sync.handle_media_event(MediaEvent::Seeked, &mut fx.host());

    // No frame ran, yet the highlight already reflects the new position.
    assert!(fx.frames.pending.is_empty());
    assert_eq!(fx.lit(), [N4].into_iter().collect());
    assert_eq!(sync.state().current_bar, 3);
    assert!(!sync.state().seeking);
    assert_eq!(*seeks.borrow(), vec!["start", "end"]);
}

#[test]
fn test_scroll_suppressed_while_seeking() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.paused = false;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());

    sync.handle_media_event(MediaEvent::Seeking, &mut fx.host());
    fx.media.current_time = 4.6;
    let outcome = frame(&mut sync, &mut fx, ms(16));
    assert!(outcome.bar_changed);
    assert!(fx.page.scrolls.is_empty());

    // Seek completion scrolls to the bar even though it is already current.
    sync.handle_media_event(MediaEvent::Seeked, &mut fx.host());
    assert_eq!(fx.page.scrolls, vec![1048.0]);
}

#[test]
fn test_stale_frame_is_ignored() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.paused = false;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    let stale = fx.frames.next_frame().unwrap();

    fx.media.paused = true;
    sync.handle_media_event(MediaEvent::Pause, &mut fx.host());
    fx.media.current_time = 4.6;
    let outcome = sync.on_animation_frame(stale, ms(16), &mut fx.host());

    assert!(outcome.is_noop());
    assert!(fx.frames.pending.is_empty());
    assert_eq!(sync.state().current_bar, 1);
}

#[test]
fn test_stop_is_terminal() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.paused = false;
    fx.media.current_time = 0.7;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());

    sync.stop(&mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Stopped);
    assert!(fx.lit().is_empty());
    assert!(fx.frames.pending.is_empty());

    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    assert_eq!(sync.phase(), SyncPhase::Stopped);
    assert!(fx.frames.pending.is_empty());
    assert!(fx.lit().is_empty());
}

#[test]
fn test_cleanup_releases_everything_and_is_repeatable() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.paused = false;
    fx.media.current_time = 0.7;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    sync.handle_page_event(PageEvent::Resize, ms(0), &mut fx.host());
    sync.apply_structure(&mut fx.surface, "anything");

    sync.cleanup(&mut fx.host());
    sync.cleanup(&mut fx.host());

    assert!(sync.is_disposed());
    assert!(fx.media.listeners.is_empty());
    assert!(fx.page.listeners.is_empty());
    assert!(fx.frames.pending.is_empty());
    assert!(fx.lit().is_empty());

    let writes = fx.surface.writes;
    fx.media.current_time = 4.6;
    sync.handle_media_event(MediaEvent::Play, &mut fx.host());
    sync.handle_media_event(MediaEvent::Seeked, &mut fx.host());
    sync.tick(ms(500), &mut fx.host());
    assert_eq!(fx.surface.writes, writes);
    assert!(fx.page.scrolls.is_empty());

    assert!(matches!(sync.attach(&mut fx.host()), Err(PlayerError::Disposed)));
}

#[test]
fn test_resize_rescrolls_after_quiet_period() {
    let mut fx = Fixture::new();
    let mut sync = synchronizer(TIMECODE);
    sync.attach(&mut fx.host()).unwrap();
    fx.media.current_time = 4.6;
    sync.refresh(&mut fx.host());
    fx.page.scrolls.clear();

    for t in [0, 10, 20] {
        sync.handle_page_event(PageEvent::Resize, ms(t), &mut fx.host());
    }
    sync.tick(ms(69), &mut fx.host());
    assert!(fx.page.scrolls.is_empty());

    sync.tick(ms(70), &mut fx.host());
    assert_eq!(fx.page.scrolls, vec![1048.0]);
}

#[test]
fn test_malformed_document_never_reaches_ready() {
    let missing_flow = "meta:\n  firstBar: 1\n";
    let err = TimeCodeDocument::from_yaml(missing_flow).unwrap_err();
    assert!(matches!(err, PlayerError::MalformedTimeCode(_)));

    let bad_entry = "meta: {}\nflow:\n  - [0, 1, 2]\n";
    assert!(matches!(
        TimeCodeDocument::from_yaml(bad_entry),
        Err(PlayerError::MalformedTimeCode(_))
    ));
}

#[test]
fn test_malformed_note_is_skipped_not_fatal() {
    let timecode = TIMECODE.replace("[1.0, 1, [n2], 2.0]", "[1.0, 1, [], 2.0]");
    let mut fx = Fixture::new();
    let mut sync = synchronizer(&timecode);
    sync.attach(&mut fx.host()).unwrap();

    let stats = sync.get_stats();
    assert_eq!(stats.total_notes, 3);
    assert_eq!(stats.skipped_notes, 1);
    assert_eq!(sync.phase(), SyncPhase::Ready);
}

#[test]
fn test_mobile_device_gets_extra_lead_time() {
    let document = TimeCodeDocument::from_yaml(TIMECODE).unwrap();
    let score = ScoreIndex::parse(SVG).unwrap();
    let options = SyncOptions {
        lead_time: Some(0.1),
        ..SyncOptions::default()
    };

    let mobile = Synchronizer::from_document(
        &document,
        &score,
        &ThemePalette::default(),
        options.clone(),
        &StaticDevice(true),
    )
    .unwrap();
    let desktop = Synchronizer::from_document(
        &document,
        &score,
        &ThemePalette::default(),
        options,
        &StaticDevice(false),
    )
    .unwrap();

    assert!((mobile.get_stats().lead_time - 0.3).abs() < 1e-9);
    assert_eq!(desktop.get_stats().lead_time, 0.1);
}

#[test]
fn test_lead_time_shifts_query_forward() {
    let document = TimeCodeDocument::from_yaml(TIMECODE).unwrap();
    let score = ScoreIndex::parse(SVG).unwrap();
    let options = SyncOptions {
        lead_time: Some(0.5),
        ..SyncOptions::default()
    };
    let mut sync = Synchronizer::from_document(
        &document,
        &score,
        &ThemePalette::default(),
        options,
        &StaticDevice(false),
    )
    .unwrap();
    let mut fx = Fixture::new();
    sync.attach(&mut fx.host()).unwrap();

    // Audio at 3.6s, visuals at 4.1s: already in bar 2.
    fx.media.current_time = 3.6;
    sync.refresh(&mut fx.host());
    assert_eq!(sync.state().current_bar, 2);
}
