//! In-memory host doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hyplayer::host::{
    Counter, FrameHandle, FrameScheduler, Host, ListenerId, MediaElement, MediaEvent, Page,
    PageEvent, Rect, ScoreSurface,
};
use hyplayer::ElementId;

pub const WORK: &str = r##"
workInfo:
  workId: minuet
  title: Minuet
  instrument: Piano
urls:
  audio: audio/minuet.mp3
  svg: svg/minuet.svg
  sync: sync/minuet.yaml
musicalStructure:
  totalMeasures: 3
measureHighlighters:
  phrases:
    type: alternating
    colors: ["#ffcdd2", "#c8e6c9"]
  line-starts:
    type: conditional
    colors: ["#fff59d", "#e1f5fe"]
    condition:
      type: line-starts
      bars: [1, 3]
"##;

/// Element ids in document order:
/// 0 bar 1, 1 n1, 2 n2, 3 bar 2, 4 n3, 5 bar 3, 6 n4.
pub const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
  <g class="system">
    <rect data-bar="1" x="0" width="100" height="50"/>
    <path data-ref="n1" d="M0 0"/>
    <path data-ref="n2" d="M0 0"/>
    <rect data-bar="2" x="100" width="100" height="50"/>
    <path data-ref="n3" d="M0 0"/>
  </g>
  <g class="system">
    <rect data-bar="3" x="0" width="100" height="50"/>
    <path data-ref="n4" d="M0 0"/>
  </g>
</svg>"#;

pub const TIMECODE: &str = r#"
meta:
  firstBar: 1
  totalBars: 3
  leadTimeSeconds: 0
flow:
  - [0, 1]
  - [0.5, 0, [n1], 1.5]
  - [1.0, 1, [n2], 2.0]
  - [4, 2]
  - [4.5, 0, [n3], 5.5]
  - [8, 3]
  - [8.5, 1, [n4], 9.5]
"#;

pub const BAR_1: ElementId = ElementId(0);
pub const N1: ElementId = ElementId(1);
pub const N2: ElementId = ElementId(2);
pub const BAR_2: ElementId = ElementId(3);
pub const N3: ElementId = ElementId(4);
pub const BAR_3: ElementId = ElementId(5);
pub const N4: ElementId = ElementId(6);

#[derive(Debug, Default)]
pub struct MockMedia {
    pub current_time: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub pause_calls: usize,
    pub seeks: Vec<f64>,
    pub listeners: BTreeMap<ListenerId, MediaEvent>,
    next_id: u64,
}

impl MediaElement for MockMedia {
    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.current_time = seconds;
        self.seeks.push(seconds);
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
        self.pause_calls += 1;
    }

    fn add_listener(&mut self, event: MediaEvent) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, event);
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }
}

#[derive(Debug, Default)]
pub struct MockSurface {
    pub classes: HashMap<ElementId, BTreeSet<String>>,
    pub styles: HashMap<(ElementId, String), String>,
    pub rects: HashMap<ElementId, Rect>,
    pub writes: usize,
}

impl MockSurface {
    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.classes
            .get(&element)
            .map_or(false, |classes| classes.contains(class))
    }

    pub fn with_class(&self, class: &str) -> BTreeSet<ElementId> {
        self.classes
            .iter()
            .filter(|(_, classes)| classes.contains(class))
            .map(|(element, _)| *element)
            .collect()
    }

    pub fn style(&self, element: ElementId, property: &str) -> Option<&str> {
        self.styles
            .get(&(element, property.to_string()))
            .map(String::as_str)
    }
}

impl ScoreSurface for MockSurface {
    fn add_class(&mut self, element: ElementId, class: &str) {
        self.writes += 1;
        self.classes
            .entry(element)
            .or_default()
            .insert(class.to_string());
    }

    fn remove_class(&mut self, element: ElementId, class: &str) {
        self.writes += 1;
        if let Some(classes) = self.classes.get_mut(&element) {
            classes.remove(class);
        }
    }

    fn set_style(&mut self, element: ElementId, property: &str, value: Option<&str>) {
        self.writes += 1;
        let key = (element, property.to_string());
        match value {
            Some(value) => {
                self.styles.insert(key, value.to_string());
            }
            None => {
                self.styles.remove(&key);
            }
        }
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        self.rects.get(&element).copied()
    }
}

#[derive(Debug, Default)]
pub struct MockPage {
    pub scroll_y: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub score_rect: Option<Rect>,
    pub button_width: f64,
    pub button_offset: Option<f64>,
    pub scrolls: Vec<f64>,
    pub body_classes: BTreeSet<String>,
    pub counters: HashMap<Counter, u32>,
    pub errors: Vec<String>,
    pub error_visible: bool,
    pub loading: bool,
    pub loading_shown: usize,
    pub listeners: BTreeMap<ListenerId, PageEvent>,
    next_id: u64,
}

impl Page for MockPage {
    fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    fn inner_height(&self) -> f64 {
        self.inner_height
    }

    fn inner_width(&self) -> f64 {
        self.inner_width
    }

    fn scroll_to(&mut self, top: f64) {
        self.scrolls.push(top);
    }

    fn score_rect(&self) -> Option<Rect> {
        self.score_rect
    }

    fn set_body_class(&mut self, class: &str, enabled: bool) {
        if enabled {
            self.body_classes.insert(class.to_string());
        } else {
            self.body_classes.remove(class);
        }
    }

    fn set_counter(&mut self, counter: Counter, value: u32) {
        self.counters.insert(counter, value);
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
        self.error_visible = true;
    }

    fn hide_error(&mut self) {
        self.error_visible = false;
    }

    fn set_loading(&mut self, visible: bool) {
        if visible {
            self.loading_shown += 1;
        }
        self.loading = visible;
    }

    fn add_listener(&mut self, event: PageEvent) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, event);
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    fn button_width(&self) -> f64 {
        self.button_width
    }

    fn set_button_offset(&mut self, right: f64) {
        self.button_offset = Some(right);
    }
}

#[derive(Debug, Default)]
pub struct MockFrames {
    pub pending: BTreeSet<FrameHandle>,
    pub requested: usize,
    next: u64,
}

impl MockFrames {
    /// Most recently requested frame that is still pending.
    pub fn next_frame(&self) -> Option<FrameHandle> {
        self.pending.iter().next_back().copied()
    }
}

impl FrameScheduler for MockFrames {
    fn request_frame(&mut self) -> FrameHandle {
        self.next += 1;
        self.requested += 1;
        let handle = FrameHandle(self.next);
        self.pending.insert(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.pending.remove(&handle);
    }
}

/// A page 1280x900 with a paused, loaded audio element and laid-out bars.
#[derive(Debug, Default)]
pub struct Fixture {
    pub media: MockMedia,
    pub surface: MockSurface,
    pub page: MockPage,
    pub frames: MockFrames,
}

impl Fixture {
    pub fn new() -> Self {
        let mut fixture = Fixture::default();
        fixture.media.paused = true;
        fixture.media.duration = Some(12.0);
        fixture.page.inner_width = 1280.0;
        fixture.page.inner_height = 900.0;
        fixture.page.score_rect = Some(Rect {
            top: 140.0,
            bottom: 2400.0,
            left: 80.0,
            right: 1100.0,
        });
        for (element, top) in [(BAR_1, 200.0), (BAR_2, 1200.0), (BAR_3, 2200.0)] {
            fixture.surface.rects.insert(
                element,
                Rect {
                    top,
                    bottom: top + 100.0,
                    left: 80.0,
                    right: 1100.0,
                },
            );
        }
        fixture
    }

    pub fn host(&mut self) -> Host<'_> {
        Host::new(
            &mut self.media,
            &mut self.surface,
            &mut self.page,
            &mut self.frames,
        )
    }

    pub fn lit(&self) -> BTreeSet<ElementId> {
        self.surface.with_class("active")
    }
}
