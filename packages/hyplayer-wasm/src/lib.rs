//! Browser bindings.
//!
//! JavaScript owns the `<audio>` element, the inline SVG and the window.
//! It pushes their state in (`set_media_state`, `set_viewport`,
//! `set_element_rects`), forwards events by DOM name, and applies the
//! mutations returned by `take_ops` as a JSON array.
//!
//! Element ids are positions in
//! `svg.querySelectorAll('[data-ref],[data-bar]')`, which is the same
//! document order the score index uses.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use hyplayer::config::{parse_config, PlayerConfig, WorkConfig};
use hyplayer::host::{
    Counter, FrameHandle, FrameScheduler, Host, ListenerId, MediaElement, MediaEvent, Page,
    PageEvent, Rect, ScoreSurface,
};
use hyplayer::{ElementId, Player, PlayerError, UserAgentClassifier, WorkAssets};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct LoadError {
    kind: &'static str,
    message: String,
}

fn error_to_js(e: PlayerError) -> JsValue {
    let kind = match &e {
        PlayerError::MalformedTimeCode(_) => "malformedTimeCode",
        PlayerError::AssetLoad { .. } => "assetLoad",
        PlayerError::InvalidConfig(_) => "invalidConfig",
        PlayerError::Disposed => "disposed",
        PlayerError::Io(_) => "io",
    };
    let error = LoadError {
        kind,
        message: e.to_string(),
    };
    match serde_json::to_string(&error) {
        Ok(json) => JsValue::from_str(&json),
        Err(_) => JsValue::from_str(&error.message),
    }
}

/// One mutation for the page to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Op {
    AddClass { element: usize, class: String },
    RemoveClass { element: usize, class: String },
    SetStyle { element: usize, property: String, value: Option<String> },
    ScrollTo { top: f64 },
    BodyClass { class: String, enabled: bool },
    Counter { name: &'static str, value: u32 },
    ShowError { message: String },
    HideError,
    Loading { visible: bool },
    ButtonOffset { right: f64 },
    Pause,
    Seek { time: f64 },
    RequestFrame { handle: u64 },
    CancelFrame { handle: u64 },
    Listen { target: &'static str, event: &'static str, id: u64 },
    Unlisten { target: &'static str, id: u64 },
}

type Outbox = Rc<RefCell<Vec<Op>>>;

fn push(outbox: &Outbox, op: Op) {
    outbox.borrow_mut().push(op);
}

fn millis(now_ms: f64) -> Duration {
    if now_ms.is_finite() && now_ms > 0.0 {
        Duration::from_secs_f64(now_ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

struct WasmMedia {
    outbox: Outbox,
    current_time: f64,
    duration: Option<f64>,
    paused: bool,
    next_id: u64,
    listeners: BTreeMap<ListenerId, MediaEvent>,
}

impl MediaElement for WasmMedia {
    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.current_time = seconds;
        push(&self.outbox, Op::Seek { time: seconds });
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
        push(&self.outbox, Op::Pause);
    }

    fn add_listener(&mut self, event: MediaEvent) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, event);
        push(
            &self.outbox,
            Op::Listen {
                target: "media",
                event: event.name(),
                id: id.0,
            },
        );
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        if self.listeners.remove(&id).is_some() {
            push(&self.outbox, Op::Unlisten { target: "media", id: id.0 });
        }
    }
}

/// Shared by the surface and the page: element rects arrive in document
/// coordinates and are reported relative to the viewport.
#[derive(Default)]
struct Viewport {
    scroll_y: Cell<f64>,
}

struct WasmSurface {
    outbox: Outbox,
    viewport: Rc<Viewport>,
    rects: HashMap<ElementId, Rect>,
}

impl ScoreSurface for WasmSurface {
    fn add_class(&mut self, element: ElementId, class: &str) {
        push(
            &self.outbox,
            Op::AddClass {
                element: element.0,
                class: class.to_string(),
            },
        );
    }

    fn remove_class(&mut self, element: ElementId, class: &str) {
        push(
            &self.outbox,
            Op::RemoveClass {
                element: element.0,
                class: class.to_string(),
            },
        );
    }

    fn set_style(&mut self, element: ElementId, property: &str, value: Option<&str>) {
        push(
            &self.outbox,
            Op::SetStyle {
                element: element.0,
                property: property.to_string(),
                value: value.map(str::to_string),
            },
        );
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        let scroll_y = self.viewport.scroll_y.get();
        self.rects.get(&element).map(|rect| Rect {
            top: rect.top - scroll_y,
            bottom: rect.bottom - scroll_y,
            ..*rect
        })
    }
}

struct WasmPage {
    outbox: Outbox,
    viewport: Rc<Viewport>,
    inner_width: f64,
    inner_height: f64,
    score_rect: Option<Rect>,
    button_width: f64,
    next_id: u64,
    listeners: BTreeMap<ListenerId, PageEvent>,
}

impl Page for WasmPage {
    fn scroll_y(&self) -> f64 {
        self.viewport.scroll_y.get()
    }

    fn inner_height(&self) -> f64 {
        self.inner_height
    }

    fn inner_width(&self) -> f64 {
        self.inner_width
    }

    fn scroll_to(&mut self, top: f64) {
        push(&self.outbox, Op::ScrollTo { top });
    }

    fn score_rect(&self) -> Option<Rect> {
        self.score_rect
    }

    fn set_body_class(&mut self, class: &str, enabled: bool) {
        push(
            &self.outbox,
            Op::BodyClass {
                class: class.to_string(),
                enabled,
            },
        );
    }

    fn set_counter(&mut self, counter: Counter, value: u32) {
        let name = match counter {
            Counter::CurrentBar => "current_bar",
            Counter::TotalBars => "total_bars",
        };
        push(&self.outbox, Op::Counter { name, value });
    }

    fn show_error(&mut self, message: &str) {
        push(
            &self.outbox,
            Op::ShowError {
                message: message.to_string(),
            },
        );
    }

    fn hide_error(&mut self) {
        push(&self.outbox, Op::HideError);
    }

    fn set_loading(&mut self, visible: bool) {
        push(&self.outbox, Op::Loading { visible });
    }

    fn add_listener(&mut self, event: PageEvent) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.insert(id, event);
        push(
            &self.outbox,
            Op::Listen {
                target: "window",
                event: event.name(),
                id: id.0,
            },
        );
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        if self.listeners.remove(&id).is_some() {
            push(&self.outbox, Op::Unlisten { target: "window", id: id.0 });
        }
    }

    fn button_width(&self) -> f64 {
        self.button_width
    }

    fn set_button_offset(&mut self, right: f64) {
        push(&self.outbox, Op::ButtonOffset { right });
    }
}

struct WasmFrames {
    outbox: Outbox,
    next: u64,
}

impl FrameScheduler for WasmFrames {
    fn request_frame(&mut self) -> FrameHandle {
        self.next += 1;
        push(&self.outbox, Op::RequestFrame { handle: self.next });
        FrameHandle(self.next)
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        push(&self.outbox, Op::CancelFrame { handle: handle.0 });
    }
}

#[wasm_bindgen]
pub struct WasmPlayer {
    player: Player,
    outbox: Outbox,
    viewport: Rc<Viewport>,
    media: WasmMedia,
    surface: WasmSurface,
    page: WasmPage,
    frames: WasmFrames,
}

impl WasmPlayer {
    fn with_host<R>(&mut self, f: impl FnOnce(&mut Player, &mut Host<'_>) -> R) -> R {
        let mut host = Host::new(
            &mut self.media,
            &mut self.surface,
            &mut self.page,
            &mut self.frames,
        );
        f(&mut self.player, &mut host)
    }
}

#[wasm_bindgen]
impl WasmPlayer {
    /// Create a player. `config_toml` may be empty for the defaults.
    /// `theme_css` is the text of the theme stylesheet; its
    /// `--channel-color-N` slots replace the configured palette.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_toml: &str,
        theme_css: &str,
        user_agent: String,
        touch_capable: bool,
        screen_width: u32,
    ) -> Result<WasmPlayer, JsValue> {
        let mut config = if config_toml.trim().is_empty() {
            PlayerConfig::default()
        } else {
            parse_config(config_toml).map_err(error_to_js)?
        };
        config.apply_theme_css(theme_css);
        let device = UserAgentClassifier {
            user_agent,
            touch_capable,
            screen_width,
        };

        let outbox: Outbox = Rc::default();
        let viewport = Rc::new(Viewport::default());
        Ok(WasmPlayer {
            player: Player::new(config, Box::new(device)),
            media: WasmMedia {
                outbox: Rc::clone(&outbox),
                current_time: 0.0,
                duration: None,
                paused: true,
                next_id: 0,
                listeners: BTreeMap::new(),
            },
            surface: WasmSurface {
                outbox: Rc::clone(&outbox),
                viewport: Rc::clone(&viewport),
                rects: HashMap::new(),
            },
            page: WasmPage {
                outbox: Rc::clone(&outbox),
                viewport: Rc::clone(&viewport),
                inner_width: 0.0,
                inner_height: 0.0,
                score_rect: None,
                button_width: 0.0,
                next_id: 0,
                listeners: BTreeMap::new(),
            },
            frames: WasmFrames {
                outbox: Rc::clone(&outbox),
                next: 0,
            },
            outbox,
            viewport,
        })
    }

    /// Load a work from its YAML entry and the fetched SVG and time-code text.
    pub fn load_work(&mut self, work_yaml: &str, svg: &str, timecode: &str) -> Result<(), JsValue> {
        let work = WorkConfig::from_yaml(work_yaml).map_err(error_to_js)?;
        let assets = WorkAssets { svg, timecode };
        self.with_host(|player, host| player.load_work(work, assets, host))
            .map_err(error_to_js)
    }

    pub fn unload(&mut self) {
        self.with_host(|player, host| player.unload(host));
    }

    pub fn shutdown(&mut self) {
        self.with_host(|player, host| player.shutdown(host));
    }

    /// Mirror the audio element. `duration` is `undefined` until metadata
    /// has loaded.
    pub fn set_media_state(&mut self, current_time: f64, duration: Option<f64>, paused: bool) {
        self.media.current_time = current_time;
        self.media.duration = duration.filter(|d| d.is_finite());
        self.media.paused = paused;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_viewport(
        &mut self,
        scroll_y: f64,
        inner_width: f64,
        inner_height: f64,
        score_top: f64,
        score_bottom: f64,
        score_left: f64,
        score_right: f64,
        button_width: f64,
    ) {
        self.viewport.scroll_y.set(scroll_y);
        self.page.inner_width = inner_width;
        self.page.inner_height = inner_height;
        self.page.button_width = button_width;
        self.page.score_rect = Some(Rect {
            top: score_top,
            bottom: score_bottom,
            left: score_left,
            right: score_right,
        });
    }

    /// Document-relative element rects as `[[id, top, bottom, left, right], ...]`.
    pub fn set_element_rects(&mut self, rects_json: &str) -> Result<(), JsValue> {
        let rows: Vec<(usize, f64, f64, f64, f64)> = serde_json::from_str(rects_json)
            .map_err(|e| error_to_js(PlayerError::InvalidConfig(format!("element rects: {e}"))))?;
        self.surface.rects = rows
            .into_iter()
            .map(|(id, top, bottom, left, right)| {
                (
                    ElementId(id),
                    Rect {
                        top,
                        bottom,
                        left,
                        right,
                    },
                )
            })
            .collect();
        Ok(())
    }

    /// Forward a media event by DOM name. Unknown names are ignored.
    pub fn media_event(&mut self, name: &str) {
        if let Some(event) = MediaEvent::from_name(name) {
            self.with_host(|player, host| player.handle_media_event(event, host));
        }
    }

    pub fn page_event(&mut self, name: &str, now_ms: f64) {
        if let Some(event) = PageEvent::from_name(name) {
            self.with_host(|player, host| player.handle_page_event(event, millis(now_ms), host));
        }
    }

    /// `requestAnimationFrame` callback for a handle from a `requestFrame` op.
    pub fn animation_frame(&mut self, handle: u64, now_ms: f64) {
        self.with_host(|player, host| {
            player.on_animation_frame(FrameHandle(handle), millis(now_ms), host);
        });
    }

    pub fn tick(&mut self, now_ms: f64) {
        self.with_host(|player, host| player.tick(millis(now_ms), host));
    }

    pub fn apply_structure(&mut self, name: &str) -> usize {
        self.player.apply_structure(name, &mut self.surface)
    }

    pub fn clear_structures(&mut self) {
        self.player.clear_structures(&mut self.surface);
    }

    /// `[[key, displayName], ...]` for the current work.
    pub fn structures(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.player.structures()).map_err(JsValue::from)
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        match self.player.sync() {
            Some(sync) => serde_wasm_bindgen::to_value(&sync.get_stats()).map_err(JsValue::from),
            None => Ok(JsValue::NULL),
        }
    }

    /// Drain pending mutations as a JSON array.
    pub fn take_ops(&mut self) -> String {
        let ops = std::mem::take(&mut *self.outbox.borrow_mut());
        serde_json::to_string(&ops).unwrap_or_else(|_| "[]".to_string())
    }
}
