//! Window and document input events.

use wasm_bindgen::JsCast;
use web_sys::{EventTarget, KeyboardEvent, MouseEvent, TouchEvent, TouchList};

use crate::error::SensorError;
use crate::stream::{no_teardown, SensorStream, Throttle};
use crate::util::{self, describe, now_ms, EventListener};

pub const RESIZE_THROTTLE_MS: f64 = 100.0;
pub const SCROLL_THROTTLE_MS: f64 = 2.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum KeyboardKey {
    Character(char),
    Alt,
    AltGr,
    CapsLock,
    Control,
    Fn,
    FnLock,
    Hyper,
    Meta,
    NumLock,
    ScrollLock,
    Shift,
    Super,
    Symbol,
    SymbolLock,
    Dead,
    Named(&'static str),

    Unidentified,
}

const NAMED_KEYS: &[&str] = &[
    "Enter", "Tab", "Backspace", "Escape", "Delete", "Insert", "Home", "End", "PageUp", "PageDown",
    "ArrowUp", "ArrowDown", "ArrowLeft", "ArrowRight",
];

impl KeyboardKey {
    /// Classify a `KeyboardEvent.key` value.
    pub fn extract(key: &str) -> Self {
        match key {
            "Alt" => KeyboardKey::Alt,
            "AltGraph" => KeyboardKey::AltGr,
            "CapsLock" => KeyboardKey::CapsLock,
            "Control" => KeyboardKey::Control,
            "Fn" => KeyboardKey::Fn,
            "FnLock" => KeyboardKey::FnLock,
            "Hyper" => KeyboardKey::Hyper,
            "Meta" => KeyboardKey::Meta,
            "NumLock" => KeyboardKey::NumLock,
            "ScrollLock" => KeyboardKey::ScrollLock,
            "Shift" => KeyboardKey::Shift,
            "Super" => KeyboardKey::Super,
            "Symbol" => KeyboardKey::Symbol,
            "SymbolLock" => KeyboardKey::SymbolLock,
            "Dead" => KeyboardKey::Dead,
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyboardKey::Character(c),
                    _ => NAMED_KEYS
                        .iter()
                        .find(|&&named| named == key)
                        .map_or(KeyboardKey::Unidentified, |&named| KeyboardKey::Named(named)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardEventData {
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
    pub repeat: bool,

    pub key: KeyboardKey,
    /// Physical key, e.g. `"KeyW"`.
    pub code: String,
}

impl KeyboardEventData {
    pub fn extract(event: &KeyboardEvent) -> Self {
        KeyboardEventData {
            alt_key: event.alt_key(),
            ctrl_key: event.ctrl_key(),
            shift_key: event.shift_key(),
            meta_key: event.meta_key(),
            repeat: event.repeat(),
            key: KeyboardKey::extract(&event.key()),
            code: event.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,

    OtherButton(u8),
}

impl MouseButton {
    pub fn extract(button: u8) -> Self {
        match button {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::OtherButton(button),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MouseEventData {
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,

    pub button: MouseButton,

    pub movement_x: i32,
    pub movement_y: i32,

    pub client_x: i32,
    pub client_y: i32,
}

impl MouseEventData {
    pub fn extract(event: &MouseEvent) -> Self {
        MouseEventData {
            alt_key: event.alt_key(),
            ctrl_key: event.ctrl_key(),
            shift_key: event.shift_key(),
            meta_key: event.meta_key(),

            button: MouseButton::extract(event.button() as u8),

            movement_x: event.movement_x(),
            movement_y: event.movement_y(),

            client_x: event.client_x(),
            client_y: event.client_y(),
        }
    }

    pub fn position(&self) -> MousePosition {
        MousePosition {
            x: self.client_x,
            y: self.client_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MousePosition {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: i32,
    pub client_x: i32,
    pub client_y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchEventData {
    /// Every finger currently on the surface.
    pub touches: Vec<TouchPoint>,
    /// Fingers that changed in this event.
    pub changed: Vec<TouchPoint>,
}

impl TouchEventData {
    pub fn extract(event: &TouchEvent) -> Self {
        TouchEventData {
            touches: touch_points(&event.touches()),
            changed: touch_points(&event.changed_touches()),
        }
    }
}

fn touch_points(list: &TouchList) -> Vec<TouchPoint> {
    (0..list.length())
        .filter_map(|i| list.get(i))
        .map(|touch| TouchPoint {
            id: touch.identifier(),
            client_x: touch.client_x(),
            client_y: touch.client_y(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

enum Target {
    Window,
    Document,
}

impl Target {
    fn resolve(&self) -> Result<EventTarget, SensorError> {
        Ok(match self {
            Target::Window => util::window()?.into(),
            Target::Document => util::document()?.into(),
        })
    }
}

/// Stream every `event_type` event on `target` that `extract` maps to a value.
fn listen<T, F>(target: Target, event_type: &'static str, mut extract: F) -> SensorStream<T>
where
    T: Clone + 'static,
    F: FnMut(web_sys::Event) -> Option<T> + 'static,
{
    SensorStream::new(move |emitter| {
        let target = match target.resolve() {
            Ok(target) => target,
            Err(err) => {
                emitter.fail(err);
                return no_teardown();
            }
        };

        let tx = emitter.clone();
        let listener = EventListener::new(&target, event_type, move |event| {
            if let Some(value) = extract(event) {
                tx.next(value);
            }
        });

        match listener {
            Ok(listener) => {
                log::debug!("listening for {}", event_type);
                Box::new(move || drop(listener))
            }
            Err(err) => {
                emitter.fail(SensorError::Configuration(format!(
                    "cannot listen for {}: {}",
                    event_type,
                    describe(&err)
                )));
                no_teardown()
            }
        }
    })
}

fn document_events<E, T, F>(event_type: &'static str, extract: F) -> SensorStream<T>
where
    E: JsCast,
    T: Clone + 'static,
    F: Fn(&E) -> T + 'static,
{
    listen(Target::Document, event_type, move |event| {
        event.dyn_ref::<E>().map(|event| extract(event))
    })
}

fn mouse_events(event_type: &'static str) -> SensorStream<MouseEventData> {
    document_events(event_type, MouseEventData::extract)
}

fn keyboard_events(event_type: &'static str) -> SensorStream<KeyboardEventData> {
    document_events(event_type, KeyboardEventData::extract)
}

fn touch_events(event_type: &'static str) -> SensorStream<TouchEventData> {
    document_events(event_type, TouchEventData::extract)
}

/// Window inner size, at most once per `throttle_ms`.
pub fn resize(throttle_ms: f64) -> SensorStream<WindowSize> {
    let mut gate = Throttle::new(throttle_ms);
    listen(Target::Window, "resize", move |_| {
        if !gate.admit(now_ms()) {
            return None;
        }
        let window = web_sys::window()?;
        Some(WindowSize {
            width: window.inner_width().ok()?.as_f64()?,
            height: window.inner_height().ok()?.as_f64()?,
        })
    })
}

/// Window scroll offset, at most once per `throttle_ms`.
pub fn scroll(throttle_ms: f64) -> SensorStream<ScrollOffset> {
    let mut gate = Throttle::new(throttle_ms);
    listen(Target::Document, "scroll", move |_| {
        if !gate.admit(now_ms()) {
            return None;
        }
        let window = web_sys::window()?;
        Some(ScrollOffset {
            x: window.scroll_x().ok()?,
            y: window.scroll_y().ok()?,
        })
    })
}

pub fn mousedown() -> SensorStream<MouseEventData> {
    mouse_events("mousedown")
}

pub fn mousemove() -> SensorStream<MouseEventData> {
    mouse_events("mousemove")
}

/// Just the client position of `mousemove`.
pub fn mouse() -> SensorStream<MousePosition> {
    mousemove().map(|event| event.position())
}

pub fn mouseup() -> SensorStream<MouseEventData> {
    mouse_events("mouseup")
}

pub fn click() -> SensorStream<MouseEventData> {
    mouse_events("click")
}

pub fn dblclick() -> SensorStream<MouseEventData> {
    mouse_events("dblclick")
}

pub fn keydown() -> SensorStream<KeyboardEventData> {
    keyboard_events("keydown")
}

pub fn keypress() -> SensorStream<KeyboardEventData> {
    keyboard_events("keypress")
}

pub fn keyup() -> SensorStream<KeyboardEventData> {
    keyboard_events("keyup")
}

pub fn touchstart() -> SensorStream<TouchEventData> {
    touch_events("touchstart")
}

pub fn touchmove() -> SensorStream<TouchEventData> {
    touch_events("touchmove")
}

/// Same as [`touchmove`].
pub fn touch() -> SensorStream<TouchEventData> {
    touchmove()
}

pub fn touchend() -> SensorStream<TouchEventData> {
    touch_events("touchend")
}
