use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, EventTarget, Window};

use crate::error::SensorError;

pub fn window() -> Result<Window, SensorError> {
    web_sys::window().ok_or(SensorError::Unsupported("window"))
}

pub fn document() -> Result<Document, SensorError> {
    window()?.document().ok_or(SensorError::Unsupported("document"))
}

/// Wall-clock milliseconds since the Unix epoch.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// Wall-clock milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

pub fn now_seconds() -> f64 {
    now_ms() / 1000.0
}

/// Best-effort readable text for a thrown JS value.
pub fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    if let Some(message) = js_string(value, "message") {
        return message;
    }
    format!("{:?}", value)
}

pub fn js_number(object: &JsValue, key: &str) -> Option<f64> {
    js_sys::Reflect::get(object, &JsValue::from_str(key)).ok()?.as_f64()
}

pub fn js_string(object: &JsValue, key: &str) -> Option<String> {
    js_sys::Reflect::get(object, &JsValue::from_str(key)).ok()?.as_string()
}

/// A DOM listener that stays registered for as long as this value lives.
pub struct EventListener {
    target: EventTarget,
    event_type: &'static str,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

impl EventListener {
    pub fn new<F>(target: &EventTarget, event_type: &'static str, handler: F) -> Result<Self, JsValue>
    where
        F: FnMut(web_sys::Event) + 'static,
    {
        let closure: Closure<dyn FnMut(web_sys::Event)> = Closure::new(handler);
        target.add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref())?;

        Ok(EventListener {
            target: target.clone(),
            event_type,
            closure,
        })
    }
}

// Unregister before the closure is freed so the DOM never calls into a dropped closure.
impl Drop for EventListener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event_type, self.closure.as_ref().unchecked_ref());
    }
}
