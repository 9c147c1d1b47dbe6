use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;
use web_sys::{Performance, Window};

use super::CadenceError;
use crate::util::describe;

/// Opaque registration token returned by a [`Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskHandle {
    Frame(i32),
    Timer(i32),
}

/// One-shot scheduling primitives supplied by the host.
///
/// Every registration fires at most once; [`Scheduler::cancel`] on a handle
/// that already fired (or never existed) does nothing.
pub trait Scheduler {
    /// Monotonic clock in milliseconds.
    fn now(&self) -> f64;

    /// Run `callback` once before the next repaint.
    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError>;

    /// Run `callback` once after `delay_ms` milliseconds.
    fn set_timeout(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError>;

    fn cancel(&self, handle: TaskHandle);
}

/// [`Scheduler`] backed by the browser window.
pub struct BrowserScheduler {
    window: Window,
    performance: Performance,
}

impl BrowserScheduler {
    pub fn new() -> Result<Self, CadenceError> {
        let window = web_sys::window().ok_or_else(|| CadenceError::Unsupported("no global `window`".into()))?;
        let performance = window
            .performance()
            .ok_or_else(|| CadenceError::Unsupported("no `window.performance`".into()))?;

        Ok(BrowserScheduler { window, performance })
    }
}

impl Scheduler for BrowserScheduler {
    fn now(&self) -> f64 {
        self.performance.now()
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError> {
        // A cancelled registration never runs, so its closure is leaked.
        let callback = Closure::once_into_js(move || callback());

        self.window
            .request_animation_frame(callback.unchecked_ref())
            .map(TaskHandle::Frame)
            .map_err(|err| CadenceError::Unsupported(describe(&err)))
    }

    fn set_timeout(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError> {
        let callback = Closure::once_into_js(move || callback());

        self.window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay_ms.round() as i32)
            .map(TaskHandle::Timer)
            .map_err(|err| CadenceError::Unsupported(describe(&err)))
    }

    fn cancel(&self, handle: TaskHandle) {
        match handle {
            TaskHandle::Frame(id) => {
                let _ = self.window.cancel_animation_frame(id);
            }
            TaskHandle::Timer(id) => self.window.clear_timeout_with_handle(id),
        }
    }
}
