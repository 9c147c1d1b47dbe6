use std::cell::RefCell;

use super::scheduler::{Scheduler, TaskHandle};
use super::CadenceError;

/// 60 Hz display.
pub const DEFAULT_FRAME_INTERVAL: f64 = 1000.0 / 60.0;

struct Pending {
    handle: TaskHandle,
    due: f64,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

struct ManualState {
    now: f64,
    frame_interval: f64,
    timer_lag: f64,
    supports_frames: bool,
    next_id: i32,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// A simulated host: virtual clock, fixed refresh cycle, no real time passes
/// until [`ManualScheduler::advance`] is called.
pub struct ManualScheduler {
    state: RefCell<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    pub fn with_frame_interval(frame_interval: f64) -> Self {
        ManualScheduler {
            state: RefCell::new(ManualState {
                now: 0.0,
                frame_interval,
                timer_lag: 0.0,
                supports_frames: true,
                next_id: 1,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    /// A host whose refresh callback is missing.
    pub fn without_frames() -> Self {
        let scheduler = Self::new();
        scheduler.state.borrow_mut().supports_frames = false;
        scheduler
    }

    /// Make every timer fire `lag_ms` later than requested.
    pub fn set_timer_lag(&self, lag_ms: f64) {
        self.state.borrow_mut().timer_lag = lag_ms.max(0.0);
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Move the clock forward by `ms`, running everything that falls due on the way.
    ///
    /// Tasks run in due order; tasks registered while advancing run too if
    /// they fall due before the target instant.
    pub fn advance(&self, ms: f64) {
        let target = self.state.borrow().now + ms;

        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let earliest = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, task)| task.due <= target)
                    .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
                    .map(|(index, _)| index);

                match earliest {
                    Some(index) => {
                        let task = state.pending.remove(index);
                        state.now = state.now.max(task.due);
                        Some(task.callback)
                    }
                    None => None,
                }
            };

            match next {
                Some(callback) => callback(),
                None => break,
            }
        }

        self.state.borrow_mut().now = target;
    }

    fn register(&self, due: f64, handle: impl FnOnce(i32) -> TaskHandle, callback: Box<dyn FnOnce()>) -> TaskHandle {
        let mut state = self.state.borrow_mut();
        let handle = handle(state.next_id);
        state.next_id += 1;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Pending { handle, due, seq, callback });
        handle
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.state.borrow().now
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError> {
        let due = {
            let state = self.state.borrow();
            if !state.supports_frames {
                return Err(CadenceError::Unsupported("refresh callbacks".into()));
            }
            let due = ((state.now / state.frame_interval).floor() + 1.0) * state.frame_interval;
            // rounding can land back on the current frame
            if due <= state.now {
                due + state.frame_interval
            } else {
                due
            }
        };

        Ok(self.register(due, TaskHandle::Frame, callback))
    }

    fn set_timeout(&self, delay_ms: f64, callback: Box<dyn FnOnce()>) -> Result<TaskHandle, CadenceError> {
        let due = {
            let state = self.state.borrow();
            state.now + delay_ms.max(0.0) + state.timer_lag
        };

        Ok(self.register(due, TaskHandle::Timer, callback))
    }

    fn cancel(&self, handle: TaskHandle) {
        self.state.borrow_mut().pending.retain(|task| task.handle != handle);
    }
}
