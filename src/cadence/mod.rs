//! Periodic sampling driver.
//!
//! A [`Cadence`] calls its sampling callback either once per display refresh
//! (`rate == 0`) or `rate` times per second. Fixed-rate mode keeps an absolute
//! due instant and shortens each delay by however late the previous timer
//! fired, so the average rate converges on `rate` despite timer jitter.

mod manual;
mod scheduler;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;

pub use manual::{ManualScheduler, DEFAULT_FRAME_INTERVAL};
pub use scheduler::{BrowserScheduler, Scheduler, TaskHandle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CadenceError {
    #[error("cadence requires a sampling callback")]
    MissingCallback,

    #[error("cadence rate must be a finite number >= 0, got {0}")]
    InvalidRate(f64),

    #[error("host cannot schedule samples: {0}")]
    Unsupported(String),
}

type SampleFn = Box<dyn FnMut()>;

/// Cadence settings; fixed once the driver starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CadenceConfig {
    /// Samples per second, `0.0` follows the display refresh.
    pub rate: f64,
}

impl CadenceConfig {
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.rate.is_finite() && self.rate >= 0.0 {
            Ok(())
        } else {
            Err(CadenceError::InvalidRate(self.rate))
        }
    }

    pub fn is_frame_synced(&self) -> bool {
        self.rate == 0.0
    }

    pub fn period_ms(&self) -> Option<f64> {
        if self.is_frame_synced() {
            None
        } else {
            Some(1000.0 / self.rate)
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        CadenceConfig { rate: 0.0 }
    }
}

#[derive(Default)]
pub struct CadenceBuilder {
    config: CadenceConfig,
    on_sample: Option<SampleFn>,
}

impl CadenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.config.rate = rate;
        self
    }

    pub fn on_sample<F>(mut self, on_sample: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.on_sample = Some(Box::new(on_sample));
        self
    }

    /// Validate and register the first tick.
    ///
    /// Nothing is scheduled when this fails; the error is logged once here.
    pub fn start(self, scheduler: Rc<dyn Scheduler>) -> Result<Cadence, CadenceError> {
        let result = self.try_start(scheduler);
        if let Err(err) = &result {
            log::error!("cadence not started: {}", err);
        }
        result
    }

    fn try_start(self, scheduler: Rc<dyn Scheduler>) -> Result<Cadence, CadenceError> {
        let on_sample = self.on_sample.ok_or(CadenceError::MissingCallback)?;
        self.config.validate()?;

        let first_due = scheduler.now() + self.config.period_ms().unwrap_or(0.0);
        let state = Rc::new(CadenceState {
            config: self.config,
            scheduler,
            on_sample: RefCell::new(on_sample),
            handle: Cell::new(None),
            stopped: Cell::new(false),
            next_due: Cell::new(first_due),
            ticks: Cell::new(0),
        });

        state.schedule()?;
        log::debug!("cadence started at {} Hz", state.config.rate);

        Ok(Cadence { state })
    }
}

/// Start a driver that calls `on_sample` at `rate` samples per second.
pub fn start_cadence<F>(scheduler: Rc<dyn Scheduler>, rate: f64, on_sample: F) -> Result<Cadence, CadenceError>
where
    F: FnMut() + 'static,
{
    CadenceBuilder::new().rate(rate).on_sample(on_sample).start(scheduler)
}

struct CadenceState {
    config: CadenceConfig,
    scheduler: Rc<dyn Scheduler>,
    on_sample: RefCell<SampleFn>,
    handle: Cell<Option<TaskHandle>>,
    stopped: Cell<bool>,
    next_due: Cell<f64>,
    ticks: Cell<u64>,
}

impl CadenceState {
    fn schedule(self: &Rc<Self>) -> Result<(), CadenceError> {
        let weak = Rc::downgrade(self);
        let fire: Box<dyn FnOnce()> = Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.fire();
            }
        });

        let handle = match self.config.period_ms() {
            None => self.scheduler.request_frame(fire)?,
            Some(_) => {
                let delay = (self.next_due.get() - self.scheduler.now()).max(0.0);
                self.scheduler.set_timeout(delay, fire)?
            }
        };

        self.handle.set(Some(handle));
        Ok(())
    }

    fn fire(self: &Rc<Self>) {
        self.handle.set(None);
        if self.stopped.get() {
            return;
        }

        {
            let mut on_sample = self.on_sample.borrow_mut();
            (*on_sample)();
        }
        self.ticks.set(self.ticks.get() + 1);

        // stop() may have been called from inside the callback
        if self.stopped.get() {
            return;
        }

        if let Some(period) = self.config.period_ms() {
            let now = self.scheduler.now();
            let due = self.next_due.get() + period;
            self.next_due.set(if due < now { now } else { due });
        }

        if let Err(err) = self.schedule() {
            log::warn!("cadence halted: {}", err);
            self.stopped.set(true);
        }
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        if let Some(handle) = self.handle.take() {
            self.scheduler.cancel(handle);
        }
        log::debug!("cadence stopped after {} ticks", self.ticks.get());
    }
}

/// A running driver. Dropping it stops it.
pub struct Cadence {
    state: Rc<CadenceState>,
}

impl Cadence {
    /// Cancel the pending tick. Idempotent; a stopped cadence never samples again.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    pub fn rate(&self) -> f64 {
        self.state.config.rate
    }

    pub fn ticks(&self) -> u64 {
        self.state.ticks.get()
    }

    /// A cloneable handle that can stop this cadence from inside its own callback.
    pub fn stopper(&self) -> Stopper {
        Stopper {
            state: Rc::downgrade(&self.state),
        }
    }
}

impl Drop for Cadence {
    fn drop(&mut self) {
        self.state.stop();
    }
}

#[derive(Clone)]
pub struct Stopper {
    state: std::rc::Weak<CadenceState>,
}

impl Stopper {
    pub fn stop(&self) {
        if let Some(state) = self.state.upgrade() {
            state.stop();
        }
    }
}
