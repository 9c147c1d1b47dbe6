//! Browser sensors and synthetic noise as push-based streams.
//!
//! Every source in [`sensors`] yields a [`SensorStream`]; hardware sources
//! (camera, microphone) hand out a [`Shared`] that subscribers attach to.
//! Periodic sources are driven by a [`cadence::Cadence`], either once per
//! display refresh or at a fixed rate.

pub mod cadence;
pub mod error;
pub mod noise;
pub mod sensors;
pub mod stream;
pub mod util;

pub use cadence::{start_cadence, Cadence, CadenceBuilder, CadenceError, Scheduler};
pub use error::SensorError;
pub use noise::{sample_noise, NoiseError, NoiseField, Shape};
pub use stream::{Emitter, SensorStream, Shared};

/// Route `log` output to the browser console at `Info` and install the panic hook.
pub fn init() {
    init_with_level(log::Level::Info);
}

pub fn init_with_level(level: log::Level) {
    console_error_panic_hook::set_once();

    if let Err(err) = console_log::init_with_level(level) {
        log::debug!("console logger already installed: {}", err);
    }
}
