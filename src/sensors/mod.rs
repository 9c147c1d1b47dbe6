//! Browser sources wired into [`SensorStream`](crate::stream::SensorStream)s.

mod dom;
mod geolocation;
mod media;
mod midi;
mod noise;
mod time;

use std::rc::Rc;

pub use dom::{
    click, dblclick, keydown, keypress, keyup, mouse, mousedown, mousemove, mouseup, resize, scroll, touch,
    touchend, touchmove, touchstart, KeyboardEventData, KeyboardKey, MouseButton, MouseEventData, MousePosition,
    ScrollOffset, TouchEventData, TouchPoint, WindowSize, RESIZE_THROTTLE_MS, SCROLL_THROTTLE_MS,
};
pub use geolocation::{geolocation, Position};
pub use media::{sight, sound, CaptureState, Frame, SightOptions, SoundOptions};
pub use midi::{midi, MidiMessage};
pub use noise::{
    noise_stream, perlinnoise, perlinnoise_with, random, random_with, simplexnoise, simplexnoise_with, NoiseOptions,
};
pub use time::{time, time_with};

use crate::cadence::{BrowserScheduler, Scheduler};
use crate::error::SensorError;

pub(crate) fn browser_scheduler() -> Result<Rc<dyn Scheduler>, SensorError> {
    Ok(Rc::new(BrowserScheduler::new()?))
}
