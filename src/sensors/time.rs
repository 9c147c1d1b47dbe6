use std::rc::Rc;

use super::browser_scheduler;
use crate::cadence::{start_cadence, Scheduler};
use crate::stream::{no_teardown, SensorStream};
use crate::util::now_ms;

/// The current UTC time in milliseconds, once per refresh or `framerate` times a second.
pub fn time(framerate: f64) -> SensorStream<f64> {
    match browser_scheduler() {
        Ok(scheduler) => time_with(scheduler, framerate),
        Err(err) => SensorStream::failed(err),
    }
}

pub fn time_with(scheduler: Rc<dyn Scheduler>, framerate: f64) -> SensorStream<f64> {
    SensorStream::new(move |emitter| {
        let tx = emitter.clone();
        match start_cadence(scheduler, framerate, move || {
            tx.next(now_ms());
        }) {
            Ok(cadence) => Box::new(move || cadence.stop()),
            Err(err) => {
                emitter.fail(err.into());
                no_teardown()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::{FutureExt, StreamExt};

    use super::*;
    use crate::cadence::ManualScheduler;
    use crate::error::SensorError;

    #[test]
    fn emits_increasing_timestamps() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = time_with(scheduler.clone(), 0.0);

        scheduler.advance(1000.0 / 60.0 * 10.0);

        let mut last = 0.0;
        for _ in 0..10 {
            let t = block_on(stream.next()).unwrap().unwrap();
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn counts_match_the_requested_rate() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = time_with(scheduler.clone(), 20.0);

        scheduler.advance(250.0);

        let mut ticks = 0;
        while let Some(Some(Ok(_))) = stream.next().now_or_never() {
            ticks += 1;
        }
        assert!((ticks as i32 - 5).abs() <= 2, "got {}", ticks);
    }

    #[test]
    fn dropping_the_stream_stops_the_clock() {
        let scheduler = Rc::new(ManualScheduler::new());
        let stream = time_with(scheduler.clone(), 10.0);
        assert_eq!(scheduler.pending(), 1);

        drop(stream);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn bad_rates_fail_the_stream() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = time_with(scheduler, -5.0);

        let first = block_on(stream.next());
        assert!(matches!(first, Some(Err(SensorError::Cadence(_)))));
        assert_eq!(block_on(stream.next()), None);
    }
}
