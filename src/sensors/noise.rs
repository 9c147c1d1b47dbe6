use std::rc::Rc;

use super::browser_scheduler;
use crate::cadence::{start_cadence, Scheduler};
use crate::noise::{sample_source, NoiseField, NoiseSource, PerlinSource, Shape, SimplexSource, UniformSource};
use crate::noise::source::Seed;
use crate::stream::{no_teardown, SensorStream};
use crate::util::now_ms;

#[derive(Clone, Debug, PartialEq)]
pub struct NoiseOptions {
    /// Generator seed; a clock-derived seed is used when absent.
    pub seed: Option<Seed>,
    /// `[x, y, z]` extents, see [`Shape`].
    pub shape: Vec<usize>,
    pub framerate: f64,
}

impl NoiseOptions {
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn shape(mut self, shape: &[usize]) -> Self {
        self.shape = shape.to_vec();
        self
    }

    pub fn framerate(mut self, framerate: f64) -> Self {
        self.framerate = framerate;
        self
    }

    fn resolved_seed(&self) -> Seed {
        self.seed.unwrap_or_else(|| now_ms().to_bits())
    }
}

impl Default for NoiseOptions {
    fn default() -> Self {
        NoiseOptions {
            seed: None,
            shape: vec![1, 0, 0],
            framerate: 0.0,
        }
    }
}

/// Uniform random values in `[0, 1)`.
pub fn random(options: NoiseOptions) -> SensorStream<NoiseField> {
    with_browser(options, random_with)
}

pub fn random_with(scheduler: Rc<dyn Scheduler>, options: NoiseOptions) -> SensorStream<NoiseField> {
    let source = UniformSource::new(options.resolved_seed());
    noise_stream(scheduler, options, source)
}

pub fn simplexnoise(options: NoiseOptions) -> SensorStream<NoiseField> {
    with_browser(options, simplexnoise_with)
}

pub fn simplexnoise_with(scheduler: Rc<dyn Scheduler>, options: NoiseOptions) -> SensorStream<NoiseField> {
    let source = SimplexSource::new(options.resolved_seed());
    noise_stream(scheduler, options, source)
}

pub fn perlinnoise(options: NoiseOptions) -> SensorStream<NoiseField> {
    with_browser(options, perlinnoise_with)
}

pub fn perlinnoise_with(scheduler: Rc<dyn Scheduler>, options: NoiseOptions) -> SensorStream<NoiseField> {
    let source = PerlinSource::new(options.resolved_seed());
    noise_stream(scheduler, options, source)
}

fn with_browser<F>(options: NoiseOptions, start: F) -> SensorStream<NoiseField>
where
    F: FnOnce(Rc<dyn Scheduler>, NoiseOptions) -> SensorStream<NoiseField>,
{
    match browser_scheduler() {
        Ok(scheduler) => start(scheduler, options),
        Err(err) => SensorStream::failed(err),
    }
}

/// Drive `source` with a cadence, pushing one field per tick.
///
/// The source is created once per stream, so a seeded generator keeps its
/// state across ticks.
pub fn noise_stream<S>(scheduler: Rc<dyn Scheduler>, options: NoiseOptions, source: S) -> SensorStream<NoiseField>
where
    S: NoiseSource + 'static,
{
    let shape = match Shape::new(&options.shape) {
        Ok(shape) => shape,
        Err(err) => return SensorStream::failed(err.into()),
    };

    SensorStream::new(move |emitter| {
        let tx = emitter.clone();
        let mut source = source;
        match start_cadence(scheduler, options.framerate, move || {
            tx.next(sample_source(&shape, &mut source));
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
    use futures::StreamExt;

    use super::*;
    use crate::cadence::ManualScheduler;
    use crate::error::SensorError;
    use crate::noise::NoiseError;

    fn first_field(stream: &mut SensorStream<NoiseField>, scheduler: &ManualScheduler) -> NoiseField {
        scheduler.advance(20.0);
        block_on(stream.next()).unwrap().unwrap()
    }

    #[test]
    fn random_fields_follow_the_shape() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = random_with(scheduler.clone(), NoiseOptions::default().seed(9).shape(&[5, 5]));

        let field = first_field(&mut stream, &scheduler);
        assert_eq!(field.dims(), vec![5, 5]);
        assert!(field.iter().all(|v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn random_fields_differ_tick_to_tick() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = random_with(scheduler.clone(), NoiseOptions::default().seed(1).shape(&[8]));

        let a = first_field(&mut stream, &scheduler);
        let b = first_field(&mut stream, &scheduler);
        assert_ne!(a, b);
    }

    #[test]
    fn gradient_noise_streams_produce_volumes() {
        let scheduler = Rc::new(ManualScheduler::new());
        let options = NoiseOptions::default().seed(4).shape(&[3, 3, 3]).framerate(30.0);

        let mut simplex = simplexnoise_with(scheduler.clone(), options.clone());
        let mut perlin = perlinnoise_with(scheduler.clone(), options);
        scheduler.advance(40.0);

        let s = block_on(simplex.next()).unwrap().unwrap();
        let p = block_on(perlin.next()).unwrap().unwrap();
        assert_eq!(s.dims(), vec![3, 3, 3]);
        assert_eq!(p.dims(), vec![3, 3, 3]);
    }

    #[test]
    fn invalid_shapes_fail_before_scheduling() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut stream = random_with(scheduler.clone(), NoiseOptions::default().shape(&[0, 2]));

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(
            block_on(stream.next()),
            Some(Err(SensorError::Noise(NoiseError::InvalidShape(vec![0, 2]))))
        );
    }

    #[test]
    fn teardown_stops_sampling() {
        let scheduler = Rc::new(ManualScheduler::new());
        let stream = perlinnoise_with(scheduler.clone(), NoiseOptions::default());
        assert_eq!(scheduler.pending(), 1);

        drop(stream);
        assert_eq!(scheduler.pending(), 0);
    }
}
