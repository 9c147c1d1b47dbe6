use noise::{NoiseFn, Perlin, Simplex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub type Coord = f64;
pub type Sample = f64;
pub type Seed = u64;

/// A scalar field sampled in two or three dimensions.
pub trait NoiseSource {
    fn sample2(&mut self, x: Coord, y: Coord) -> Sample;

    fn sample3(&mut self, x: Coord, y: Coord, z: Coord) -> Sample;
}

/// Adapts a pair of closures into a [`NoiseSource`].
pub struct FnSource<F2, F3> {
    fn2d: F2,
    fn3d: F3,
}

impl<F2, F3> FnSource<F2, F3>
where
    F2: FnMut(Coord, Coord) -> Sample,
    F3: FnMut(Coord, Coord, Coord) -> Sample,
{
    pub fn new(fn2d: F2, fn3d: F3) -> Self {
        FnSource { fn2d, fn3d }
    }
}

impl<F2, F3> NoiseSource for FnSource<F2, F3>
where
    F2: FnMut(Coord, Coord) -> Sample,
    F3: FnMut(Coord, Coord, Coord) -> Sample,
{
    fn sample2(&mut self, x: Coord, y: Coord) -> Sample {
        (self.fn2d)(x, y)
    }

    fn sample3(&mut self, x: Coord, y: Coord, z: Coord) -> Sample {
        (self.fn3d)(x, y, z)
    }
}

/// Independent uniform values in `[0, 1)`; coordinates are ignored.
pub struct UniformSource {
    rng: ChaCha8Rng,
}

impl UniformSource {
    pub fn new(seed: Seed) -> Self {
        UniformSource {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl NoiseSource for UniformSource {
    fn sample2(&mut self, _x: Coord, _y: Coord) -> Sample {
        self.rng.gen::<f64>()
    }

    fn sample3(&mut self, _x: Coord, _y: Coord, _z: Coord) -> Sample {
        self.rng.gen::<f64>()
    }
}

pub struct SimplexSource {
    generator: Simplex,
}

impl SimplexSource {
    pub fn new(seed: Seed) -> Self {
        SimplexSource {
            generator: Simplex::new(fold_seed(seed)),
        }
    }
}

impl NoiseSource for SimplexSource {
    fn sample2(&mut self, x: Coord, y: Coord) -> Sample {
        self.generator.get([x, y])
    }

    fn sample3(&mut self, x: Coord, y: Coord, z: Coord) -> Sample {
        self.generator.get([x, y, z])
    }
}

pub struct PerlinSource {
    generator: Perlin,
}

impl PerlinSource {
    pub fn new(seed: Seed) -> Self {
        PerlinSource {
            generator: Perlin::new(fold_seed(seed)),
        }
    }
}

impl NoiseSource for PerlinSource {
    fn sample2(&mut self, x: Coord, y: Coord) -> Sample {
        self.generator.get([x, y])
    }

    fn sample3(&mut self, x: Coord, y: Coord, z: Coord) -> Sample {
        self.generator.get([x, y, z])
    }
}

// gradient-noise generators take 32-bit seeds
fn fold_seed(seed: Seed) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_values_stay_in_unit_range() {
        let mut source = UniformSource::new(7);
        for i in 0..1000 {
            let v = source.sample2(i as f64, 0.0);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn uniform_source_is_reproducible_per_seed() {
        let mut a = UniformSource::new(42);
        let mut b = UniformSource::new(42);
        let mut c = UniformSource::new(43);

        let xs: Vec<_> = (0..8).map(|_| a.sample3(0.0, 0.0, 0.0)).collect();
        let ys: Vec<_> = (0..8).map(|_| b.sample3(0.0, 0.0, 0.0)).collect();
        let zs: Vec<_> = (0..8).map(|_| c.sample3(0.0, 0.0, 0.0)).collect();

        assert_eq!(xs, ys);
        assert_ne!(xs, zs);
    }

    #[test]
    fn gradient_sources_are_pure_in_their_coordinates() {
        let mut simplex = SimplexSource::new(3);
        let mut perlin = PerlinSource::new(3);

        assert_eq!(simplex.sample2(1.25, 2.5), simplex.sample2(1.25, 2.5));
        assert_eq!(perlin.sample3(0.3, 1.7, 4.1), perlin.sample3(0.3, 1.7, 4.1));
    }

    #[test]
    fn gradient_sources_stay_bounded() {
        let mut simplex = SimplexSource::new(11);
        let mut perlin = PerlinSource::new(11);

        for i in 0..200 {
            let t = i as f64 * 0.37;
            assert!(simplex.sample3(t, t * 0.5, t * 0.25).abs() <= 1.5);
            assert!(perlin.sample2(t, t * 1.3).abs() <= 1.5);
        }
    }

    #[test]
    fn closures_become_sources() {
        let mut source = FnSource::new(|x: f64, y: f64| x + y, |x: f64, y: f64, z: f64| x * y * z);
        assert_eq!(source.sample2(1.0, 2.0), 3.0);
        assert_eq!(source.sample3(2.0, 3.0, 4.0), 24.0);
    }
}
