use std::convert::TryFrom;

use super::source::{Coord, FnSource, NoiseSource, Sample};
use super::NoiseError;
use crate::util::now_seconds;

/// Extents of a requested noise field. A zero extent means the axis is absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Result<Self, NoiseError> {
        if dims.is_empty() || dims.len() > 3 {
            return Err(NoiseError::InvalidShape(dims.to_vec()));
        }

        let at = |i: usize| dims.get(i).copied().unwrap_or(0);
        let shape = Shape { x: at(0), y: at(1), z: at(2) };

        if shape.x == 0 {
            return Err(NoiseError::InvalidShape(dims.to_vec()));
        }
        Ok(shape)
    }

    /// Number of significant axes. `z` is ignored while `y` is absent.
    pub fn rank(&self) -> usize {
        if self.y == 0 {
            1
        } else if self.z == 0 {
            2
        } else {
            3
        }
    }

    pub fn len(&self) -> usize {
        match self.rank() {
            1 => self.x,
            2 => self.x * self.y,
            _ => self.x * self.y * self.z,
        }
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape { x: 1, y: 0, z: 0 }
    }
}

impl TryFrom<&[usize]> for Shape {
    type Error = NoiseError;

    fn try_from(dims: &[usize]) -> Result<Self, Self::Error> {
        Shape::new(dims)
    }
}

/// One snapshot of sampled values, nested as deep as the shape's rank.
#[derive(Clone, Debug, PartialEq)]
pub enum NoiseField {
    Line(Vec<Sample>),
    Plane(Vec<Vec<Sample>>),
    Volume(Vec<Vec<Vec<Sample>>>),
}

impl NoiseField {
    pub fn rank(&self) -> usize {
        match self {
            NoiseField::Line(_) => 1,
            NoiseField::Plane(_) => 2,
            NoiseField::Volume(_) => 3,
        }
    }

    /// Extents per axis, outermost first.
    pub fn dims(&self) -> Vec<usize> {
        match self {
            NoiseField::Line(line) => vec![line.len()],
            NoiseField::Plane(plane) => vec![plane.len(), plane.first().map_or(0, Vec::len)],
            NoiseField::Volume(volume) => {
                let rows = volume.first();
                vec![
                    volume.len(),
                    rows.map_or(0, Vec::len),
                    rows.and_then(|rows| rows.first()).map_or(0, Vec::len),
                ]
            }
        }
    }

    /// All values in index order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Sample> + '_> {
        match self {
            NoiseField::Line(line) => Box::new(line.iter().copied()),
            NoiseField::Plane(plane) => Box::new(plane.iter().flatten().copied()),
            NoiseField::Volume(volume) => Box::new(volume.iter().flatten().flatten().copied()),
        }
    }
}

/// Sample `source` over `shape`, offsetting every index by `instant` seconds.
///
/// Rank 1 samples `sample2(x, 0)`, rank 2 `sample2(x, y)`, rank 3
/// `sample3(x, y, z)`. Indices ascend along every axis.
pub fn sample_source_at<S>(shape: &Shape, source: &mut S, instant: Coord) -> NoiseField
where
    S: NoiseSource + ?Sized,
{
    let coord = |index: usize| index as Coord + instant;

    match shape.rank() {
        1 => {
            let mut line = Vec::with_capacity(shape.x);
            for i in 0..shape.x {
                line.push(source.sample2(coord(i), 0.0));
            }
            NoiseField::Line(line)
        }
        2 => {
            let mut plane = Vec::with_capacity(shape.x);
            for i in 0..shape.x {
                let mut row = Vec::with_capacity(shape.y);
                for j in 0..shape.y {
                    row.push(source.sample2(coord(i), coord(j)));
                }
                plane.push(row);
            }
            NoiseField::Plane(plane)
        }
        _ => {
            let mut volume = Vec::with_capacity(shape.x);
            for i in 0..shape.x {
                let mut plane = Vec::with_capacity(shape.y);
                for j in 0..shape.y {
                    let mut row = Vec::with_capacity(shape.z);
                    for k in 0..shape.z {
                        row.push(source.sample3(coord(i), coord(j), coord(k)));
                    }
                    plane.push(row);
                }
                volume.push(plane);
            }
            NoiseField::Volume(volume)
        }
    }
}

/// [`sample_source_at`] at the current wall-clock instant.
pub fn sample_source<S>(shape: &Shape, source: &mut S) -> NoiseField
where
    S: NoiseSource + ?Sized,
{
    sample_source_at(shape, source, now_seconds())
}

pub fn sample_noise_at<F2, F3>(dims: &[usize], fn2d: F2, fn3d: F3, instant: Coord) -> Result<NoiseField, NoiseError>
where
    F2: FnMut(Coord, Coord) -> Sample,
    F3: FnMut(Coord, Coord, Coord) -> Sample,
{
    let shape = Shape::new(dims)?;
    Ok(sample_source_at(&shape, &mut FnSource::new(fn2d, fn3d), instant))
}

/// Sample a pair of value functions over `dims`, drifting with wall-clock time.
pub fn sample_noise<F2, F3>(dims: &[usize], fn2d: F2, fn3d: F3) -> Result<NoiseField, NoiseError>
where
    F2: FnMut(Coord, Coord) -> Sample,
    F3: FnMut(Coord, Coord, Coord) -> Sample,
{
    sample_noise_at(dims, fn2d, fn3d, now_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(k: f64) -> FnSource<impl FnMut(f64, f64) -> f64, impl FnMut(f64, f64, f64) -> f64> {
        FnSource::new(move |_: f64, _: f64| k, move |_: f64, _: f64, _: f64| k)
    }

    #[test]
    fn shapes_select_the_output_rank() {
        let line = sample_source(&Shape::new(&[5, 0, 0]).unwrap(), &mut constant(0.0));
        let plane = sample_source(&Shape::new(&[5, 5, 0]).unwrap(), &mut constant(0.0));
        let volume = sample_source(&Shape::new(&[3, 3, 3]).unwrap(), &mut constant(0.0));

        assert_eq!(line.dims(), vec![5]);
        assert_eq!(plane.dims(), vec![5, 5]);
        assert_eq!(volume.dims(), vec![3, 3, 3]);
        match volume {
            NoiseField::Volume(v) => assert!(v.iter().flatten().all(|row| row.len() == 3)),
            other => panic!("expected a volume, got rank {}", other.rank()),
        }
    }

    #[test]
    fn short_shapes_fill_missing_axes_with_zero() {
        assert_eq!(Shape::new(&[4]).unwrap(), Shape { x: 4, y: 0, z: 0 });
        assert_eq!(Shape::new(&[4, 2]).unwrap().rank(), 2);
    }

    #[test]
    fn absent_y_ignores_z() {
        let shape = Shape::new(&[4, 0, 7]).unwrap();
        assert_eq!(shape.rank(), 1);
        assert_eq!(sample_source(&shape, &mut constant(1.0)).dims(), vec![4]);
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(Shape::new(&[]).is_err());
        assert!(Shape::new(&[0, 3, 3]).is_err());
        assert!(Shape::new(&[1, 1, 1, 1]).is_err());
        assert!(sample_noise(&[0], |x, _| x, |x, _, _| x).is_err());
    }

    #[test]
    fn constant_functions_fill_every_cell() {
        for dims in &[vec![5], vec![5, 5], vec![3, 3, 3]] {
            let field = sample_noise(dims, |_, _| 0.25, |_, _, _| 0.25).unwrap();
            assert_eq!(field.iter().count(), Shape::new(dims).unwrap().len());
            assert!(field.iter().all(|v| v == 0.25));
        }
    }

    #[test]
    fn coordinates_are_offset_by_the_instant() {
        let field = sample_noise_at(&[3, 2], |x, y| x * 10.0 + y, |_, _, _| 0.0, 100.0).unwrap();

        assert_eq!(
            field,
            NoiseField::Plane(vec![
                vec![1100.0, 1101.0],
                vec![1110.0, 1111.0],
                vec![1120.0, 1121.0],
            ])
        );
    }

    #[test]
    fn line_samples_pass_a_literal_zero_for_y() {
        let field = sample_noise_at(&[2], |x, y| x + y * 1000.0, |_, _, _| 0.0, 5.0).unwrap();
        assert_eq!(field, NoiseField::Line(vec![5.0, 6.0]));
    }

    #[test]
    fn volumes_use_the_three_dimensional_function() {
        let field = sample_noise_at(&[2, 2, 2], |_, _| -1.0, |x, y, z| x + y + z, 0.0).unwrap();
        assert_eq!(field.iter().collect::<Vec<_>>(), vec![0.0, 1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn later_instants_drift_the_field() {
        let first = sample_noise_at(&[4], |x, _| x, |x, _, _| x, 1_000.0).unwrap();
        let second = sample_noise_at(&[4], |x, _| x, |x, _, _| x, 1_001.5).unwrap();

        let drift: Vec<f64> = first.iter().zip(second.iter()).map(|(a, b)| b - a).collect();
        assert!(drift.iter().all(|d| (d - 1.5).abs() < 1e-9));
    }

    #[test]
    fn wall_clock_sampling_drifts_between_calls() {
        let first = sample_noise(&[1], |x, _| x, |x, _, _| x).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = sample_noise(&[1], |x, _| x, |x, _, _| x).unwrap();

        let (a, b) = (first.iter().next().unwrap(), second.iter().next().unwrap());
        assert!(b - a >= 1.0, "offset moved by {}", b - a);
    }
}
