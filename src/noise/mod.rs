//! Time-drifting noise fields.
//!
//! [`sample_noise`] evaluates pluggable 2D/3D value functions over a 1-3
//! dimensional grid. Every index is offset by the current time in seconds, so
//! sampling the same shape repeatedly yields an animated field.

mod sampler;
pub mod source;

use thiserror::Error;

pub use sampler::{sample_noise, sample_noise_at, sample_source, sample_source_at, NoiseField, Shape};
pub use source::{FnSource, NoiseSource, PerlinSource, SimplexSource, UniformSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoiseError {
    #[error("noise shape must have 1 to 3 extents with a non-zero first extent, got {0:?}")]
    InvalidShape(Vec<usize>),
}
