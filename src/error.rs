use thiserror::Error;

use crate::cadence::CadenceError;
use crate::noise::NoiseError;

/// Failure delivered through a sensor stream's failure channel.
///
/// A stream yields at most one of these and then ends.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("could not acquire {device}: {reason}")]
    Acquisition { device: &'static str, reason: String },

    #[error("{0} is not available on this host")]
    Unsupported(&'static str),

    #[error(transparent)]
    Cadence(#[from] CadenceError),

    #[error(transparent)]
    Noise(#[from] NoiseError),
}

impl SensorError {
    pub fn acquisition(device: &'static str, reason: impl Into<String>) -> Self {
        SensorError::Acquisition { device, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_cadence_errors_transparently() {
        let err: SensorError = CadenceError::MissingCallback.into();
        assert_eq!(err.to_string(), CadenceError::MissingCallback.to_string());
    }

    #[test]
    fn acquisition_message_names_the_device() {
        let err = SensorError::acquisition("camera", "NotAllowedError");
        assert_eq!(err.to_string(), "could not acquire camera: NotAllowedError");
    }
}
