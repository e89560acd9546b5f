//! Errors raised while building filters and estimators from configuration.
//!
//! Per-sample operations never fail; every anomaly in the sensor stream is
//! absorbed by the component that sees it. Only construction is fallible.

use std::time::Duration;

use thiserror::Error;

/// A configuration value that cannot produce a working filter or estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The cutoff frequency must lie strictly between zero and the Nyquist
    /// frequency of the assumed sampling rate.
    #[error("cutoff {cutoff_hz} Hz is outside (0, {sampling_hz} / 2) Hz")]
    InvalidCutoff {
        /// Requested cutoff frequency in Hz.
        cutoff_hz: f64,
        /// Assumed sampling frequency in Hz.
        sampling_hz: f64,
    },
    /// A step gate whose lower limit is not below its upper limit would
    /// reject every sample.
    #[error("step gate minimum {min:?} is not below maximum {max:?}")]
    InvalidStepGate {
        /// Smallest accepted step.
        min: Duration,
        /// Largest accepted step.
        max: Duration,
    },
    /// An axis of the bounding volume has `min > max`.
    #[error("bounds on axis {axis} are inverted: [{min}, {max}]")]
    InvalidBounds {
        /// Axis index, `0..3`.
        axis: usize,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Zero-snapping is requested but the origin is not inside the bounds of
    /// an axis, so a snapped position would itself be out of bounds.
    #[error("clamp policy snaps to zero but 0 is outside the bounds of axis {axis}")]
    OriginOutsideBounds {
        /// Axis index, `0..3`.
        axis: usize,
    },
    /// The velocity decay factor must be in `[0, 1)`.
    #[error("velocity decay {0} is not in [0, 1)")]
    InvalidDecay(f64),
    /// The velocity blend weight must be in `[0, 1]`.
    #[error("velocity blend {0} is not in [0, 1]")]
    InvalidBlend(f64),
    /// Smoothing weights must be non-negative and not all zero.
    #[error("smoothing weights must be non-negative with a positive sum")]
    InvalidSmoothingWeights,
    /// The axis convention is not a signed permutation.
    #[error("axis convention is not a signed permutation of x, y, z")]
    InvalidAxisConvention,
    /// A configured scalar is NaN or infinite.
    #[error("{0} must be finite")]
    NonFinite(&'static str),
}

/// Returns `Err(ConfigError::NonFinite)` when `value` is NaN or infinite.
pub(crate) fn ensure_finite(value: f64, name: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite(name))
    }
}
