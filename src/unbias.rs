//! Separation of gravity from measured acceleration.
//!
//! The [`AccelerometerUnbiasEstimator`] removes the slowly varying part of
//! the accelerometer signal, which for a head-mounted device is dominated by
//! gravity, and keeps the motion component for the integrator.

use log::{debug, trace};
use nalgebra::Vector3;

use crate::coefficients::{BiquadDesign, DEFAULT_SAMPLING_HZ};
use crate::error::ConfigError;
use crate::filter::{AnyFilter, FilterSettings, Priming};

/// Cutoff of the smoothing lowpass in cascade mode, in Hz.
const DEFAULT_LOWPASS_HZ: f64 = 6.0;

/// Cutoff of the gravity-removing highpass, in Hz.
const DEFAULT_HIGHPASS_HZ: f64 = 0.3;

/// Filter topology of an [`AccelerometerUnbiasEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnbiasMode {
    /// Samples go through the lowpass first, its output through the highpass.
    Cascade {
        /// Lowpass applied to the raw samples.
        lowpass: FilterSettings,
        /// Highpass applied to the lowpass output.
        highpass: FilterSettings,
    },
    /// A single highpass, acting as a notch around DC, on the raw samples.
    SingleStage {
        /// Highpass applied to the raw samples.
        highpass: FilterSettings,
    },
}

/// Configuration of an [`AccelerometerUnbiasEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnbiasConfig {
    /// Filter topology.
    pub mode: UnbiasMode,
}

impl UnbiasConfig {
    /// A gated Butterworth lowpass followed by a gated Butterworth highpass,
    /// both designed for [`DEFAULT_SAMPLING_HZ`].
    #[must_use]
    pub fn cascade(lowpass_hz: f64, highpass_hz: f64) -> Self {
        Self {
            mode: UnbiasMode::Cascade {
                lowpass: FilterSettings::gated(BiquadDesign::ButterworthLowpass {
                    cutoff_hz: lowpass_hz,
                    sampling_hz: DEFAULT_SAMPLING_HZ,
                }),
                highpass: gravity_notch(highpass_hz),
            },
        }
    }

    /// A single gated Butterworth highpass designed for
    /// [`DEFAULT_SAMPLING_HZ`].
    #[must_use]
    pub fn single_stage(highpass_hz: f64) -> Self {
        Self {
            mode: UnbiasMode::SingleStage {
                highpass: gravity_notch(highpass_hz),
            },
        }
    }
}

impl Default for UnbiasConfig {
    fn default() -> Self {
        Self::cascade(DEFAULT_LOWPASS_HZ, DEFAULT_HIGHPASS_HZ)
    }
}

fn gravity_notch(cutoff_hz: f64) -> FilterSettings {
    FilterSettings::gated(BiquadDesign::ButterworthHighpass {
        cutoff_hz,
        sampling_hz: DEFAULT_SAMPLING_HZ,
    })
    .with_priming(Priming::SteadyState)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stages {
    Cascade {
        lowpass: AnyFilter,
        highpass: AnyFilter,
    },
    SingleStage {
        highpass: AnyFilter,
    },
}

/// Estimates the accelerometer signal without gravity.
///
/// # Example
///
/// ```rust
/// use inertial_position::unbias::{AccelerometerUnbiasEstimator, UnbiasConfig};
/// use nalgebra::Vector3;
///
/// let mut estimator = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
/// let gravity = Vector3::new(0.0, 9.81, 0.0);
///
/// for i in 0..100 {
///     estimator.process_accelerometer(&gravity, i * 15_000_000);
/// }
///
/// // a device at rest has no motion component left.
/// assert!(estimator.accelerometer_without_gravity().norm() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerometerUnbiasEstimator {
    stages: Stages,
    accelerometer_minus_gravity: Vector3<f64>,
    timestamp_ns: Option<u64>,
}

impl AccelerometerUnbiasEstimator {
    /// Builds the filters described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if one of the filters cannot be built.
    pub fn new(config: &UnbiasConfig) -> Result<Self, ConfigError> {
        let stages = match config.mode {
            UnbiasMode::Cascade { lowpass, highpass } => Stages::Cascade {
                lowpass: lowpass.build()?,
                highpass: highpass.build()?,
            },
            UnbiasMode::SingleStage { highpass } => Stages::SingleStage {
                highpass: highpass.build()?,
            },
        };
        debug!("accelerometer unbias estimator built with {:?}", config.mode);

        Ok(Self {
            stages,
            accelerometer_minus_gravity: Vector3::zeros(),
            timestamp_ns: None,
        })
    }

    /// Feeds one raw accelerometer sample. A sample with a NaN or infinite
    /// component is dropped and the previous estimate kept.
    pub fn process_accelerometer(&mut self, sample: &Vector3<f64>, timestamp_ns: u64) {
        if !sample.iter().all(|v| v.is_finite()) {
            trace!("non-finite accelerometer sample at {timestamp_ns} ns dropped");
            return;
        }

        let highpass = match &mut self.stages {
            Stages::Cascade { lowpass, highpass } => {
                lowpass.add_sample(*sample, timestamp_ns);
                highpass.add_sample(lowpass.filtered_data(), timestamp_ns);
                highpass
            }
            Stages::SingleStage { highpass } => {
                highpass.add_sample(*sample, timestamp_ns);
                highpass
            }
        };

        self.accelerometer_minus_gravity = highpass.filtered_data();
        self.timestamp_ns = Some(timestamp_ns);
    }

    /// Resets every owned filter and the estimate.
    pub fn reset(&mut self) {
        match &mut self.stages {
            Stages::Cascade { lowpass, highpass } => {
                lowpass.reset();
                highpass.reset();
            }
            Stages::SingleStage { highpass } => highpass.reset(),
        }
        self.accelerometer_minus_gravity = Vector3::zeros();
        self.timestamp_ns = None;
    }

    /// The latest estimate, zero before the first sample.
    #[must_use]
    pub fn accelerometer_without_gravity(&self) -> Vector3<f64> {
        self.accelerometer_minus_gravity
    }

    /// Output of the lowpass stage in cascade mode.
    #[must_use]
    pub fn smoothed_accelerometer(&self) -> Option<Vector3<f64>> {
        match &self.stages {
            Stages::Cascade { lowpass, .. } => Some(lowpass.filtered_data()),
            Stages::SingleStage { .. } => None,
        }
    }

    /// Timestamp of the last processed sample.
    #[must_use]
    pub fn timestamp_ns(&self) -> Option<u64> {
        self.timestamp_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP_NS: u64 = 15_000_000;

    fn gravity() -> Vector3<f64> {
        Vector3::new(0.3, 9.7, -0.8)
    }

    #[test]
    fn estimate_is_zero_before_any_sample() {
        let estimator = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
        assert_eq!(estimator.accelerometer_without_gravity(), Vector3::zeros());
        assert_eq!(estimator.timestamp_ns(), None);
    }

    #[test]
    fn static_gravity_is_removed_in_both_modes() {
        for config in [UnbiasConfig::default(), UnbiasConfig::single_stage(0.3)] {
            let mut estimator = AccelerometerUnbiasEstimator::new(&config).unwrap();
            for i in 0..200 {
                estimator.process_accelerometer(&gravity(), i * STEP_NS);
            }
            assert!(
                estimator.accelerometer_without_gravity().norm() < 1e-6,
                "{:?}",
                config.mode
            );
        }
    }

    #[test]
    fn static_gravity_is_removed_at_one_kilohertz() {
        let mut estimator = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
        for i in 1..=5_000 {
            estimator.process_accelerometer(&gravity(), i * 1_000_000);
        }
        assert!(estimator.accelerometer_without_gravity().norm() < 1e-6);
        assert!((estimator.smoothed_accelerometer().unwrap() - gravity()).norm() < 1e-6);
    }

    #[test]
    fn non_finite_samples_keep_the_previous_estimate() {
        let mut estimator = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
        for i in 0..100 {
            estimator.process_accelerometer(&gravity(), i * STEP_NS);
        }
        let before = estimator.accelerometer_without_gravity();

        estimator.process_accelerometer(&Vector3::new(f64::NAN, 9.7, 0.0), 100 * STEP_NS);
        assert_eq!(estimator.accelerometer_without_gravity(), before);

        estimator.process_accelerometer(&(gravity() + Vector3::new(2.0, 0.0, 0.0)), 101 * STEP_NS);
        assert!(estimator.accelerometer_without_gravity().x > 0.05);
    }

    #[test]
    fn sudden_motion_shows_up_in_the_estimate() {
        let mut estimator =
            AccelerometerUnbiasEstimator::new(&UnbiasConfig::single_stage(0.3)).unwrap();
        for i in 0..100 {
            estimator.process_accelerometer(&gravity(), i * STEP_NS);
        }

        let push = Vector3::new(2.0, 0.0, 0.0);
        estimator.process_accelerometer(&(gravity() + push), 100 * STEP_NS);
        assert!(estimator.accelerometer_without_gravity().x > 1.5);
    }

    #[test]
    fn cascade_exposes_the_smoothed_signal() {
        let mut cascade = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
        let single = AccelerometerUnbiasEstimator::new(&UnbiasConfig::single_stage(0.3)).unwrap();
        assert_eq!(single.smoothed_accelerometer(), None);

        for i in 0..100 {
            cascade.process_accelerometer(&gravity(), i * STEP_NS);
        }
        let smoothed = cascade.smoothed_accelerometer().unwrap();
        assert!((smoothed - gravity()).norm() < 1e-6);
    }

    #[test]
    fn reset_clears_the_estimate() {
        let mut estimator = AccelerometerUnbiasEstimator::new(&UnbiasConfig::default()).unwrap();
        estimator.process_accelerometer(&gravity(), 0);
        assert_eq!(estimator.accelerometer_without_gravity(), gravity());

        estimator.reset();
        assert_eq!(estimator.accelerometer_without_gravity(), Vector3::zeros());
        assert_eq!(estimator.timestamp_ns(), None);

        // the first sample after a reset passes through again.
        estimator.process_accelerometer(&Vector3::new(1.0, 2.0, 3.0), 10 * STEP_NS);
        assert_eq!(
            estimator.accelerometer_without_gravity(),
            Vector3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn invalid_cutoff_is_reported() {
        let config = UnbiasConfig::cascade(40.0, 0.3);
        assert!(matches!(
            AccelerometerUnbiasEstimator::new(&config),
            Err(ConfigError::InvalidCutoff { .. })
        ));
    }
}
