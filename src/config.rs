//! Tuning of the [`PositionEstimator`](crate::position::PositionEstimator).
//!
//! The estimator went through several heuristic variants. Each one is kept
//! as a named [`Profile`] whose constants live in a
//! [`PositionEstimatorConfig`], so a variant is data rather than a fork of
//! the integrator.

use std::time::Duration;

use nalgebra::Vector3;

use crate::coefficients::{BiquadDesign, QuarticDesign};
use crate::error::{ensure_finite, ConfigError};
use crate::filter::{FilterSettings, Priming};
use crate::frame::{AxisConvention, GRAVITY_MAGNITUDE};

/// Named variant a configuration was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Profile {
    /// See [`PositionEstimatorConfig::rolling_mean`].
    RollingMean,
    /// See [`PositionEstimatorConfig::gravity_rotation`].
    GravityRotation,
    /// See [`PositionEstimatorConfig::filtered`].
    Filtered,
    /// See [`PositionEstimatorConfig::unbiased`].
    Unbiased,
    /// See [`PositionEstimatorConfig::trapezoidal`].
    Trapezoidal,
    /// Hand-assembled configuration.
    Custom,
}

/// How the constant part of the accelerometer signal is removed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BiasRemoval {
    /// The samples are already free of gravity and bias, e.g. the output of
    /// an [`AccelerometerUnbiasEstimator`](crate::unbias::AccelerometerUnbiasEstimator)
    /// or a zero-DC prefilter.
    None,
    /// A per-axis mean is subtracted. The mean follows the sample on an axis
    /// only while the current sample and the previous three agree within
    /// `stability_threshold`, i.e. while the device looks stationary.
    RollingMean {
        /// Largest spread of the sample window, in m/s^2, still considered
        /// stationary.
        stability_threshold: f64,
    },
    /// Gravity, known in the world frame, is rotated into the device frame
    /// with the current orientation and subtracted.
    GravityRotation {
        /// Gravity in the world frame, m/s^2.
        gravity: Vector3<f64>,
    },
}

/// What happens to a position axis that leaves the bounding volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClampPolicy {
    /// The axis snaps back to the origin.
    Zero,
    /// The axis is pinned to the bound it crossed.
    Bound,
}

/// Per-axis `[min, max]` limits on position.
///
/// The limits may be asymmetric, e.g. a vertical axis that only allows
/// excursions below the starting height.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingVolume {
    /// Lower limit per axis.
    pub min: Vector3<f64>,
    /// Upper limit per axis.
    pub max: Vector3<f64>,
}

impl BoundingVolume {
    /// `[-half_extent, half_extent]` on every axis.
    #[must_use]
    pub fn symmetric(half_extent: f64) -> Self {
        Self {
            min: Vector3::from_element(-half_extent),
            max: Vector3::from_element(half_extent),
        }
    }

    /// Returns `true` if `value` lies within the limits of `axis`.
    #[must_use]
    pub fn contains(&self, axis: usize, value: f64) -> bool {
        (self.min[axis]..=self.max[axis]).contains(&value)
    }

    fn validate(&self, policy: ClampPolicy) -> Result<(), ConfigError> {
        for axis in 0..3 {
            let (min, max) = (self.min[axis], self.max[axis]);
            ensure_finite(min, "bounding volume minimum")?;
            ensure_finite(max, "bounding volume maximum")?;
            if min > max {
                return Err(ConfigError::InvalidBounds { axis, min, max });
            }
            if policy == ClampPolicy::Zero && !self.contains(axis, 0.0) {
                return Err(ConfigError::OriginOutsideBounds { axis });
            }
        }
        Ok(())
    }
}

/// Configuration of a [`PositionEstimator`](crate::position::PositionEstimator).
///
/// Scale factors `velocity_scale` and `position_scale` rescale elapsed time
/// in the integration steps; they are tuning constants, not unit conversions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionEstimatorConfig {
    /// Variant this configuration was derived from.
    pub profile: Profile,
    /// Ticks closer than this to the previous accepted tick are held.
    pub min_step: Duration,
    /// A gap longer than this restarts timing without integrating.
    pub max_step: Option<Duration>,
    /// Filter applied to the raw samples before anything else.
    pub prefilter: Option<FilterSettings>,
    /// Bias and gravity handling.
    pub bias: BiasRemoval,
    /// Mapping from raw sensor axes to the frame of the orientation.
    pub axis_convention: AxisConvention,
    /// Rotate samples into the world frame with the orientation of each
    /// tick. When `false` the orientation is ignored and integration happens
    /// in the sensor axes.
    pub world_frame: bool,
    /// Rotated acceleration components below this magnitude, in m/s^2, are
    /// treated as zero.
    pub noise_floor: f64,
    /// Weights of the current, previous and older acceleration in the
    /// smoothed acceleration.
    pub smoothing_weights: [f64; 3],
    /// Time scale of the velocity update.
    pub velocity_scale: f64,
    /// Time scale of the position update.
    pub position_scale: f64,
    /// Filter applied to the integrated velocity.
    pub velocity_filter: Option<FilterSettings>,
    /// Weight of the filtered velocity against the previous velocity when a
    /// velocity filter is configured.
    pub velocity_blend: f64,
    /// Relative change below which a velocity axis is considered stable.
    pub velocity_stability_threshold: f64,
    /// Factor applied to a stable velocity axis on ticks without
    /// acceleration.
    pub velocity_decay: f64,
    /// Limits on position.
    pub bounds: BoundingVolume,
    /// Behaviour on leaving `bounds`.
    pub clamp_policy: ClampPolicy,
    /// Symmetric limit on every velocity axis.
    pub velocity_limit: Option<f64>,
}

impl PositionEstimatorConfig {
    /// Bias removal by a stationary rolling mean, smoothing `0.5 / 0.3 / 0.2`
    /// and a symmetric `±5` volume with zero-snapping.
    #[must_use]
    pub fn rolling_mean() -> Self {
        Self {
            profile: Profile::RollingMean,
            min_step: Duration::from_millis(1),
            max_step: Some(Duration::from_secs(1)),
            prefilter: None,
            bias: BiasRemoval::RollingMean {
                stability_threshold: 0.09,
            },
            axis_convention: AxisConvention::LANDSCAPE,
            world_frame: true,
            noise_floor: 0.05,
            smoothing_weights: [0.5, 0.3, 0.2],
            velocity_scale: 20.0,
            position_scale: 20.0,
            velocity_filter: None,
            velocity_blend: 0.5,
            velocity_stability_threshold: 0.1,
            velocity_decay: 0.9,
            bounds: BoundingVolume::symmetric(5.0),
            clamp_policy: ClampPolicy::Zero,
            velocity_limit: None,
        }
    }

    /// Gravity of [`GRAVITY_MAGNITUDE`] along the world up axis is rotated
    /// into the device frame and subtracted. Position is pinned to a `±3`
    /// volume and velocity limited.
    #[must_use]
    pub fn gravity_rotation() -> Self {
        Self {
            profile: Profile::GravityRotation,
            bias: BiasRemoval::GravityRotation {
                gravity: Vector3::new(0.0, GRAVITY_MAGNITUDE, 0.0),
            },
            bounds: BoundingVolume::symmetric(3.0),
            clamp_policy: ClampPolicy::Bound,
            velocity_limit: Some(2.0),
            ..Self::rolling_mean()
        }
    }

    /// Raw samples go through the zero-DC accelerometer bandpass, velocity
    /// through a second-order smoother blended `50/50` with the previous
    /// velocity. The vertical axis may only move below its start.
    #[must_use]
    pub fn filtered() -> Self {
        Self {
            profile: Profile::Filtered,
            prefilter: Some(
                FilterSettings::ungated(BiquadDesign::AccelerometerBandpass)
                    .with_priming(Priming::SteadyState),
            ),
            bias: BiasRemoval::None,
            noise_floor: 0.009,
            smoothing_weights: [0.5, 0.25, 0.25],
            velocity_filter: Some(
                FilterSettings::ungated(BiquadDesign::VelocitySmoothing)
                    .with_priming(Priming::SteadyState),
            ),
            velocity_decay: 0.95,
            bounds: BoundingVolume {
                min: Vector3::new(-5.0, -5.0, -5.0),
                max: Vector3::new(5.0, 0.0, 5.0),
            },
            ..Self::rolling_mean()
        }
    }

    /// For samples that already had gravity removed. Velocity goes through
    /// the fourth-order smoother.
    #[must_use]
    pub fn unbiased() -> Self {
        Self {
            profile: Profile::Unbiased,
            bias: BiasRemoval::None,
            velocity_filter: Some(
                FilterSettings::ungated(QuarticDesign::VelocitySmoothing)
                    .with_priming(Priming::SteadyState),
            ),
            ..Self::rolling_mean()
        }
    }

    /// The plain integrator: raw sensor axes, no bias removal, no noise
    /// floor and no rotation. Acceleration is averaged with the previous
    /// tick and each axis snaps back to zero outside `±10`. The scales make
    /// one tick at 1 kHz advance velocity by `a[n] + a[n-1]` milliseconds.
    #[must_use]
    pub fn trapezoidal() -> Self {
        Self {
            profile: Profile::Trapezoidal,
            bias: BiasRemoval::None,
            axis_convention: AxisConvention::IDENTITY,
            world_frame: false,
            noise_floor: 0.0,
            smoothing_weights: [0.5, 0.5, 0.0],
            velocity_scale: 2.0,
            position_scale: 2.0,
            bounds: BoundingVolume::symmetric(10.0),
            clamp_policy: ClampPolicy::Zero,
            ..Self::rolling_mean()
        }
    }

    /// Checks every constant. Filter designs are checked when the estimator
    /// builds them.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max_step) = self.max_step {
            if self.min_step >= max_step {
                return Err(ConfigError::InvalidStepGate {
                    min: self.min_step,
                    max: max_step,
                });
            }
        }

        match self.bias {
            BiasRemoval::None => {}
            BiasRemoval::RollingMean {
                stability_threshold,
            } => ensure_finite(stability_threshold, "stability threshold")?,
            BiasRemoval::GravityRotation { gravity } => {
                for &component in gravity.iter() {
                    ensure_finite(component, "gravity")?;
                }
            }
        }

        self.axis_convention.validate()?;
        ensure_finite(self.noise_floor, "noise floor")?;

        let weights = &self.smoothing_weights;
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0
        {
            return Err(ConfigError::InvalidSmoothingWeights);
        }

        ensure_finite(self.velocity_scale, "velocity scale")?;
        ensure_finite(self.position_scale, "position scale")?;
        ensure_finite(self.velocity_stability_threshold, "velocity stability threshold")?;

        if !(0.0..=1.0).contains(&self.velocity_blend) {
            return Err(ConfigError::InvalidBlend(self.velocity_blend));
        }
        if !(0.0..1.0).contains(&self.velocity_decay) {
            return Err(ConfigError::InvalidDecay(self.velocity_decay));
        }

        self.bounds.validate(self.clamp_policy)?;

        if let Some(limit) = self.velocity_limit {
            ensure_finite(limit, "velocity limit")?;
        }
        Ok(())
    }
}

impl Default for PositionEstimatorConfig {
    fn default() -> Self {
        Self::rolling_mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_profile_is_valid() {
        for config in [
            PositionEstimatorConfig::rolling_mean(),
            PositionEstimatorConfig::gravity_rotation(),
            PositionEstimatorConfig::filtered(),
            PositionEstimatorConfig::unbiased(),
            PositionEstimatorConfig::trapezoidal(),
        ] {
            assert_eq!(config.validate(), Ok(()), "{:?}", config.profile);
        }
    }

    #[test]
    fn zero_snap_requires_origin_inside_bounds() {
        let config = PositionEstimatorConfig {
            bounds: BoundingVolume {
                min: Vector3::new(-1.0, 0.5, -1.0),
                max: Vector3::new(1.0, 2.0, 1.0),
            },
            ..PositionEstimatorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::OriginOutsideBounds { axis: 1 })
        );

        let pinned = PositionEstimatorConfig {
            clamp_policy: ClampPolicy::Bound,
            ..config
        };
        assert_eq!(pinned.validate(), Ok(()));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let config = PositionEstimatorConfig {
            bounds: BoundingVolume {
                min: Vector3::new(-1.0, -1.0, 1.0),
                max: Vector3::new(1.0, 1.0, -1.0),
            },
            clamp_policy: ClampPolicy::Bound,
            ..PositionEstimatorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBounds {
                axis: 2,
                min: 1.0,
                max: -1.0
            })
        );
    }

    #[test]
    fn out_of_range_constants_are_rejected() {
        let decay = PositionEstimatorConfig {
            velocity_decay: 1.0,
            ..PositionEstimatorConfig::default()
        };
        assert_eq!(decay.validate(), Err(ConfigError::InvalidDecay(1.0)));

        let weights = PositionEstimatorConfig {
            smoothing_weights: [0.0, 0.0, 0.0],
            ..PositionEstimatorConfig::default()
        };
        assert_eq!(weights.validate(), Err(ConfigError::InvalidSmoothingWeights));

        let steps = PositionEstimatorConfig {
            min_step: Duration::from_secs(2),
            ..PositionEstimatorConfig::default()
        };
        assert!(matches!(
            steps.validate(),
            Err(ConfigError::InvalidStepGate { .. })
        ));

        let floor = PositionEstimatorConfig {
            noise_floor: f64::NAN,
            ..PositionEstimatorConfig::default()
        };
        assert_eq!(floor.validate(), Err(ConfigError::NonFinite("noise floor")));
    }
}
