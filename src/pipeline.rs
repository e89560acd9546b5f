//! One tick of the translation path: raw sample, optional gravity
//! separation, integration.

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::PositionEstimatorConfig;
use crate::error::ConfigError;
use crate::position::PositionEstimator;
use crate::unbias::{AccelerometerUnbiasEstimator, UnbiasConfig};

/// An accelerometer reading with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Acceleration in m/s^2, device frame.
    pub acceleration: Vector3<f64>,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

impl Sample {
    /// Creates a sample.
    #[must_use]
    pub fn new(acceleration: Vector3<f64>, timestamp_ns: u64) -> Self {
        Self {
            acceleration,
            timestamp_ns,
        }
    }
}

/// Owns the estimators of the translation path and runs them in order.
///
/// # Example
///
/// ```rust
/// use inertial_position::config::PositionEstimatorConfig;
/// use inertial_position::pipeline::{Sample, TranslationPipeline};
/// use inertial_position::unbias::UnbiasConfig;
/// use nalgebra::{UnitQuaternion, Vector3};
///
/// let mut pipeline = TranslationPipeline::new(
///     Some(&UnbiasConfig::default()),
///     PositionEstimatorConfig::unbiased(),
/// )
/// .unwrap();
///
/// let at_rest = Vector3::new(0.0, 9.81, 0.0);
/// for tick in 1..=200 {
///     let sample = Sample::new(at_rest, tick * 15_000_000);
///     pipeline.update(&sample, &UnitQuaternion::identity());
/// }
/// assert!(pipeline.position().norm() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationPipeline {
    unbias: Option<AccelerometerUnbiasEstimator>,
    position: PositionEstimator,
}

impl TranslationPipeline {
    /// Builds the pipeline. Without an unbias configuration, raw samples go
    /// straight to the position estimator.
    ///
    /// # Errors
    ///
    /// Fails if either configuration is invalid.
    pub fn new(
        unbias: Option<&UnbiasConfig>,
        position: PositionEstimatorConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            unbias: unbias.map(AccelerometerUnbiasEstimator::new).transpose()?,
            position: PositionEstimator::new(position)?,
        })
    }

    /// Runs one tick and returns the position.
    pub fn update(&mut self, sample: &Sample, orientation: &UnitQuaternion<f64>) -> Vector3<f64> {
        let acceleration = match &mut self.unbias {
            Some(unbias) => {
                unbias.process_accelerometer(&sample.acceleration, sample.timestamp_ns);
                unbias.accelerometer_without_gravity()
            }
            None => sample.acceleration,
        };

        self.position
            .get_position(&acceleration, orientation, sample.timestamp_ns)
    }

    /// Runs every sample of a batch, in order, against the same orientation
    /// and returns the position after the last one.
    pub fn update_batch(
        &mut self,
        samples: &[Sample],
        orientation: &UnitQuaternion<f64>,
    ) -> Vector3<f64> {
        for sample in samples {
            self.update(sample, orientation);
        }
        self.position.position()
    }

    /// The latest position.
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        self.position.position()
    }

    /// The gravity-free acceleration, if the pipeline separates gravity.
    #[must_use]
    pub fn acceleration_without_gravity(&self) -> Option<Vector3<f64>> {
        self.unbias
            .as_ref()
            .map(AccelerometerUnbiasEstimator::accelerometer_without_gravity)
    }

    /// The position estimator.
    #[must_use]
    pub fn position_estimator(&self) -> &PositionEstimator {
        &self.position
    }

    /// Resets both estimators.
    pub fn reset(&mut self) {
        if let Some(unbias) = &mut self.unbias {
            unbias.reset();
        }
        self.position.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP_NS: u64 = 15_000_000;

    fn gravity() -> Vector3<f64> {
        Vector3::new(0.0, 9.81, 0.0)
    }

    #[test]
    fn without_unbias_samples_reach_the_integrator_unchanged() {
        let mut pipeline =
            TranslationPipeline::new(None, PositionEstimatorConfig::gravity_rotation()).unwrap();
        assert_eq!(pipeline.acceleration_without_gravity(), None);

        let q = UnitQuaternion::identity();
        let at_rest = Vector3::new(0.0, crate::frame::GRAVITY_MAGNITUDE, 0.0);
        for tick in 1..=100 {
            pipeline.update(&Sample::new(at_rest, tick * STEP_NS), &q);
        }
        assert_eq!(pipeline.position(), Vector3::zeros());
        assert_eq!(pipeline.position_estimator().ticks(), 99);
    }

    #[test]
    fn a_push_moves_the_position() {
        let mut pipeline = TranslationPipeline::new(
            Some(&UnbiasConfig::default()),
            PositionEstimatorConfig::unbiased(),
        )
        .unwrap();
        let q = UnitQuaternion::identity();

        let rest: Vec<_> = (1..=100)
            .map(|tick| Sample::new(gravity(), tick * STEP_NS))
            .collect();
        pipeline.update_batch(&rest, &q);
        assert!(pipeline.position().norm() < 1e-9);

        let push: Vec<_> = (101..=106)
            .map(|tick| Sample::new(gravity() + Vector3::new(1.0, 0.0, 0.0), tick * STEP_NS))
            .collect();
        let position = pipeline.update_batch(&push, &q);
        assert!(position.norm() > 1e-3);
        assert!(pipeline.acceleration_without_gravity().unwrap().norm() > 0.0);
    }

    #[test]
    fn reset_clears_both_estimators() {
        let mut pipeline = TranslationPipeline::new(
            Some(&UnbiasConfig::single_stage(0.3)),
            PositionEstimatorConfig::unbiased(),
        )
        .unwrap();
        let fresh = pipeline.clone();
        let q = UnitQuaternion::identity();
        for tick in 1..=20 {
            pipeline.update(&Sample::new(Vector3::new(1.0, 9.0, 2.0), tick * STEP_NS), &q);
        }

        pipeline.reset();
        assert_eq!(pipeline, fresh);
    }

    #[test]
    fn empty_batch_keeps_the_position() {
        let mut pipeline =
            TranslationPipeline::new(None, PositionEstimatorConfig::default()).unwrap();
        assert_eq!(
            pipeline.update_batch(&[], &UnitQuaternion::identity()),
            Vector3::zeros()
        );
    }
}
