//! Drift-suppressed integration of acceleration into position.
//!
//! One [`PositionEstimator::get_position`] call per sensor tick:
//!
//! 1. the first tick only records the baseline,
//! 2. ticks too close to the previous one are held,
//! 3. bias or gravity is removed,
//! 4. the sample is rotated into the world frame, unless disabled,
//! 5. components under the noise floor are dropped,
//! 6. the acceleration is smoothed over the last three ticks,
//! 7. velocity is integrated (and optionally filtered),
//! 8. velocity decays on axes that see no acceleration,
//! 9. position is integrated with the trapezoidal rule,
//! 10. position is kept inside the bounding volume.

use std::time::Duration;

use log::{debug, trace};
use nalgebra::{UnitQuaternion, Vector3};

use crate::config::{BiasRemoval, ClampPolicy, PositionEstimatorConfig};
use crate::error::ConfigError;
use crate::filter::AnyFilter;
use crate::frame::{gravity_in_device, rotate_into_world};

/// Velocities below this are always considered stable.
const STABILITY_FLOOR: f64 = 0.001;

/// Number of past samples compared against the current one when deciding
/// whether the device is stationary.
const SAMPLE_WINDOW: usize = 3;

/// Integrator state, mutated only by [`PositionEstimator::get_position`]
/// and [`PositionEstimator::reset`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct IntegratorState {
    /// Timestamp of the last accepted tick, `None` before the first one.
    timestamp_ns: Option<u64>,
    orientation: UnitQuaternion<f64>,
    /// Previous samples in the integration axis convention, most recent first.
    samples: [Vector3<f64>; SAMPLE_WINDOW],
    /// Per-axis bias estimate.
    mean_acceleration: Vector3<f64>,
    /// Previous and older noise-gated world acceleration.
    gated_acceleration: [Vector3<f64>; 2],
    /// Smoothed acceleration of the last tick.
    acceleration: Vector3<f64>,
    /// Previous and older velocity.
    velocity: [Vector3<f64>; 2],
    position: Vector3<f64>,
    ticks: u64,
}

impl IntegratorState {
    fn new() -> Self {
        Self {
            timestamp_ns: None,
            orientation: UnitQuaternion::identity(),
            samples: [Vector3::zeros(); SAMPLE_WINDOW],
            mean_acceleration: Vector3::zeros(),
            gated_acceleration: [Vector3::zeros(); 2],
            acceleration: Vector3::zeros(),
            velocity: [Vector3::zeros(); 2],
            position: Vector3::zeros(),
            ticks: 0,
        }
    }

    /// Restarts integration on one axis.
    fn clear_axis(&mut self, axis: usize) {
        for value in self
            .gated_acceleration
            .iter_mut()
            .chain(self.velocity.iter_mut())
        {
            value[axis] = 0.0;
        }
        self.acceleration[axis] = 0.0;
    }
}

/// Estimates translation from accelerometer samples and an externally
/// fused orientation.
///
/// The caller must pass the orientation matching each sample; no time
/// alignment happens here.
///
/// # Example
///
/// ```rust
/// use inertial_position::config::PositionEstimatorConfig;
/// use inertial_position::position::PositionEstimator;
/// use nalgebra::{UnitQuaternion, Vector3};
///
/// let mut estimator =
///     PositionEstimator::new(PositionEstimatorConfig::gravity_rotation()).unwrap();
/// let orientation = UnitQuaternion::identity();
///
/// // a device at rest, landscape axes: gravity shows up on the raw y axis.
/// let at_rest = Vector3::new(0.0, 9.875, 0.0);
/// for tick in 1..=1000 {
///     let position = estimator.get_position(&at_rest, &orientation, tick * 1_000_000);
///     assert_eq!(position, Vector3::zeros());
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEstimator {
    config: PositionEstimatorConfig,
    prefilter: Option<AnyFilter>,
    velocity_filter: Option<AnyFilter>,
    state: IntegratorState,
}

impl PositionEstimator {
    /// Creates an estimator for `config`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is inconsistent or one of its filters
    /// cannot be built.
    pub fn new(config: PositionEstimatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let prefilter = config.prefilter.map(|s| s.build()).transpose()?;
        let velocity_filter = config.velocity_filter.map(|s| s.build()).transpose()?;
        debug!("position estimator built with profile {:?}", config.profile);

        Ok(Self {
            config,
            prefilter,
            velocity_filter,
            state: IntegratorState::new(),
        })
    }

    /// Processes one tick and returns the position estimate.
    ///
    /// `sample` is the raw accelerometer reading in m/s^2 and `orientation`
    /// the device-to-world rotation at the same instant.
    ///
    /// Anomalous ticks return the previous position without integrating. A
    /// zero timestamp, a NaN or infinite sample or orientation, or a step
    /// below [`PositionEstimatorConfig::min_step`] leaves the state and the
    /// owned filters untouched; a timestamp before the previous tick, or one
    /// after a gap above [`PositionEstimatorConfig::max_step`], becomes the
    /// new baseline.
    pub fn get_position(
        &mut self,
        sample: &Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
        timestamp_ns: u64,
    ) -> Vector3<f64> {
        if timestamp_ns == 0 {
            trace!("tick without timestamp ignored");
            return self.state.position;
        }
        if !is_finite(sample.iter()) || !is_finite(orientation.coords.iter()) {
            debug!("non-finite tick at {timestamp_ns} ns ignored");
            return self.state.position;
        }

        let Some(previous_ns) = self.state.timestamp_ns else {
            self.start(sample, orientation, timestamp_ns);
            return self.state.position;
        };

        if timestamp_ns < previous_ns {
            debug!("timestamp went back from {previous_ns} ns to {timestamp_ns} ns, rebasing");
            self.rebase(orientation, timestamp_ns);
            return self.state.position;
        }

        let elapsed = Duration::from_nanos(timestamp_ns - previous_ns);
        if elapsed < self.config.min_step {
            trace!("tick after {elapsed:?} is below the minimum step, holding");
            return self.state.position;
        }
        if self.config.max_step.is_some_and(|max_step| elapsed > max_step) {
            debug!("gap of {elapsed:?} since the last tick, restarting timing");
            self.rebase(orientation, timestamp_ns);
            return self.state.position;
        }

        self.integrate(sample, orientation, timestamp_ns, elapsed.as_secs_f64());
        self.state.position
    }

    /// Returns to the state before the first tick. Owned filters are reset.
    pub fn reset(&mut self) {
        if let Some(filter) = &mut self.prefilter {
            filter.reset();
        }
        if let Some(filter) = &mut self.velocity_filter {
            filter.reset();
        }
        self.state = IntegratorState::new();
    }

    /// The configuration this estimator was built with.
    #[must_use]
    pub fn config(&self) -> &PositionEstimatorConfig {
        &self.config
    }

    /// Returns `true` once the baseline tick has been recorded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state.timestamp_ns.is_some()
    }

    /// The last returned position.
    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        self.state.position
    }

    /// The velocity after the last accepted tick.
    #[must_use]
    pub fn velocity(&self) -> Vector3<f64> {
        self.state.velocity[0]
    }

    /// The smoothed world-frame acceleration of the last accepted tick.
    #[must_use]
    pub fn acceleration(&self) -> Vector3<f64> {
        self.state.acceleration
    }

    /// The per-axis bias estimate used by [`BiasRemoval::RollingMean`].
    #[must_use]
    pub fn mean_acceleration(&self) -> Vector3<f64> {
        self.state.mean_acceleration
    }

    /// Orientation of the last accepted tick.
    #[must_use]
    pub fn previous_orientation(&self) -> UnitQuaternion<f64> {
        self.state.orientation
    }

    /// Number of ticks integrated since the baseline.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.ticks
    }

    fn start(&mut self, sample: &Vector3<f64>, orientation: &UnitQuaternion<f64>, timestamp_ns: u64) {
        let sample = self.prefiltered(sample, timestamp_ns);
        if let Some(filter) = &mut self.velocity_filter {
            filter.add_sample(Vector3::zeros(), timestamp_ns);
        }

        self.state.timestamp_ns = Some(timestamp_ns);
        self.state.orientation = *orientation;
        self.state.samples = [sample; SAMPLE_WINDOW];
        self.state.mean_acceleration = sample;
        trace!("baseline tick at {timestamp_ns} ns");
    }

    /// Moves the baseline, and the reference timestamp of every owned filter,
    /// to `timestamp_ns` without integrating.
    fn rebase(&mut self, orientation: &UnitQuaternion<f64>, timestamp_ns: u64) {
        self.state.timestamp_ns = Some(timestamp_ns);
        self.state.orientation = *orientation;
        for filter in self.prefilter.iter_mut().chain(self.velocity_filter.iter_mut()) {
            filter.rebase(timestamp_ns);
        }
    }

    fn integrate(
        &mut self,
        sample: &Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
        timestamp_ns: u64,
        dt: f64,
    ) {
        let sample = self.prefiltered(sample, timestamp_ns);
        let corrected = self.remove_bias(&sample, orientation);
        let rotated = if self.config.world_frame {
            rotate_into_world(orientation, &corrected)
        } else {
            corrected
        };

        let noise_floor = self.config.noise_floor;
        let gated = rotated.map(|a| if a.abs() < noise_floor { 0.0 } else { a });

        let [w_current, w_previous, w_older] = self.config.smoothing_weights;
        let [previous_gated, older_gated] = self.state.gated_acceleration;
        let acceleration = w_current * gated + w_previous * previous_gated + w_older * older_gated;

        let velocity = self.update_velocity(&acceleration, &gated, timestamp_ns, dt);

        let previous_velocity = self.state.velocity[0];
        let position = self.state.position
            + 0.5 * (velocity + previous_velocity) * dt * self.config.position_scale;

        self.state.samples.rotate_right(1);
        self.state.samples[0] = sample;
        self.state.gated_acceleration = [gated, previous_gated];
        self.state.acceleration = acceleration;
        self.state.velocity = [velocity, previous_velocity];
        self.state.position = position;
        self.bound_position();

        self.state.timestamp_ns = Some(timestamp_ns);
        self.state.orientation = *orientation;
        self.state.ticks += 1;

        trace!(
            "tick {}: acceleration {:?} velocity {:?} position {:?}",
            self.state.ticks,
            self.state.acceleration.as_slice(),
            self.state.velocity[0].as_slice(),
            self.state.position.as_slice()
        );
    }

    /// Applies the axis convention and the prefilter.
    fn prefiltered(&mut self, raw: &Vector3<f64>, timestamp_ns: u64) -> Vector3<f64> {
        let sample = self.config.axis_convention.apply(raw);
        match &mut self.prefilter {
            Some(filter) => {
                filter.add_sample(sample, timestamp_ns);
                filter.filtered_data()
            }
            None => sample,
        }
    }

    fn remove_bias(
        &mut self,
        sample: &Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
    ) -> Vector3<f64> {
        match self.config.bias {
            BiasRemoval::None => *sample,
            BiasRemoval::RollingMean {
                stability_threshold,
            } => {
                for axis in 0..3 {
                    let window = self.state.samples.iter().map(|s| s[axis]);
                    if is_stationary(sample[axis], window, stability_threshold) {
                        self.state.mean_acceleration[axis] = sample[axis];
                    }
                }
                sample - self.state.mean_acceleration
            }
            BiasRemoval::GravityRotation { gravity } => {
                sample - gravity_in_device(orientation, &gravity)
            }
        }
    }

    fn update_velocity(
        &mut self,
        acceleration: &Vector3<f64>,
        gated: &Vector3<f64>,
        timestamp_ns: u64,
        dt: f64,
    ) -> Vector3<f64> {
        let [previous, older] = self.state.velocity;
        let mut velocity = previous + acceleration * dt * self.config.velocity_scale;

        if let Some(filter) = &mut self.velocity_filter {
            filter.add_sample(velocity, timestamp_ns);
            let blend = self.config.velocity_blend;
            velocity = blend * filter.filtered_data() + (1.0 - blend) * previous;
        }

        let threshold = self.config.velocity_stability_threshold;
        for axis in 0..3 {
            // an exact zero is the noise gate's output, not a measurement.
            #[allow(clippy::float_cmp)]
            let at_rest = gated[axis] == 0.0;
            if at_rest
                && is_stable(velocity[axis], previous[axis], threshold)
                && is_stable(previous[axis], older[axis], threshold)
            {
                velocity[axis] *= self.config.velocity_decay;
            }
        }

        if let Some(limit) = self.config.velocity_limit {
            let limit = limit.abs();
            velocity = velocity.map(|v| v.clamp(-limit, limit));
        }
        velocity
    }

    /// Keeps every position axis inside the bounding volume, restarting
    /// integration on the axes that had to be moved.
    fn bound_position(&mut self) {
        let bounds = self.config.bounds;
        for axis in 0..3 {
            let value = self.state.position[axis];
            if bounds.contains(axis, value) {
                continue;
            }

            let (min, max) = (bounds.min[axis], bounds.max[axis]);
            let replacement = match self.config.clamp_policy {
                ClampPolicy::Zero => 0.0,
                ClampPolicy::Bound if value.is_nan() => 0.0_f64.clamp(min, max),
                ClampPolicy::Bound => value.clamp(min, max),
            };
            debug!("position axis {axis} at {value} left [{min}, {max}], reset to {replacement}");

            self.state.position[axis] = replacement;
            self.state.clear_axis(axis);
            if let Some(filter) = &mut self.velocity_filter {
                filter.clear_axis(axis);
            }
        }
    }
}

fn is_finite<'a>(mut values: impl Iterator<Item = &'a f64>) -> bool {
    values.all(|v| v.is_finite())
}

/// Returns `true` if `current` and every value of `window` lie within
/// `threshold` of each other.
fn is_stationary(current: f64, window: impl Iterator<Item = f64>, threshold: f64) -> bool {
    let (min, max) = window.fold((current, current), |(min, max), v| (min.min(v), max.max(v)));
    max - min <= threshold
}

/// Returns `true` if the mean magnitude of `new` and `old` stays within
/// `1 ± threshold` of `|old|`.
fn is_stable(new: f64, old: f64, threshold: f64) -> bool {
    if old.abs() < STABILITY_FLOOR {
        return true;
    }

    let ratio = (new.abs() + old.abs()) / (2.0 * old.abs());
    (1.0 - threshold..=1.0 + threshold).contains(&ratio)
}
