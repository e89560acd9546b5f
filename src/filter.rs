//! A fixed-coefficient recursive (IIR) filter over 3-vector samples.
//!
//! [`RecursiveFilter`] is generic over the number of taps `K` per side of the
//! difference equation; [`Biquad`] (`K = 2`) and [`QuarticFilter`] (`K = 4`)
//! are the two orders used in this crate. Every axis of the sample is
//! filtered independently with the same coefficients.
//!
//! Samples carry a timestamp in nanoseconds. A sample older than the last
//! one only moves the timestamp back, and an optional [`StepGate`] drops
//! samples that arrive too close together or after too long a pause. Either
//! way the filtered output is left untouched. Samples with a NaN or infinite
//! component are dropped outright.

use std::time::Duration;

use log::trace;
use nalgebra::Vector3;

use crate::coefficients::{FilterCoefficients, FilterDesign};
use crate::error::ConfigError;

/// Range of time steps between consecutive samples a gated filter accepts.
///
/// A step `dt` is accepted when `min_step <= dt <= max_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepGate {
    /// Steps below this are dropped.
    pub min_step: Duration,
    /// Steps above this are dropped.
    pub max_step: Duration,
}

impl StepGate {
    /// Accepts sensor rates between 1 Hz and 1 kHz.
    pub const SENSOR_RATE: Self = Self {
        min_step: Duration::from_millis(1),
        max_step: Duration::from_secs(1),
    };

    /// Checks that the gate accepts at least some steps.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStepGate`] if `min_step >= max_step`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_step >= self.max_step {
            return Err(ConfigError::InvalidStepGate {
                min: self.min_step,
                max: self.max_step,
            });
        }
        Ok(())
    }

    /// Returns `true` if a step of `elapsed_ns` nanoseconds passes the gate.
    #[must_use]
    pub fn admits(&self, elapsed_ns: u64) -> bool {
        let elapsed = Duration::from_nanos(elapsed_ns);
        elapsed >= self.min_step && elapsed <= self.max_step
    }
}

impl Default for StepGate {
    fn default() -> Self {
        Self::SENSOR_RATE
    }
}

/// How the sample history is seeded by the first sample after a reset.
///
/// The first output always equals the first sample; priming only decides
/// what the difference equation sees as the past on the second sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priming {
    /// Input and output histories start at zero.
    Zero,
    /// Input and output histories are filled with the first sample.
    #[default]
    Sample,
    /// Input history is filled with the first sample and output history with
    /// the filter's steady-state response to it, so a constant input causes
    /// no transient.
    SteadyState,
}

/// A recursive filter with `K` delayed inputs and `K` delayed outputs.
///
/// # Example
///
/// ```rust
/// use inertial_position::coefficients::butterworth_lowpass;
/// use inertial_position::filter::{Biquad, StepGate};
/// use nalgebra::Vector3;
///
/// let coefficients = butterworth_lowpass(6.0, 66.0).unwrap();
/// let mut filter = Biquad::new(coefficients).with_gate(StepGate::SENSOR_RATE);
///
/// // the first sample passes through unchanged.
/// filter.add_sample(Vector3::new(0.0, 0.0, 9.8), 1_000_000);
/// assert_eq!(filter.filtered_data(), Vector3::new(0.0, 0.0, 9.8));
///
/// // half a millisecond later is too soon for a gated filter.
/// filter.add_sample(Vector3::zeros(), 1_500_000);
/// assert_eq!(filter.filtered_data(), Vector3::new(0.0, 0.0, 9.8));
/// assert_eq!(filter.most_recent_timestamp_ns(), 1_500_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecursiveFilter<const K: usize> {
    coefficients: FilterCoefficients<K>,
    gate: Option<StepGate>,
    priming: Priming,
    initialized: bool,
    timestamp_most_recent_update_ns: u64,
    /// `x[n-1] ..= x[n-K]`.
    inputs: [Vector3<f64>; K],
    /// `y[n-1] ..= y[n-K]`.
    outputs: [Vector3<f64>; K],
    filtered_data: Vector3<f64>,
}

/// Second-order recursive filter.
pub type Biquad = RecursiveFilter<2>;

/// Fourth-order recursive filter.
pub type QuarticFilter = RecursiveFilter<4>;

impl<const K: usize> RecursiveFilter<K> {
    /// Creates an ungated filter with [`Priming::Sample`].
    #[must_use]
    pub fn new(coefficients: FilterCoefficients<K>) -> Self {
        Self {
            coefficients,
            gate: None,
            priming: Priming::default(),
            initialized: false,
            timestamp_most_recent_update_ns: 0,
            inputs: [Vector3::zeros(); K],
            outputs: [Vector3::zeros(); K],
            filtered_data: Vector3::zeros(),
        }
    }

    /// Drops samples whose step from the previous one falls outside `gate`.
    #[must_use]
    pub fn with_gate(mut self, gate: StepGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sets how the first sample seeds the history.
    #[must_use]
    pub fn with_priming(mut self, priming: Priming) -> Self {
        self.priming = priming;
        self
    }

    /// Clears the history, timestamp and initialized flag. Coefficients,
    /// gate and priming are kept.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.timestamp_most_recent_update_ns = 0;
        self.inputs = [Vector3::zeros(); K];
        self.outputs = [Vector3::zeros(); K];
        self.filtered_data = Vector3::zeros();
    }

    /// Updates the filter with `sample`, see [`Self::add_weighted_sample`].
    pub fn add_sample(&mut self, sample: Vector3<f64>, timestamp_ns: u64) {
        self.add_weighted_sample(sample, timestamp_ns, 1.0);
    }

    /// Updates the filter with a weighted sample.
    ///
    /// The weight is clamped to `[0, 1]` and moves the output from its
    /// previous value towards the value of the difference equation: `1`
    /// applies the equation as is, `0` leaves the output unchanged. The first
    /// sample after a reset ignores the weight and becomes the output.
    ///
    /// A sample with a non-finite component changes nothing, not even the
    /// timestamp.
    pub fn add_weighted_sample(&mut self, sample: Vector3<f64>, timestamp_ns: u64, weight: f64) {
        if !sample.iter().all(|v| v.is_finite()) {
            trace!("non-finite sample at {timestamp_ns} ns dropped");
            return;
        }

        if !self.initialized {
            self.prime(sample);
            self.timestamp_most_recent_update_ns = timestamp_ns;
            self.initialized = true;
            return;
        }

        if timestamp_ns < self.timestamp_most_recent_update_ns {
            trace!(
                "non-monotonic sample at {timestamp_ns} ns (last {} ns) ignored",
                self.timestamp_most_recent_update_ns
            );
            self.timestamp_most_recent_update_ns = timestamp_ns;
            return;
        }

        let elapsed_ns = timestamp_ns - self.timestamp_most_recent_update_ns;
        self.timestamp_most_recent_update_ns = timestamp_ns;

        if let Some(gate) = self.gate {
            if !gate.admits(elapsed_ns) {
                trace!("sample after {elapsed_ns} ns is outside the step gate");
                return;
            }
        }

        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        if weight <= 0.0 {
            return;
        }

        let mut y = self.difference_equation(sample);
        if weight < 1.0 {
            y = self.filtered_data + weight * (y - self.filtered_data);
        }

        if K > 0 {
            self.inputs.rotate_right(1);
            self.inputs[0] = sample;
            self.outputs.rotate_right(1);
            self.outputs[0] = y;
        }
        self.filtered_data = y;
    }

    /// The most recent output, or zero if no sample has been added.
    #[must_use]
    pub fn filtered_data(&self) -> Vector3<f64> {
        self.filtered_data
    }

    /// Returns `true` once the first sample has been added.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Timestamp of the most recent sample, accepted or not.
    #[must_use]
    pub fn most_recent_timestamp_ns(&self) -> u64 {
        self.timestamp_most_recent_update_ns
    }

    /// Moves the reference timestamp of an initialized filter without
    /// filtering, so the next sample is measured from `timestamp_ns`.
    pub fn rebase(&mut self, timestamp_ns: u64) {
        if self.initialized {
            self.timestamp_most_recent_update_ns = timestamp_ns;
        }
    }

    /// The coefficients this filter was built with.
    #[must_use]
    pub fn coefficients(&self) -> &FilterCoefficients<K> {
        &self.coefficients
    }

    /// The step gate, if the filter has one.
    #[must_use]
    pub fn gate(&self) -> Option<StepGate> {
        self.gate
    }

    /// Zeroes one axis of the history and output, leaving the other axes
    /// untouched. Out-of-range axes are ignored.
    pub fn clear_axis(&mut self, axis: usize) {
        if axis >= 3 {
            return;
        }

        for value in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            value[axis] = 0.0;
        }
        self.filtered_data[axis] = 0.0;
    }

    fn prime(&mut self, sample: Vector3<f64>) {
        self.filtered_data = sample;
        match self.priming {
            Priming::Zero => {
                self.inputs = [Vector3::zeros(); K];
                self.outputs = [Vector3::zeros(); K];
            }
            Priming::Sample => {
                self.inputs = [sample; K];
                self.outputs = [sample; K];
            }
            Priming::SteadyState => {
                let gain = self.coefficients.dc_gain().unwrap_or(1.0);
                self.inputs = [sample; K];
                self.outputs = [sample * gain; K];
            }
        }
    }

    fn difference_equation(&self, x: Vector3<f64>) -> Vector3<f64> {
        let b = self.coefficients.b();
        let a = self.coefficients.a();

        let mut y = self.coefficients.b0() * x;
        let history = self.inputs.iter().zip(&self.outputs);
        for ((&b, &a), (&x_delayed, &y_delayed)) in b.iter().zip(a).zip(history) {
            y += b * x_delayed - a * y_delayed;
        }
        y
    }
}

/// A recursive filter whose order is chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnyFilter {
    /// Second-order filter.
    Biquad(Biquad),
    /// Fourth-order filter.
    Quartic(QuarticFilter),
}

impl AnyFilter {
    /// See [`RecursiveFilter::reset`].
    pub fn reset(&mut self) {
        match self {
            Self::Biquad(filter) => filter.reset(),
            Self::Quartic(filter) => filter.reset(),
        }
    }

    /// See [`RecursiveFilter::add_sample`].
    pub fn add_sample(&mut self, sample: Vector3<f64>, timestamp_ns: u64) {
        match self {
            Self::Biquad(filter) => filter.add_sample(sample, timestamp_ns),
            Self::Quartic(filter) => filter.add_sample(sample, timestamp_ns),
        }
    }

    /// See [`RecursiveFilter::add_weighted_sample`].
    pub fn add_weighted_sample(&mut self, sample: Vector3<f64>, timestamp_ns: u64, weight: f64) {
        match self {
            Self::Biquad(filter) => filter.add_weighted_sample(sample, timestamp_ns, weight),
            Self::Quartic(filter) => filter.add_weighted_sample(sample, timestamp_ns, weight),
        }
    }

    /// See [`RecursiveFilter::filtered_data`].
    #[must_use]
    pub fn filtered_data(&self) -> Vector3<f64> {
        match self {
            Self::Biquad(filter) => filter.filtered_data(),
            Self::Quartic(filter) => filter.filtered_data(),
        }
    }

    /// See [`RecursiveFilter::is_initialized`].
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        match self {
            Self::Biquad(filter) => filter.is_initialized(),
            Self::Quartic(filter) => filter.is_initialized(),
        }
    }

    /// See [`RecursiveFilter::most_recent_timestamp_ns`].
    #[must_use]
    pub fn most_recent_timestamp_ns(&self) -> u64 {
        match self {
            Self::Biquad(filter) => filter.most_recent_timestamp_ns(),
            Self::Quartic(filter) => filter.most_recent_timestamp_ns(),
        }
    }

    /// See [`RecursiveFilter::rebase`].
    pub fn rebase(&mut self, timestamp_ns: u64) {
        match self {
            Self::Biquad(filter) => filter.rebase(timestamp_ns),
            Self::Quartic(filter) => filter.rebase(timestamp_ns),
        }
    }

    /// See [`RecursiveFilter::clear_axis`].
    pub fn clear_axis(&mut self, axis: usize) {
        match self {
            Self::Biquad(filter) => filter.clear_axis(axis),
            Self::Quartic(filter) => filter.clear_axis(axis),
        }
    }

    /// Filter order, 2 or 4.
    #[must_use]
    pub fn order(&self) -> usize {
        match self {
            Self::Biquad(_) => 2,
            Self::Quartic(_) => 4,
        }
    }
}

/// Everything needed to build one filter instance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSettings {
    /// Where the coefficients come from.
    pub design: FilterDesign,
    /// Step gate, `None` to filter every sample regardless of spacing.
    pub gate: Option<StepGate>,
    /// History seeding on the first sample.
    pub priming: Priming,
}

impl FilterSettings {
    /// A filter that processes every sample.
    #[must_use]
    pub fn ungated(design: impl Into<FilterDesign>) -> Self {
        Self {
            design: design.into(),
            gate: None,
            priming: Priming::default(),
        }
    }

    /// A filter gated to [`StepGate::SENSOR_RATE`].
    #[must_use]
    pub fn gated(design: impl Into<FilterDesign>) -> Self {
        Self {
            gate: Some(StepGate::SENSOR_RATE),
            ..Self::ungated(design)
        }
    }

    /// Replaces the priming policy.
    #[must_use]
    pub fn with_priming(mut self, priming: Priming) -> Self {
        self.priming = priming;
        self
    }

    /// Builds the filter.
    ///
    /// # Errors
    ///
    /// Fails if the design cannot produce coefficients or the gate is empty.
    pub fn build(&self) -> Result<AnyFilter, ConfigError> {
        if let Some(gate) = self.gate {
            gate.validate()?;
        }

        let filter = match self.design {
            FilterDesign::Biquad(design) => {
                let mut filter = Biquad::new(design.coefficients()?).with_priming(self.priming);
                filter.gate = self.gate;
                AnyFilter::Biquad(filter)
            }
            FilterDesign::Quartic(design) => {
                let mut filter =
                    QuarticFilter::new(design.coefficients()?).with_priming(self.priming);
                filter.gate = self.gate;
                AnyFilter::Quartic(filter)
            }
        };
        Ok(filter)
    }
}
