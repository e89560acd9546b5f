//! Coefficient sets for the recursive filters.
//!
//! Two kinds of presets are provided: second-order Butterworth sections
//! designed through the bilinear transform from a cutoff frequency and an
//! assumed sampling rate, and fixed tables whose values are reproduced
//! bit-for-bit on every platform.

use std::f64::consts::{PI, SQRT_2};

use crate::error::{ensure_finite, ConfigError};

/// Sampling rate assumed by the bilinear-transform designs when the caller
/// does not provide one, in Hz.
pub const DEFAULT_SAMPLING_HZ: f64 = 66.0;

/// Coefficients of a recursive filter of `K` taps per side, normalized so
/// that `a0 = 1`.
///
/// The filter computes
/// $$y_n = b_0 x_n + \sum_{i=1}^{K} b_i x_{n-i} - \sum_{i=1}^{K} a_i y_{n-i}$$
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCoefficients<const K: usize> {
    b0: f64,
    b: [f64; K],
    a: [f64; K],
}

impl<const K: usize> FilterCoefficients<K> {
    /// Creates a coefficient set from `b0`, the delayed numerator
    /// coefficients `b1..=bK` and the denominator coefficients `a1..=aK`.
    #[must_use]
    pub const fn new(b0: f64, b: [f64; K], a: [f64; K]) -> Self {
        Self { b0, b, a }
    }

    /// The coefficient applied to the current input.
    #[must_use]
    pub fn b0(&self) -> f64 {
        self.b0
    }

    /// Numerator coefficients for `x[n-1] ..= x[n-K]`.
    #[must_use]
    pub fn b(&self) -> &[f64; K] {
        &self.b
    }

    /// Denominator coefficients for `y[n-1] ..= y[n-K]`.
    #[must_use]
    pub fn a(&self) -> &[f64; K] {
        &self.a
    }

    /// Gain of the filter for a constant input, or `None` if the filter has
    /// a pole at DC.
    #[must_use]
    pub fn dc_gain(&self) -> Option<f64> {
        let numerator = self.b0 + self.b.iter().sum::<f64>();
        let denominator = 1.0 + self.a.iter().sum::<f64>();

        (denominator.abs() > f64::EPSILON).then(|| numerator / denominator)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        ensure_finite(self.b0, "filter coefficient b0")?;
        for &value in self.b.iter().chain(self.a.iter()) {
            ensure_finite(value, "filter coefficient")?;
        }
        Ok(self)
    }
}

impl FilterCoefficients<2> {
    /// Builds a biquad from transfer-function style arrays, `b = [b0, b1, b2]`
    /// and `a = [a1, a2]` (with `a0 = 1` implied).
    #[must_use]
    pub const fn biquad(b: [f64; 3], a: [f64; 2]) -> Self {
        Self::new(b[0], [b[1], b[2]], a)
    }
}

impl FilterCoefficients<4> {
    /// Builds a fourth-order section from `b = [b0, .., b4]` and
    /// `a = [a1, .., a4]` (with `a0 = 1` implied).
    #[must_use]
    pub const fn quartic(b: [f64; 5], a: [f64; 4]) -> Self {
        Self::new(b[0], [b[1], b[2], b[3], b[4]], a)
    }
}

/// Elliptic-style bandpass applied to raw accelerometer samples before
/// integration. Zero DC gain, so a constant bias is rejected.
pub const ACCELEROMETER_BANDPASS: FilterCoefficients<2> = FilterCoefficients::biquad(
    [0.198901419871832, 0.0, -0.198901419871832],
    [-1.519457875345425, 0.6021971602563359],
);

/// Second-order lowpass used to smooth integrated velocity.
pub const VELOCITY_SMOOTHING: FilterCoefficients<2> = FilterCoefficients::biquad(
    [
        0.04270192883236114,
        0.08530595930880489,
        0.04270192883236113,
    ],
    [-1.411292433720418, 0.6028319986952257],
);

/// Butterworth highpass at 0.5 Hz for 66 Hz sampling, removing slow velocity
/// drift.
pub const VELOCITY_HIGHPASS: FilterCoefficients<2> = FilterCoefficients::biquad(
    [0.9669017802491063, -1.9338035604982127, 0.9669017802491063],
    [-1.9327077681573208, 0.9348993528391046],
);

/// Butterworth highpass at 0.1 Hz for 66 Hz sampling, recentring position
/// towards the origin over several seconds.
pub const POSITION_HIGHPASS: FilterCoefficients<2> = FilterCoefficients::biquad(
    [0.9932909656697901, -1.9865819313395803, 0.9932909656697901],
    [-1.9865369196914242, 0.9866269429877363],
);

/// Fourth-order Butterworth lowpass at 5 Hz for 66 Hz sampling, used on the
/// velocity path of the integrator.
pub const VELOCITY_SMOOTHING_QUARTIC: FilterCoefficients<4> = FilterCoefficients::quartic(
    [
        0.0018466849655316084,
        0.007386739862126433,
        0.01108010979318965,
        0.007386739862126433,
        0.0018466849655316084,
    ],
    [
        -2.761391450937098,
        2.995712723253809,
        -1.48902535017156,
        0.2842510373033545,
    ],
);

/// Pre-warped analog cutoff `tan(pi * fc / fs)` of the bilinear transform.
fn prewarp(cutoff_hz: f64, sampling_hz: f64) -> Result<f64, ConfigError> {
    ensure_finite(cutoff_hz, "cutoff frequency")?;
    ensure_finite(sampling_hz, "sampling frequency")?;
    if cutoff_hz <= 0.0 || sampling_hz <= 0.0 || cutoff_hz >= sampling_hz / 2.0 {
        return Err(ConfigError::InvalidCutoff {
            cutoff_hz,
            sampling_hz,
        });
    }

    Ok((PI * cutoff_hz / sampling_hz).tan())
}

/// Second-order Butterworth lowpass coefficients for the given cutoff and
/// sampling frequencies.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCutoff`] unless `0 < cutoff_hz < sampling_hz / 2`.
///
/// # Example
///
/// ```
/// use inertial_position::coefficients::butterworth_lowpass;
///
/// let coefficients = butterworth_lowpass(6.0, 66.0).unwrap();
/// let gain = coefficients.dc_gain().unwrap();
/// assert!((gain - 1.0).abs() < 1e-12);
/// ```
pub fn butterworth_lowpass(
    cutoff_hz: f64,
    sampling_hz: f64,
) -> Result<FilterCoefficients<2>, ConfigError> {
    let c = prewarp(cutoff_hz, sampling_hz)?;
    let d = c.powi(2) + SQRT_2 * c + 1.0;

    let b0 = c.powi(2) / d;
    let b1 = 2.0 * b0;
    let b2 = b0;

    let a1 = (2.0 * (c.powi(2) - 1.0)) / d;
    let a2 = (1.0 - SQRT_2 * c + c.powi(2)) / d;

    Ok(FilterCoefficients::biquad([b0, b1, b2], [a1, a2]))
}

/// Second-order Butterworth highpass coefficients for the given cutoff and
/// sampling frequencies.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCutoff`] unless `0 < cutoff_hz < sampling_hz / 2`.
pub fn butterworth_highpass(
    cutoff_hz: f64,
    sampling_hz: f64,
) -> Result<FilterCoefficients<2>, ConfigError> {
    let c = prewarp(cutoff_hz, sampling_hz)?;
    let d = c.powi(2) + SQRT_2 * c + 1.0;

    let b0 = 1.0 / d;
    let b1 = -2.0 * b0;
    let b2 = b0;

    let a1 = (2.0 * (c.powi(2) - 1.0)) / d;
    let a2 = (1.0 - SQRT_2 * c + c.powi(2)) / d;

    Ok(FilterCoefficients::biquad([b0, b1, b2], [a1, a2]))
}

/// How to obtain the coefficients of a second-order filter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BiquadDesign {
    /// See [`butterworth_lowpass`].
    ButterworthLowpass {
        /// Cutoff frequency in Hz.
        cutoff_hz: f64,
        /// Assumed sampling frequency in Hz.
        sampling_hz: f64,
    },
    /// See [`butterworth_highpass`].
    ButterworthHighpass {
        /// Cutoff frequency in Hz.
        cutoff_hz: f64,
        /// Assumed sampling frequency in Hz.
        sampling_hz: f64,
    },
    /// [`ACCELEROMETER_BANDPASS`].
    AccelerometerBandpass,
    /// [`VELOCITY_SMOOTHING`].
    VelocitySmoothing,
    /// [`VELOCITY_HIGHPASS`].
    VelocityHighpass,
    /// [`POSITION_HIGHPASS`].
    PositionHighpass,
    /// Explicit coefficients, `b = [b0, b1, b2]`, `a = [a1, a2]`.
    Custom {
        /// Numerator coefficients.
        b: [f64; 3],
        /// Denominator coefficients, `a0 = 1` implied.
        a: [f64; 2],
    },
}

impl BiquadDesign {
    /// Resolves the design into a coefficient set.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range cutoff or non-finite custom coefficients.
    pub fn coefficients(&self) -> Result<FilterCoefficients<2>, ConfigError> {
        match *self {
            Self::ButterworthLowpass {
                cutoff_hz,
                sampling_hz,
            } => butterworth_lowpass(cutoff_hz, sampling_hz),
            Self::ButterworthHighpass {
                cutoff_hz,
                sampling_hz,
            } => butterworth_highpass(cutoff_hz, sampling_hz),
            Self::AccelerometerBandpass => Ok(ACCELEROMETER_BANDPASS),
            Self::VelocitySmoothing => Ok(VELOCITY_SMOOTHING),
            Self::VelocityHighpass => Ok(VELOCITY_HIGHPASS),
            Self::PositionHighpass => Ok(POSITION_HIGHPASS),
            Self::Custom { b, a } => FilterCoefficients::biquad(b, a).validate(),
        }
    }
}

/// How to obtain the coefficients of a fourth-order filter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuarticDesign {
    /// [`VELOCITY_SMOOTHING_QUARTIC`].
    VelocitySmoothing,
    /// Explicit coefficients, `b = [b0, .., b4]`, `a = [a1, .., a4]`.
    Custom {
        /// Numerator coefficients.
        b: [f64; 5],
        /// Denominator coefficients, `a0 = 1` implied.
        a: [f64; 4],
    },
}

impl QuarticDesign {
    /// Resolves the design into a coefficient set.
    ///
    /// # Errors
    ///
    /// Fails on non-finite custom coefficients.
    pub fn coefficients(&self) -> Result<FilterCoefficients<4>, ConfigError> {
        match *self {
            Self::VelocitySmoothing => Ok(VELOCITY_SMOOTHING_QUARTIC),
            Self::Custom { b, a } => FilterCoefficients::quartic(b, a).validate(),
        }
    }
}

/// A filter design of either supported order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterDesign {
    /// Second-order section.
    Biquad(BiquadDesign),
    /// Fourth-order section.
    Quartic(QuarticDesign),
}

impl From<BiquadDesign> for FilterDesign {
    fn from(design: BiquadDesign) -> Self {
        Self::Biquad(design)
    }
}

impl From<QuarticDesign> for FilterDesign {
    fn from(design: QuarticDesign) -> Self {
        Self::Quartic(design)
    }
}
