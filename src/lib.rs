//! Inertial position estimation from accelerometer samples.
//!
//! The crate is built from three layers:
//!
//! - [`filter`]: a recursive IIR filter over 3-vectors, with timestamp
//!   defence, optional step gating and weighted samples. The coefficient
//!   tables and Butterworth designs it runs live in [`coefficients`].
//! - [`unbias`]: the [`AccelerometerUnbiasEstimator`], which removes gravity
//!   from raw accelerometer samples.
//! - [`position`]: the [`PositionEstimator`], which double-integrates motion
//!   acceleration into a bounded, drift-suppressed position.
//!
//! [`TranslationPipeline`] chains the last two for the common case.
//!
//! # Example
//!
//! ```rust
//! use inertial_position::{PositionEstimator, PositionEstimatorConfig};
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! let mut estimator = PositionEstimator::new(PositionEstimatorConfig::rolling_mean()).unwrap();
//! let resting = Vector3::new(0.0, 9.81, 0.0);
//!
//! for tick in 1..=500 {
//!     estimator.get_position(&resting, &UnitQuaternion::identity(), tick * 2_000_000);
//! }
//!
//! assert_eq!(estimator.position(), Vector3::zeros());
//! ```

pub mod coefficients;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod pipeline;
pub mod position;
pub mod unbias;

pub use coefficients::{BiquadDesign, FilterCoefficients, FilterDesign, QuarticDesign};
pub use config::{BiasRemoval, BoundingVolume, ClampPolicy, PositionEstimatorConfig, Profile};
pub use error::ConfigError;
pub use filter::{
    AnyFilter, Biquad, FilterSettings, Priming, QuarticFilter, RecursiveFilter, StepGate,
};
pub use pipeline::{Sample, TranslationPipeline};
pub use position::PositionEstimator;
pub use unbias::{AccelerometerUnbiasEstimator, UnbiasConfig, UnbiasMode};
