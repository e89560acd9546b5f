//! Sensor-to-world frame handling.
//!
//! The raw accelerometer axes of a device do not line up with the frame the
//! orientation quaternion is expressed in. An [`AxisConvention`] reorders
//! and flips the raw axes first, after which the orientation rotates the
//! vector into the world frame.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::error::ConfigError;

/// Magnitude of gravity assumed when it is subtracted by rotation, in m/s^2.
pub const GRAVITY_MAGNITUDE: f64 = 9.875;

/// A signed permutation of the three sensor axes.
///
/// Output axis `i` is `sign[i] * input[source[i]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisConvention {
    /// Input axis feeding each output axis.
    pub source: [usize; 3],
    /// Sign applied to each output axis, `1.0` or `-1.0`.
    pub sign: [f64; 3],
}

impl AxisConvention {
    /// Raw axes already match the integration frame.
    pub const IDENTITY: Self = Self {
        source: [0, 1, 2],
        sign: [1.0, 1.0, 1.0],
    };

    /// Phone held in landscape inside a viewer: `(x, y, z) -> (-z, y, x)`.
    pub const LANDSCAPE: Self = Self {
        source: [2, 1, 0],
        sign: [-1.0, 1.0, 1.0],
    };

    /// Checks that this is a signed permutation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAxisConvention`] if an axis is used twice,
    /// an index is out of range, or a sign is not `±1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = [false; 3];
        for &axis in &self.source {
            match seen.get_mut(axis) {
                Some(used) if !*used => *used = true,
                _ => return Err(ConfigError::InvalidAxisConvention),
            }
        }

        #[allow(clippy::float_cmp)]
        let unit_signs = self.sign.iter().all(|s| s.abs() == 1.0);
        if !unit_signs {
            return Err(ConfigError::InvalidAxisConvention);
        }
        Ok(())
    }

    /// Maps a raw sensor vector into the integration axis convention.
    #[must_use]
    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.sign[i] * raw.get(self.source[i]).copied().unwrap_or(0.0))
    }
}

impl Default for AxisConvention {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Builds an orientation from `[x, y, z, w]` components.
///
/// The components are normalized. A zero or non-finite quaternion, as sent
/// by a fusion source that has not converged yet, maps to the identity.
#[must_use]
pub fn orientation_from_xyzw(xyzw: [f64; 4]) -> UnitQuaternion<f64> {
    let [x, y, z, w] = xyzw;
    if xyzw.iter().any(|c| !c.is_finite()) {
        return UnitQuaternion::identity();
    }

    UnitQuaternion::try_new(Quaternion::new(w, x, y, z), f64::EPSILON)
        .unwrap_or_else(UnitQuaternion::identity)
}

/// Rotates a device-frame vector into the world frame, `q * v * q^-1`.
#[must_use]
pub fn rotate_into_world(orientation: &UnitQuaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    orientation.transform_vector(v)
}

/// Expresses a world-frame gravity vector in the device frame.
#[must_use]
pub fn gravity_in_device(
    orientation: &UnitQuaternion<f64>,
    gravity_world: &Vector3<f64>,
) -> Vector3<f64> {
    orientation.inverse_transform_vector(gravity_world)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn landscape_convention_reorders_axes() {
        let raw = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(AxisConvention::LANDSCAPE.apply(&raw), Vector3::new(-3.0, 2.0, 1.0));
        assert_eq!(AxisConvention::IDENTITY.apply(&raw), raw);
    }

    #[test]
    fn invalid_conventions_are_rejected() {
        let repeated = AxisConvention {
            source: [0, 0, 2],
            sign: [1.0, 1.0, 1.0],
        };
        let out_of_range = AxisConvention {
            source: [0, 1, 3],
            sign: [1.0, 1.0, 1.0],
        };
        let scaled = AxisConvention {
            source: [0, 1, 2],
            sign: [1.0, 2.0, 1.0],
        };
        for convention in [repeated, out_of_range, scaled] {
            assert_eq!(convention.validate(), Err(ConfigError::InvalidAxisConvention));
        }
        assert!(AxisConvention::LANDSCAPE.validate().is_ok());
    }

    #[test]
    fn degenerate_quaternions_become_identity() {
        assert_eq!(orientation_from_xyzw([0.0; 4]), UnitQuaternion::identity());
        assert_eq!(
            orientation_from_xyzw([f64::NAN, 0.0, 0.0, 1.0]),
            UnitQuaternion::identity()
        );

        let q = orientation_from_xyzw([0.0, 0.0, 2.0, 0.0]);
        assert!((q.quaternion().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_and_gravity_are_inverse() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        let gravity = Vector3::new(0.0, 0.0, GRAVITY_MAGNITUDE);

        let device = gravity_in_device(&q, &gravity);
        assert!((device - Vector3::new(0.0, GRAVITY_MAGNITUDE, 0.0)).norm() < 1e-9);
        assert!((rotate_into_world(&q, &device) - gravity).norm() < 1e-9);
    }
}
