//! Long-running scenarios over seeded synthetic sensor streams.

use inertial_position::config::{BiasRemoval, ClampPolicy, PositionEstimatorConfig, Profile};
use inertial_position::frame::{AxisConvention, GRAVITY_MAGNITUDE};
use inertial_position::PositionEstimator;
use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MS: u64 = 1_000_000;

fn noise(rng: &mut StdRng, amplitude: f64) -> Vector3<f64> {
    Vector3::from_fn(|_, _| rng.gen_range(-amplitude..=amplitude))
}

/// Raw reading of a device at rest in the landscape convention.
fn at_rest() -> Vector3<f64> {
    Vector3::new(0.0, GRAVITY_MAGNITUDE, 0.0)
}

#[test]
fn five_seconds_of_sensor_noise_at_rest_stays_at_the_origin() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let q = UnitQuaternion::identity();

    for config in [
        PositionEstimatorConfig::rolling_mean(),
        PositionEstimatorConfig::gravity_rotation(),
    ] {
        let profile = config.profile;
        let mut estimator = PositionEstimator::new(config).unwrap();
        for tick in 1..=5_000 {
            let sample = at_rest() + noise(&mut rng, 0.02);
            estimator.get_position(&sample, &q, tick * MS);
        }

        assert_eq!(estimator.ticks(), 4_999, "{profile:?}");
        assert!(estimator.position().norm() < 1e-9, "{profile:?}");
        assert!(estimator.velocity().norm() < 1e-9, "{profile:?}");
    }
}

#[test]
fn random_shaking_never_leaves_the_bounding_volume() {
    let mut rng = StdRng::seed_from_u64(7);
    let q = UnitQuaternion::from_euler_angles(0.2, 0.4, -0.1);

    for clamp_policy in [ClampPolicy::Zero, ClampPolicy::Bound] {
        let config = PositionEstimatorConfig {
            profile: Profile::Custom,
            bias: BiasRemoval::None,
            axis_convention: AxisConvention::IDENTITY,
            clamp_policy,
            ..PositionEstimatorConfig::rolling_mean()
        };
        let bounds = config.bounds;
        let mut estimator = PositionEstimator::new(config).unwrap();

        let mut push = Vector3::zeros();
        for tick in 1..=5_000 {
            // hold each push for a while so velocity can build up.
            if tick % 250 == 1 {
                push = noise(&mut rng, 20.0);
            }
            let position = estimator.get_position(&push, &q, tick * MS);
            for axis in 0..3 {
                assert!(
                    bounds.contains(axis, position[axis]),
                    "{clamp_policy:?}: axis {axis} at {} on tick {tick}",
                    position[axis]
                );
            }
        }
    }
}

#[test]
fn constant_push_is_pinned_to_the_bound() {
    let mut rng = StdRng::seed_from_u64(11);
    let q = UnitQuaternion::identity();
    let config = PositionEstimatorConfig::gravity_rotation();
    let limit = config.bounds.max.z;
    let mut estimator = PositionEstimator::new(config).unwrap();

    // raw x becomes z in the landscape convention.
    let push = Vector3::new(2.0, 0.0, 0.0);
    for tick in 1..=2_000 {
        let sample = at_rest() + push + noise(&mut rng, 0.02);
        estimator.get_position(&sample, &q, tick * MS);
    }

    assert_eq!(estimator.position().z, limit);
    assert!(estimator.position().xy().norm() < 1e-9);
}

#[test]
fn velocity_decays_monotonically_once_the_device_stops() {
    let mut rng = StdRng::seed_from_u64(42);
    let q = UnitQuaternion::identity();
    let mut estimator = PositionEstimator::new(PositionEstimatorConfig::gravity_rotation()).unwrap();

    let mut tick = 1;
    let push = Vector3::new(1.0, 0.0, 0.0);
    for _ in 0..20 {
        estimator.get_position(&(at_rest() + push + noise(&mut rng, 0.02)), &q, tick * MS);
        tick += 1;
    }
    let mut previous = estimator.velocity().z;
    assert!(previous > 0.1);

    for _ in 0..200 {
        estimator.get_position(&(at_rest() + noise(&mut rng, 0.02)), &q, tick * MS);
        tick += 1;

        let velocity = estimator.velocity().z;
        assert!(velocity > 0.0);
        assert!(velocity < previous, "{velocity} >= {previous}");
        previous = velocity;
    }
    assert!(previous < 1e-3);
}
