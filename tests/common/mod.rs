//! Synthetic magnetometer data shared by the integration tests

#![allow(dead_code)]

use compass_calibration::RawSample;
use nalgebra::Vector3;
use rand::Rng;

const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Milliseconds between generated samples, well outside the spike window
pub const SAMPLE_INTERVAL_MS: i64 = 100;

/// Ground truth of a distorted magnetometer
#[derive(Debug, Clone, Copy)]
pub struct Distortion {
    pub offset: Vector3<f64>,
    pub gains: Vector3<f64>,
    pub field: f64,
}

impl Distortion {
    pub fn new(offset: Vector3<f64>, gains: Vector3<f64>, field: f64) -> Self {
        Self {
            offset,
            gains,
            field,
        }
    }

    /// Raw reading for a field pointing along the unit vector `direction`
    pub fn raw(&self, direction: Vector3<f64>) -> Vector3<f64> {
        self.offset + (direction * self.field).component_div(&self.gains)
    }

    /// Field strength an ellipsoid fit reports for this distortion
    pub fn fitted_field(&self) -> f64 {
        self.field / (self.gains.x * self.gains.y * self.gains.z).cbrt()
    }
}

/// Evenly spread unit vectors, rotated about Z by `phase`
pub fn fibonacci_sphere(count: usize, phase: f64) -> Vec<Vector3<f64>> {
    (0..count)
        .map(|i| {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / count as f64;
            let r = (1.0 - z * z).sqrt();
            let theta = GOLDEN_ANGLE * i as f64 + phase;
            Vector3::new(r * theta.cos(), r * theta.sin(), z)
        })
        .collect()
}

/// Samples of `distortion` over a Fibonacci sphere, starting at `t0_ms`
pub fn sphere_samples(
    distortion: &Distortion,
    count: usize,
    phase: f64,
    t0_ms: i64,
) -> Vec<RawSample> {
    fibonacci_sphere(count, phase)
        .into_iter()
        .enumerate()
        .map(|(i, direction)| {
            let p = distortion.raw(direction);
            RawSample::new(p.x, p.y, p.z, t0_ms + i as i64 * SAMPLE_INTERVAL_MS)
        })
        .collect()
}

/// Same as [`sphere_samples`] with uniform noise of `amplitude` µT per axis
pub fn noisy_sphere_samples(
    distortion: &Distortion,
    count: usize,
    phase: f64,
    t0_ms: i64,
    amplitude: f64,
    rng: &mut impl Rng,
) -> Vec<RawSample> {
    sphere_samples(distortion, count, phase, t0_ms)
        .into_iter()
        .map(|s| {
            RawSample::new(
                s.x + rng.random_range(-amplitude..amplitude),
                s.y + rng.random_range(-amplitude..amplitude),
                s.z + rng.random_range(-amplitude..amplitude),
                s.t_ms,
            )
        })
        .collect()
}
