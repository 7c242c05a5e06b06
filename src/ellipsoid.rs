//! Ellipsoid least-squares hard/soft iron calibration
//!
//! Admitted samples fill a fit pool and then a validation pool of equal
//! size. When both are full, an axis-aligned ellipsoid
//!
//! ```text
//! A11 (x - ox)² + A22 (y - oy)² + A33 (z - oz)² = 1
//! ```
//!
//! is fitted to the fit pool by ordinary least squares on the linearised
//! form `x² = P · [x, y, z, -y², -z², 1]`. The candidate is scored on the
//! validation pool only, and replaces the transform in force only if its
//! error is below the absolute bound and strictly below the error of the
//! transform in force on the same pool. Both pools are discarded after
//! every attempt, whatever its outcome.

use log::{debug, info};
use nalgebra::{Matrix6, Vector3, Vector6};

use crate::error::CalibrationError;
use crate::math::{cbrt, sqrt};
use crate::strategy::CalibrationStrategy;
use crate::types::{
    CalibrationTransform, EllipsoidSettings, MAX_POOL_SIZE, MIN_POOL_SIZE, RawSample,
};

/// Smallest eigenvalue of the equilibrated normal matrix for a usable fit
const MIN_CONDITION: f64 = 1e-10;

/// Result of the most recent calibration attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    /// The candidate replaced the transform in force
    Accepted { error: f64, previous_error: f64 },
    /// The samples did not determine an ellipsoid
    Degenerate,
    /// The candidate's validation error reached the absolute bound
    ExceedsBound { error: f64 },
    /// The candidate did not improve on the transform in force
    NotImproved { error: f64, previous_error: f64 },
}

/// Fit an axis-aligned ellipsoid to `points`
///
/// Returns `None` when the points do not determine an ellipsoid, such as
/// fewer than six points, repeated or collinear points, or a solution with
/// non-positive or non-finite axis terms.
///
/// The returned gains are normalised so their product is one, and
/// `field_strength` is the radius of the sphere the corrected points lie on.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_calibration::ellipsoid::fit;
///
/// let offset = Vector3::new(5.0, -3.0, 2.0);
/// let points: Vec<_> = [
///     (1.0, 0.0, 0.0), (-1.0, 0.0, 0.0), (0.0, 1.0, 0.0), (0.0, -1.0, 0.0),
///     (0.0, 0.0, 1.0), (0.0, 0.0, -1.0), (0.6, 0.8, 0.0), (0.0, 0.6, -0.8),
///     (-0.8, 0.0, 0.6),
/// ]
/// .iter()
/// .map(|&(x, y, z)| offset + Vector3::new(x, y, z) * 40.0)
/// .collect();
///
/// let transform = fit(&points).unwrap();
/// assert!((transform.offset - offset).magnitude() < 1e-6);
/// assert!((transform.field_strength.unwrap() - 40.0).abs() < 1e-6);
/// ```
pub fn fit(points: &[Vector3<f64>]) -> Option<CalibrationTransform> {
    if points.len() < MIN_POOL_SIZE {
        return None;
    }

    let mut normal = Matrix6::<f64>::zeros();
    let mut target = Vector6::<f64>::zeros();
    for p in points {
        let row = Vector6::new(p.x, p.y, p.z, -p.y * p.y, -p.z * p.z, 1.0);
        normal += row * row.transpose();
        target += row * (p.x * p.x);
    }

    // Equilibrate so the conditioning test does not depend on units
    let mut scale = Vector6::<f64>::zeros();
    for i in 0..6 {
        if normal[(i, i)] <= 0.0 {
            return None;
        }
        scale[i] = 1.0 / sqrt(normal[(i, i)]);
    }
    let equilibrated = Matrix6::from_fn(|i, j| normal[(i, j)] * scale[i] * scale[j]);

    let smallest = equilibrated.symmetric_eigenvalues().min();
    if smallest.is_nan() || smallest <= MIN_CONDITION {
        debug!("ellipsoid fit degenerate: smallest eigenvalue {:e}", smallest);
        return None;
    }

    let solution = equilibrated.cholesky()?.solve(&target.component_mul(&scale));
    let p = solution.component_mul(&scale);

    let offset = Vector3::new(0.5 * p[0], 0.5 * p[1] / p[3], 0.5 * p[2] / p[4]);
    let a11 = 1.0
        / (p[5] + offset.x * offset.x + p[3] * offset.y * offset.y + p[4] * offset.z * offset.z);
    let axes = Vector3::new(a11, p[3] * a11, p[4] * a11);

    if axes.iter().any(|a| !a.is_finite()) {
        debug!("ellipsoid fit rejected: NaN or infinite axis terms");
        return None;
    }
    if axes.iter().any(|a| *a <= 0.0) {
        debug!("ellipsoid fit rejected: surface is not an ellipsoid");
        return None;
    }

    let gains = axes.map(sqrt);
    let field_strength = 1.0 / cbrt(gains.x * gains.y * gains.z);
    let transform = CalibrationTransform::new(offset, gains * field_strength, Some(field_strength));

    transform.is_valid().then_some(transform)
}

/// Mean squared difference between corrected magnitudes and the field strength
///
/// A transform without a field-strength estimate is scored against zero,
/// so an uncalibrated transform scores the mean squared raw magnitude.
/// An empty pool scores infinity.
pub fn validate(transform: &CalibrationTransform, points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return f64::INFINITY;
    }
    let field = transform.field_strength.unwrap_or(0.0);
    let total: f64 = points
        .iter()
        .map(|p| {
            let diff = transform.apply(*p).magnitude() - field;
            diff * diff
        })
        .sum();
    total / points.len() as f64
}

/// Fixed-capacity point pool
#[derive(Debug, Clone)]
struct Pool {
    points: [Vector3<f64>; MAX_POOL_SIZE],
    len: usize,
}

impl Pool {
    fn new() -> Self {
        Self {
            points: [Vector3::zeros(); MAX_POOL_SIZE],
            len: 0,
        }
    }

    fn push(&mut self, point: Vector3<f64>) {
        self.points[self.len] = point;
        self.len += 1;
    }

    fn as_slice(&self) -> &[Vector3<f64>] {
        &self.points[..self.len]
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Ellipsoid calibration state for one magnetometer
///
/// The transform in force survives attempts and sessions (via the seed
/// passed to [`reset`](CalibrationStrategy::reset)) and is only replaced by
/// a strictly better fit, so its validation error never regresses.
///
/// # Example
/// ```
/// use compass_calibration::{CalibrationStrategy, Ellipsoid, EllipsoidSettings, RawSample};
///
/// let mut model = Ellipsoid::new(EllipsoidSettings::default());
/// model.collect(RawSample::new(40.0, 0.0, 0.0, 0));
/// assert_eq!(model.collected(), 1);
/// assert!(!model.ready_check());
/// ```
#[derive(Debug, Clone)]
pub struct Ellipsoid {
    settings: EllipsoidSettings,
    fit_pool: Pool,
    validation_pool: Pool,
    accepted: CalibrationTransform,
    calibrated: bool,
    last_outcome: Option<FitOutcome>,
}

impl Ellipsoid {
    pub fn new(settings: EllipsoidSettings) -> Self {
        Self {
            settings,
            fit_pool: Pool::new(),
            validation_pool: Pool::new(),
            accepted: CalibrationTransform::identity(),
            calibrated: false,
            last_outcome: None,
        }
    }

    pub fn settings(&self) -> &EllipsoidSettings {
        &self.settings
    }

    /// Samples held across both pools
    pub fn collected(&self) -> usize {
        self.fit_pool.len + self.validation_pool.len
    }

    /// Pool size in effect, clamped to the storage capacity
    fn pool_size(&self) -> usize {
        self.settings.pool_size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
    }

    pub fn pools_full(&self) -> bool {
        self.validation_pool.len >= self.pool_size()
    }

    pub fn fit_points(&self) -> &[Vector3<f64>] {
        self.fit_pool.as_slice()
    }

    pub fn validation_points(&self) -> &[Vector3<f64>] {
        self.validation_pool.as_slice()
    }

    pub fn last_outcome(&self) -> Option<FitOutcome> {
        self.last_outcome
    }

    fn attempt(&mut self) -> FitOutcome {
        let validation = self.validation_pool.as_slice();

        let Some(candidate) = fit(self.fit_pool.as_slice()) else {
            return FitOutcome::Degenerate;
        };

        let error = validate(&candidate, validation);
        if !error.is_finite() {
            return FitOutcome::Degenerate;
        }
        if error >= self.settings.max_square_error {
            return FitOutcome::ExceedsBound { error };
        }

        let previous_error = validate(&self.accepted, validation);
        if error < previous_error {
            info!(
                "ellipsoid calibration accepted: offset [{:.3}, {:.3}, {:.3}] \
                 scale [{:.4}, {:.4}, {:.4}] field {:.3}, error {:.4} (was {:.4})",
                candidate.offset.x,
                candidate.offset.y,
                candidate.offset.z,
                candidate.scale.x,
                candidate.scale.y,
                candidate.scale.z,
                candidate.field_strength.unwrap_or(0.0),
                error,
                previous_error
            );
            self.accepted = candidate;
            self.calibrated = true;
            FitOutcome::Accepted {
                error,
                previous_error,
            }
        } else {
            FitOutcome::NotImproved {
                error,
                previous_error,
            }
        }
    }

    fn discard_pools(&mut self) {
        self.fit_pool.clear();
        self.validation_pool.clear();
    }
}

impl CalibrationStrategy for Ellipsoid {
    fn reset(&mut self, seed: Option<CalibrationTransform>) {
        self.discard_pools();
        self.last_outcome = None;
        self.calibrated = seed.is_some();
        self.accepted = seed.unwrap_or_else(CalibrationTransform::identity);
    }

    /// Full pools wait for the next `ready_check`
    fn accepts_samples(&self) -> bool {
        !self.pools_full()
    }

    fn collect(&mut self, sample: RawSample) {
        let pool_size = self.pool_size();
        if self.fit_pool.len < pool_size {
            self.fit_pool.push(sample.vector());
        } else if self.validation_pool.len < pool_size {
            self.validation_pool.push(sample.vector());
        }
    }

    /// Runs a fit attempt when both pools are full
    ///
    /// Returns whether a calibration is in force afterwards, so once a fit
    /// has been accepted (or a seed loaded) this keeps returning true while
    /// later attempts can still improve the transform.
    fn ready_check(&mut self) -> bool {
        if !self.pools_full() {
            return self.calibrated;
        }

        let outcome = self.attempt();
        debug!("ellipsoid fit attempt: {:?}", outcome);
        self.last_outcome = Some(outcome);
        self.discard_pools();
        self.calibrated
    }

    fn compute(&self) -> Result<CalibrationTransform, CalibrationError> {
        if self.calibrated {
            Ok(self.accepted)
        } else {
            Err(CalibrationError::NotReady)
        }
    }

    fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    fn current(&self) -> Option<&CalibrationTransform> {
        self.calibrated.then_some(&self.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

    /// Points of an axis-aligned ellipsoid: `offset + r * u / gains` for
    /// Fibonacci-sphere directions `u`
    fn ellipsoid_points(
        count: usize,
        phase: f64,
        offset: Vector3<f64>,
        gains: Vector3<f64>,
        radius: f64,
    ) -> [Vector3<f64>; MAX_POOL_SIZE] {
        let mut points = [Vector3::zeros(); MAX_POOL_SIZE];
        for (i, point) in points.iter_mut().take(count).enumerate() {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / count as f64;
            let r = (1.0 - z * z).sqrt();
            let theta = GOLDEN_ANGLE * i as f64 + phase;
            let direction = Vector3::new(r * theta.cos(), r * theta.sin(), z);
            *point = offset + (direction * radius).component_div(&gains);
        }
        points
    }

    fn fill(model: &mut Ellipsoid, points: &[Vector3<f64>]) {
        for p in points {
            model.collect(RawSample::new(p.x, p.y, p.z, 0));
        }
    }

    #[test]
    fn test_fit_recovers_sphere() {
        let offset = Vector3::new(5.0, -3.0, 2.0);
        let points = ellipsoid_points(24, 0.0, offset, Vector3::repeat(1.0), 40.0);
        let transform = fit(&points[..24]).unwrap();

        assert!((transform.offset - offset).magnitude() < 1e-6);
        assert!((transform.scale - Vector3::repeat(1.0)).magnitude() < 1e-6);
        assert!((transform.field_strength.unwrap() - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_recovers_gains() {
        let offset = Vector3::new(-12.0, 30.0, 7.5);
        let gains = Vector3::new(1.1, 0.9, 1.0);
        let points = ellipsoid_points(24, 0.3, offset, gains, 45.0);
        let transform = fit(&points[..24]).unwrap();

        let norm = cbrt(gains.x * gains.y * gains.z);
        assert!((transform.offset - offset).magnitude() < 1e-6);
        assert!((transform.scale - gains / norm).magnitude() < 1e-6);
        assert!((transform.field_strength.unwrap() - 45.0 / norm).abs() < 1e-6);

        let product = transform.scale.x * transform.scale.y * transform.scale.z;
        assert!((product - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_rejects_identical_points() {
        let points = [Vector3::new(10.0, 20.0, 30.0); 24];
        assert!(fit(&points).is_none());
    }

    #[test]
    fn test_fit_rejects_collinear_points() {
        let mut points = [Vector3::zeros(); 24];
        for (i, p) in points.iter_mut().enumerate() {
            let t = i as f64 * 3.0 - 30.0;
            *p = Vector3::new(t, 2.0 * t + 1.0, -t);
        }
        assert!(fit(&points).is_none());
    }

    #[test]
    fn test_fit_rejects_planar_points() {
        let mut points = [Vector3::zeros(); 24];
        for (i, p) in points.iter_mut().enumerate() {
            let theta = i as f64 * GOLDEN_ANGLE;
            *p = Vector3::new(40.0 * theta.cos(), 40.0 * theta.sin(), 3.0);
        }
        assert!(fit(&points).is_none());
    }

    #[test]
    fn test_fit_requires_six_points() {
        let points = ellipsoid_points(5, 0.0, Vector3::zeros(), Vector3::repeat(1.0), 40.0);
        assert!(fit(&points[..5]).is_none());
    }

    #[test]
    fn test_validate() {
        let offset = Vector3::new(5.0, -3.0, 2.0);
        let points = ellipsoid_points(24, 0.0, offset, Vector3::repeat(1.0), 40.0);
        let exact = CalibrationTransform::new(offset, Vector3::repeat(1.0), Some(40.0));
        assert!(validate(&exact, &points[..24]) < 1e-18);

        let off_by_one = CalibrationTransform::new(offset, Vector3::repeat(1.0), Some(41.0));
        assert!((validate(&off_by_one, &points[..24]) - 1.0).abs() < 1e-9);

        assert_eq!(validate(&exact, &[]), f64::INFINITY);
    }

    #[test]
    fn test_validate_identity_scores_raw_magnitude() {
        let points = [Vector3::new(30.0, 40.0, 0.0); 4];
        let error = validate(&CalibrationTransform::identity(), &points);
        assert!((error - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_pools_fill_in_order() {
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        let points = ellipsoid_points(48, 0.0, Vector3::zeros(), Vector3::repeat(1.0), 40.0);

        fill(&mut model, &points[..24]);
        assert_eq!(model.fit_points().len(), 24);
        assert_eq!(model.validation_points().len(), 0);
        assert!(!model.pools_full());

        fill(&mut model, &points[24..48]);
        assert!(model.pools_full());
        assert!(!model.accepts_samples());
        assert_eq!(model.fit_points(), &points[..24]);
        assert_eq!(model.validation_points(), &points[24..48]);

        // Full pools ignore further samples
        model.collect(RawSample::new(1.0, 2.0, 3.0, 0));
        assert_eq!(model.collected(), 48);
    }

    #[test]
    fn test_ready_check_accepts_good_fit() {
        let offset = Vector3::new(5.0, -3.0, 2.0);
        let gains = Vector3::new(1.0, 1.02, 0.98);
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        fill(&mut model, &ellipsoid_points(24, 0.0, offset, gains, 40.0)[..24]);
        assert!(!model.ready_check());
        fill(&mut model, &ellipsoid_points(24, 1.0, offset, gains, 40.0)[..24]);

        assert!(model.ready_check());
        assert!(matches!(model.last_outcome(), Some(FitOutcome::Accepted { .. })));
        assert_eq!(model.collected(), 0);

        let transform = model.compute().unwrap();
        assert!((transform.offset - offset).magnitude() < 1e-6);
    }

    #[test]
    fn test_degenerate_pools_discarded() {
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        let points = [Vector3::new(10.0, 20.0, 30.0); 48];
        fill(&mut model, &points);
        assert!(!model.ready_check());
        assert_eq!(model.last_outcome(), Some(FitOutcome::Degenerate));
        assert_eq!(model.collected(), 0);
        assert!(model.compute().is_err());
        assert_eq!(model.accepted, CalibrationTransform::identity());
    }

    #[test]
    fn test_exceeds_bound() {
        let offset = Vector3::new(5.0, -3.0, 2.0);
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        fill(&mut model, &ellipsoid_points(24, 0.0, offset, Vector3::repeat(1.0), 40.0)[..24]);
        // Validation points on a sphere 3 µT larger
        fill(&mut model, &ellipsoid_points(24, 1.0, offset, Vector3::repeat(1.0), 43.0)[..24]);

        assert!(!model.ready_check());
        match model.last_outcome() {
            Some(FitOutcome::ExceedsBound { error }) => assert!((error - 9.0).abs() < 1e-6),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_not_improved_keeps_previous() {
        let offset = Vector3::new(5.0, -3.0, 2.0);
        let seed = CalibrationTransform::new(offset, Vector3::repeat(1.0), Some(40.0));
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        model.reset(Some(seed));

        // Fit pool from a slightly wrong sphere, validation from the true one
        let shifted = offset + Vector3::new(1.0, 0.0, 0.0);
        fill(&mut model, &ellipsoid_points(24, 0.0, shifted, Vector3::repeat(1.0), 40.0)[..24]);
        fill(&mut model, &ellipsoid_points(24, 1.0, offset, Vector3::repeat(1.0), 40.0)[..24]);

        assert!(model.ready_check());
        assert!(matches!(model.last_outcome(), Some(FitOutcome::NotImproved { .. })));
        assert_eq!(model.compute().unwrap(), seed);
    }

    #[test]
    fn test_seeded_ready_without_samples() {
        let seed = CalibrationTransform::new(
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::repeat(1.0),
            Some(42.0),
        );
        let mut model = Ellipsoid::new(EllipsoidSettings::default());
        model.reset(Some(seed));
        assert!(model.ready_check());
        assert_eq!(model.current(), Some(&seed));
        assert!(model.last_outcome().is_none());
    }

    #[test]
    fn test_custom_pool_size() {
        let settings = EllipsoidSettings {
            pool_size: 10,
            ..Default::default()
        };
        let offset = Vector3::new(-4.0, 8.0, 1.0);
        let mut model = Ellipsoid::new(settings);
        fill(&mut model, &ellipsoid_points(10, 0.0, offset, Vector3::repeat(1.0), 35.0)[..10]);
        fill(&mut model, &ellipsoid_points(10, 1.0, offset, Vector3::repeat(1.0), 35.0)[..10]);
        assert!(model.pools_full());
        assert!(model.ready_check());
    }
}
