//! Bounding-box hard/soft iron calibration
//!
//! Tracks the running min/max of each axis. A calibration becomes available
//! in two phases: first every axis must span at least twice the smallest
//! plausible Earth field, then every coverage bucket of every axis must have
//! been visited. The result centres each axis and stretches it to the widest
//! observed span, with no rotation correction.
//!
//! Unlike the ellipsoid strategy there is no improvement gate: the first
//! fit with full coverage is accepted unconditionally.

use log::{debug, info};
use nalgebra::Vector3;

use crate::error::CalibrationError;
use crate::strategy::CalibrationStrategy;
use crate::types::{BoundingBoxSettings, CalibrationTransform, MAX_COVERAGE_BUCKETS, RawSample};

/// Observed per-axis extremes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Bounds {
    fn new(reading: Vector3<f64>) -> Self {
        Self {
            min: reading,
            max: reading,
        }
    }

    fn include(&mut self, reading: &Vector3<f64>) {
        self.min = self.min.inf(reading);
        self.max = self.max.sup(reading);
    }

    pub fn span(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Offset and gains normalising every axis to the widest span
    pub fn transform(&self) -> CalibrationTransform {
        let span = self.span();
        let widest = span.max();
        CalibrationTransform::new(
            (self.max + self.min) * 0.5,
            span.map(|s| widest / s),
            None,
        )
    }
}

/// Bounding-box calibration state for one magnetometer
///
/// # Example
/// ```
/// use compass_calibration::{BoundingBox, BoundingBoxSettings, CalibrationStrategy, RawSample};
///
/// let mut model = BoundingBox::new(BoundingBoxSettings::default());
/// model.collect(RawSample::new(0.0, 0.0, 0.0, 0));
/// assert!(!model.ready_check());
/// ```
#[derive(Debug, Clone)]
pub struct BoundingBox {
    settings: BoundingBoxSettings,
    bounds: Option<Bounds>,
    /// Visited buckets per axis, one bit per bucket
    coverage: [u32; 3],
    /// Set once the span check first passes
    fine_coverage: bool,
    calibrated: bool,
    transform: Option<CalibrationTransform>,
}

impl BoundingBox {
    pub fn new(settings: BoundingBoxSettings) -> Self {
        Self {
            settings,
            bounds: None,
            coverage: [0; 3],
            fine_coverage: false,
            calibrated: false,
            transform: None,
        }
    }

    pub fn settings(&self) -> &BoundingBoxSettings {
        &self.settings
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Bitmask of visited buckets on one axis
    pub fn coverage(&self, axis: usize) -> u32 {
        self.coverage[axis]
    }

    pub fn is_fine_coverage(&self) -> bool {
        self.fine_coverage
    }

    fn buckets(&self) -> usize {
        self.settings.coverage_buckets.clamp(2, MAX_COVERAGE_BUCKETS)
    }

    fn full_mask(&self) -> u32 {
        u32::MAX >> (MAX_COVERAGE_BUCKETS - self.buckets())
    }

    fn spans_min_field(&self, bounds: &Bounds) -> bool {
        let required = 2.0 * self.settings.min_field;
        bounds.span().iter().all(|s| *s >= required)
    }

    fn mark_coverage(&mut self, reading: &Vector3<f64>) {
        let Some(bounds) = self.bounds else {
            return;
        };
        let buckets = self.buckets();

        for axis in 0..3 {
            let span = bounds.max[axis] - bounds.min[axis];
            // Degenerate axis, nothing to subdivide yet
            if span <= 0.0 {
                continue;
            }
            let fraction = (reading[axis] - bounds.min[axis]) / span;
            // The extremes themselves only widen the range
            if fraction <= 0.0 || fraction >= 1.0 {
                continue;
            }
            let bucket = ((fraction * buckets as f64) as usize).min(buckets - 1);
            self.coverage[axis] |= 1 << bucket;
        }
    }
}

impl CalibrationStrategy for BoundingBox {
    fn reset(&mut self, seed: Option<CalibrationTransform>) {
        self.bounds = None;
        self.coverage = [0; 3];
        self.fine_coverage = false;
        self.calibrated = seed.is_some();
        self.transform = seed;
    }

    /// Frozen once calibrated, until the next reset
    fn accepts_samples(&self) -> bool {
        !self.calibrated
    }

    fn collect(&mut self, sample: RawSample) {
        if self.calibrated {
            return;
        }
        let reading = sample.vector();
        match self.bounds.as_mut() {
            Some(bounds) => bounds.include(&reading),
            None => self.bounds = Some(Bounds::new(reading)),
        }
        if self.fine_coverage {
            self.mark_coverage(&reading);
        }
    }

    fn ready_check(&mut self) -> bool {
        if self.calibrated {
            return true;
        }
        let Some(bounds) = self.bounds else {
            return false;
        };
        if !self.spans_min_field(&bounds) {
            return false;
        }

        if !self.fine_coverage {
            debug!("span reached, tracking axis coverage");
            self.fine_coverage = true;
        }

        let full = self.full_mask();
        if self.coverage.iter().any(|mask| *mask != full) {
            return false;
        }

        let transform = bounds.transform();
        info!(
            "bounding-box calibration ready: offset [{:.3}, {:.3}, {:.3}] \
             scale [{:.4}, {:.4}, {:.4}]",
            transform.offset.x,
            transform.offset.y,
            transform.offset.z,
            transform.scale.x,
            transform.scale.y,
            transform.scale.z
        );
        self.transform = Some(transform);
        self.calibrated = true;
        true
    }

    fn compute(&self) -> Result<CalibrationTransform, CalibrationError> {
        match (self.calibrated, self.transform) {
            (true, Some(transform)) => Ok(transform),
            _ => Err(CalibrationError::NotReady),
        }
    }

    fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    fn current(&self) -> Option<&CalibrationTransform> {
        self.transform.as_ref().filter(|_| self.calibrated)
    }
}
