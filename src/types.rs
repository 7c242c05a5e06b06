//! Core types and settings for the compass calibration library

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::axes::AxisMapping;
use crate::error::CalibrationError;

/// Largest supported number of coverage buckets per axis
pub const MAX_COVERAGE_BUCKETS: usize = 32;

/// Smallest ellipsoid pool that over-determines the six unknowns
pub const MIN_POOL_SIZE: usize = 6;

/// Largest supported ellipsoid pool size
pub const MAX_POOL_SIZE: usize = 64;

/// Largest supported smoothing window
pub const MAX_SMOOTHING_WINDOW: usize = 128;

/// One uncalibrated magnetometer reading
///
/// Values are in micro-Tesla, `t_ms` is the capture time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t_ms: i64,
}

impl RawSample {
    pub fn new(x: f64, y: f64, z: f64, t_ms: i64) -> Self {
        Self { x, y, z, t_ms }
    }

    /// Reading as a vector, dropping the timestamp
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Hard-iron offset and soft-iron gains learned by a calibration strategy
///
/// A calibrated reading is `(raw - offset) ∘ scale`. The bounding-box
/// strategy produces no field-strength estimate; the ellipsoid strategy
/// reports the radius of the fitted sphere.
///
/// Whether a transform is trusted is tracked by the engine, never inferred
/// from the values: [`CalibrationTransform::identity`] is only the default.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_calibration::CalibrationTransform;
///
/// let transform = CalibrationTransform::new(
///     Vector3::new(5.0, -3.0, 2.0),
///     Vector3::new(1.0, 1.0, 1.0),
///     Some(40.0),
/// );
/// let calibrated = transform.apply(Vector3::new(45.0, -3.0, 2.0));
/// assert_eq!(calibrated, Vector3::new(40.0, 0.0, 0.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationTransform {
    /// Hard-iron offset in µT, subtracted from raw readings
    pub offset: Vector3<f64>,
    /// Diagonal soft-iron gains, applied after the offset
    pub scale: Vector3<f64>,
    /// Expected magnitude of calibrated readings in µT
    pub field_strength: Option<f64>,
}

impl CalibrationTransform {
    pub fn new(offset: Vector3<f64>, scale: Vector3<f64>, field_strength: Option<f64>) -> Self {
        Self {
            offset,
            scale,
            field_strength,
        }
    }

    /// Zero offset, unit gains, no field estimate
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Vector3::repeat(1.0), None)
    }

    /// Apply hard and soft iron correction to a raw reading
    pub fn apply(&self, raw: Vector3<f64>) -> Vector3<f64> {
        (raw - self.offset).component_mul(&self.scale)
    }

    /// Offset finite, gains finite and positive, field strength (if any) finite and positive
    pub fn is_valid(&self) -> bool {
        self.offset.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite() && *v > 0.0)
            && self.field_strength.is_none_or(|f| f.is_finite() && f > 0.0)
    }
}

impl Default for CalibrationTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Reported accuracy of a corrected reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Accuracy {
    /// No trusted calibration yet, the reading is uncorrected
    #[default]
    Low,
    /// A calibration is in force
    High,
}

/// Output of the compass driver for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub accuracy: Accuracy,
    pub t_ms: i64,
}

impl CorrectedReading {
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Calibration strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StrategyKind {
    /// Per-axis min/max tracking with coverage buckets
    BoundingBox,
    /// Least-squares ellipsoid fit with held-out validation
    #[default]
    Ellipsoid,
}

/// Sample admission settings
///
/// Each rule is disabled by setting its threshold to 0.
///
/// # Example
/// ```
/// use compass_calibration::FilterSettings;
///
/// let settings = FilterSettings {
///     jump_threshold: 20.0,   // stricter spike rejection
///     min_difference: 0.0,    // accept near-duplicate points
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FilterSettings {
    /// Samples closer than this to the previous one are checked for spikes
    pub jump_window_ms: i64,
    /// Largest per-axis change in µT allowed inside the jump window
    pub jump_threshold: f64,
    /// Largest calibrated magnitude in µT accepted once calibrated
    pub max_field: f64,
    /// Per-axis difference in µT below which a sample is a near-duplicate
    pub min_difference: f64,
    /// Number of recently accepted samples checked for near-duplicates
    pub lookback: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            jump_window_ms: 20,
            jump_threshold: 30.0,
            max_field: 80.0,
            min_difference: 1.5,
            lookback: 6,
        }
    }
}

impl FilterSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.jump_window_ms < 0 {
            return Err(CalibrationError::InvalidSetting("jump_window_ms"));
        }
        if !(self.jump_threshold >= 0.0 && self.jump_threshold.is_finite()) {
            return Err(CalibrationError::InvalidSetting("jump_threshold"));
        }
        if !(self.max_field >= 0.0 && self.max_field.is_finite()) {
            return Err(CalibrationError::InvalidSetting("max_field"));
        }
        if !(self.min_difference >= 0.0 && self.min_difference.is_finite()) {
            return Err(CalibrationError::InvalidSetting("min_difference"));
        }
        if self.lookback > crate::filter::RECENT_CAPACITY {
            return Err(CalibrationError::InvalidSetting("lookback"));
        }
        Ok(())
    }
}

/// Bounding-box strategy settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoundingBoxSettings {
    /// Smallest plausible Earth field in µT; each axis must span twice this
    pub min_field: f64,
    /// Number of equal-width coverage buckets per axis
    pub coverage_buckets: usize,
}

impl Default for BoundingBoxSettings {
    fn default() -> Self {
        Self {
            min_field: 25.0,
            coverage_buckets: 8,
        }
    }
}

impl BoundingBoxSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.min_field > 0.0 && self.min_field.is_finite()) {
            return Err(CalibrationError::InvalidSetting("min_field"));
        }
        if !(2..=MAX_COVERAGE_BUCKETS).contains(&self.coverage_buckets) {
            return Err(CalibrationError::InvalidSetting("coverage_buckets"));
        }
        Ok(())
    }
}

/// Ellipsoid strategy settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EllipsoidSettings {
    /// Capacity of the fit pool and of the validation pool
    pub pool_size: usize,
    /// Absolute bound on the validation error in µT²
    pub max_square_error: f64,
}

impl Default for EllipsoidSettings {
    fn default() -> Self {
        Self {
            pool_size: 24,
            max_square_error: 4.5,
        }
    }
}

impl EllipsoidSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&self.pool_size) {
            return Err(CalibrationError::InvalidSetting("pool_size"));
        }
        if !(self.max_square_error > 0.0 && self.max_square_error.is_finite()) {
            return Err(CalibrationError::InvalidSetting("max_square_error"));
        }
        Ok(())
    }
}

/// Calibration engine settings
///
/// # Example
/// ```
/// use compass_calibration::{CalibrationEngine, EngineSettings, StrategyKind};
///
/// let settings = EngineSettings {
///     strategy: StrategyKind::BoundingBox,
///     ..Default::default()
/// };
/// let engine = CalibrationEngine::new(settings).unwrap();
/// assert!(!engine.is_calibrated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineSettings {
    pub strategy: StrategyKind,
    pub filter: FilterSettings,
    pub bounding_box: BoundingBoxSettings,
    pub ellipsoid: EllipsoidSettings,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.filter.validate()?;
        match self.strategy {
            StrategyKind::BoundingBox => self.bounding_box.validate(),
            StrategyKind::Ellipsoid => self.ellipsoid.validate(),
        }
    }
}

/// Output smoothing settings
///
/// Mirrors the moving-average filter some boards apply to calibrated
/// readings to mitigate floating values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SmoothingSettings {
    /// Number of readings averaged
    pub window: usize,
    /// Gap in milliseconds after which the history is discarded
    pub valid_time_ms: i64,
    /// Change in µT from the previous reading that counts as a jump
    pub jump_threshold: f64,
    /// Consecutive jumps after which the history is flushed
    pub jump_limit: u32,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            window: 100,
            valid_time_ms: 100,
            jump_threshold: 8.0,
            jump_limit: 5,
        }
    }
}

impl SmoothingSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(1..=MAX_SMOOTHING_WINDOW).contains(&self.window) {
            return Err(CalibrationError::InvalidSetting("window"));
        }
        if self.valid_time_ms <= 0 {
            return Err(CalibrationError::InvalidSetting("valid_time_ms"));
        }
        if !(self.jump_threshold > 0.0 && self.jump_threshold.is_finite()) {
            return Err(CalibrationError::InvalidSetting("jump_threshold"));
        }
        if self.jump_limit == 0 {
            return Err(CalibrationError::InvalidSetting("jump_limit"));
        }
        Ok(())
    }
}

/// Compass driver settings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverSettings {
    pub engine: EngineSettings,
    /// Device count to µT conversion and axis remapping
    pub axes: AxisMapping,
    /// Moving-average smoothing of reported readings, disabled when `None`
    pub smoothing: Option<SmoothingSettings>,
}

impl DriverSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.engine.validate()?;
        self.axes.validate()?;
        if let Some(smoothing) = &self.smoothing {
            smoothing.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.strategy, StrategyKind::Ellipsoid);
        assert_eq!(settings.filter.jump_window_ms, 20);
        assert_eq!(settings.filter.jump_threshold, 30.0);
        assert_eq!(settings.filter.max_field, 80.0);
        assert_eq!(settings.filter.min_difference, 1.5);
        assert_eq!(settings.filter.lookback, 6);
        assert_eq!(settings.bounding_box.min_field, 25.0);
        assert_eq!(settings.bounding_box.coverage_buckets, 8);
        assert_eq!(settings.ellipsoid.pool_size, 24);
        assert_eq!(settings.ellipsoid.max_square_error, 4.5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        let settings = EllipsoidSettings {
            pool_size: 4,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CalibrationError::InvalidSetting("pool_size"))
        ));

        let settings = BoundingBoxSettings {
            coverage_buckets: 33,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CalibrationError::InvalidSetting("coverage_buckets"))
        ));

        let settings = FilterSettings {
            lookback: 7,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CalibrationError::InvalidSetting("lookback"))
        ));

        let settings = SmoothingSettings {
            window: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CalibrationError::InvalidSetting("window"))
        ));
    }

    #[test]
    fn test_strategy_settings_only_checked_when_selected() {
        let settings = EngineSettings {
            strategy: StrategyKind::BoundingBox,
            ellipsoid: EllipsoidSettings {
                pool_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_transform_validity() {
        assert!(CalibrationTransform::identity().is_valid());

        let mut transform = CalibrationTransform::identity();
        transform.scale.y = 0.0;
        assert!(!transform.is_valid());

        let mut transform = CalibrationTransform::identity();
        transform.offset.z = f64::NAN;
        assert!(!transform.is_valid());

        let mut transform = CalibrationTransform::identity();
        transform.field_strength = Some(f64::INFINITY);
        assert!(!transform.is_valid());
    }

    #[test]
    fn test_transform_apply() {
        let transform = CalibrationTransform::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(2.0, 0.5, 1.0),
            None,
        );
        let calibrated = transform.apply(Vector3::new(3.0, 4.0, 5.0));
        assert!((calibrated - Vector3::new(4.0, 1.0, 2.0)).magnitude() < 1e-12);
    }
}
