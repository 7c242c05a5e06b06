//! Calibration engine for one magnetometer

use log::info;
use nalgebra::Vector3;

use crate::ellipsoid::FitOutcome;
use crate::error::CalibrationError;
use crate::filter::SampleFilter;
use crate::strategy::{CalibrationStrategy, Strategy};
use crate::types::{CalibrationTransform, EngineSettings, RawSample, StrategyKind};

/// Online hard/soft iron calibration
///
/// Owns the sample filter and the configured strategy. Feed every raw
/// reading through [`collect`](Self::collect), then call
/// [`ready_check`](Self::ready_check) to let the strategy process what it
/// has gathered.
///
/// # Example
/// ```
/// use compass_calibration::{CalibrationEngine, EngineSettings};
///
/// let mut engine = CalibrationEngine::new(EngineSettings::default()).unwrap();
/// engine.init(None);
///
/// assert!(engine.collect(12.0, -30.0, 41.0, 0));
/// assert!(!engine.ready_check());
/// assert!(engine.compute().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    settings: EngineSettings,
    filter: SampleFilter,
    strategy: Strategy,
}

impl CalibrationEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, CalibrationError> {
        settings.validate()?;
        Ok(Self {
            settings,
            filter: SampleFilter::new(settings.filter),
            strategy: Strategy::from_settings(&settings),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Start a calibration session
    ///
    /// A seed is a transform loaded from a previous session; it is in force
    /// immediately. Invalid seeds are ignored.
    pub fn init(&mut self, seed: Option<CalibrationTransform>) {
        let seed = seed.filter(|transform| transform.is_valid());
        if let Some(transform) = &seed {
            info!(
                "calibration session seeded: offset [{:.3}, {:.3}, {:.3}] \
                 scale [{:.4}, {:.4}, {:.4}]",
                transform.offset.x,
                transform.offset.y,
                transform.offset.z,
                transform.scale.x,
                transform.scale.y,
                transform.scale.z
            );
        }
        self.filter.reset();
        self.strategy.reset(seed);
    }

    /// Offer one raw reading, returning whether it was stored for calibration
    pub fn collect(&mut self, x: f64, y: f64, z: f64, t_ms: i64) -> bool {
        self.collect_sample(RawSample::new(x, y, z, t_ms))
    }

    pub fn collect_sample(&mut self, sample: RawSample) -> bool {
        if !self.filter.screen(sample, self.strategy.current()) {
            return false;
        }
        if !self.strategy.accepts_samples() {
            return false;
        }
        self.strategy.collect(sample);
        self.filter.remember(sample.vector());
        true
    }

    /// Let the strategy process collected samples
    ///
    /// Returns whether a calibration is in force afterwards. Once true it
    /// stays true until the next [`init`](Self::init).
    pub fn ready_check(&mut self) -> bool {
        self.strategy.ready_check()
    }

    /// The calibration in force
    ///
    /// # Errors
    /// [`CalibrationError::NotReady`] until [`ready_check`](Self::ready_check)
    /// has returned true or a seed was loaded.
    pub fn compute(&self) -> Result<CalibrationTransform, CalibrationError> {
        self.strategy.compute()
    }

    pub fn is_calibrated(&self) -> bool {
        self.strategy.is_calibrated()
    }

    /// The calibration in force, or the identity transform when uncalibrated
    pub fn transform(&self) -> CalibrationTransform {
        self.strategy.current().copied().unwrap_or_default()
    }

    /// Correct a raw reading with the calibration in force
    pub fn apply(&self, raw: Vector3<f64>) -> Vector3<f64> {
        self.transform().apply(raw)
    }

    /// Outcome of the most recent ellipsoid fit attempt
    pub fn last_outcome(&self) -> Option<FitOutcome> {
        match &self.strategy {
            Strategy::Ellipsoid(model) => model.last_outcome(),
            Strategy::BoundingBox(_) => None,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }
}
