//! Common interface of the calibration strategies

use crate::bounding_box::BoundingBox;
use crate::ellipsoid::Ellipsoid;
use crate::error::CalibrationError;
use crate::types::{CalibrationTransform, EngineSettings, RawSample, StrategyKind};

/// A model that learns a [`CalibrationTransform`] from admitted samples
///
/// Implementations never see rejected samples; admission is decided by the
/// engine's [`SampleFilter`](crate::SampleFilter). All methods are expected
/// to be called from a single read loop.
pub trait CalibrationStrategy {
    /// Start a new session, optionally seeded with a previously stored transform
    fn reset(&mut self, seed: Option<CalibrationTransform>);

    /// Whether `collect` would currently store a sample
    fn accepts_samples(&self) -> bool;

    /// Record one admitted sample
    fn collect(&mut self, sample: RawSample);

    /// Process collected samples and report whether a calibration is in force
    fn ready_check(&mut self) -> bool;

    /// The calibration in force, or [`CalibrationError::NotReady`]
    fn compute(&self) -> Result<CalibrationTransform, CalibrationError>;

    fn is_calibrated(&self) -> bool;

    /// The calibration in force, if any
    fn current(&self) -> Option<&CalibrationTransform>;
}

/// Strategy selected at runtime from [`EngineSettings::strategy`]
#[derive(Debug, Clone)]
pub enum Strategy {
    BoundingBox(BoundingBox),
    Ellipsoid(Ellipsoid),
}

impl Strategy {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        match settings.strategy {
            StrategyKind::BoundingBox => {
                Strategy::BoundingBox(BoundingBox::new(settings.bounding_box))
            }
            StrategyKind::Ellipsoid => Strategy::Ellipsoid(Ellipsoid::new(settings.ellipsoid)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::BoundingBox(_) => StrategyKind::BoundingBox,
            Strategy::Ellipsoid(_) => StrategyKind::Ellipsoid,
        }
    }

    fn as_dyn(&self) -> &dyn CalibrationStrategy {
        match self {
            Strategy::BoundingBox(model) => model,
            Strategy::Ellipsoid(model) => model,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn CalibrationStrategy {
        match self {
            Strategy::BoundingBox(model) => model,
            Strategy::Ellipsoid(model) => model,
        }
    }
}

impl CalibrationStrategy for Strategy {
    fn reset(&mut self, seed: Option<CalibrationTransform>) {
        self.as_dyn_mut().reset(seed)
    }

    fn accepts_samples(&self) -> bool {
        self.as_dyn().accepts_samples()
    }

    fn collect(&mut self, sample: RawSample) {
        self.as_dyn_mut().collect(sample)
    }

    fn ready_check(&mut self) -> bool {
        self.as_dyn_mut().ready_check()
    }

    fn compute(&self) -> Result<CalibrationTransform, CalibrationError> {
        self.as_dyn().compute()
    }

    fn is_calibrated(&self) -> bool {
        self.as_dyn().is_calibrated()
    }

    fn current(&self) -> Option<&CalibrationTransform> {
        self.as_dyn().current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        let settings = EngineSettings::default();
        assert_eq!(Strategy::from_settings(&settings).kind(), StrategyKind::Ellipsoid);

        let settings = EngineSettings {
            strategy: StrategyKind::BoundingBox,
            ..Default::default()
        };
        let strategy = Strategy::from_settings(&settings);
        assert_eq!(strategy.kind(), StrategyKind::BoundingBox);
        assert!(strategy.accepts_samples());
        assert!(!strategy.is_calibrated());
    }
}
