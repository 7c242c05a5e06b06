//! Per-sensor compass driver
//!
//! Wraps a [`CalibrationEngine`] with the session handling a sensor driver
//! needs: load the previous calibration when the sensor is enabled, feed
//! every reading through the engine, report corrected readings with an
//! accuracy level, and store the calibration when the sensor is disabled.

use log::{debug, info};

use crate::axes::AxisMapping;
use crate::engine::CalibrationEngine;
use crate::error::CalibrationError;
use crate::record::CalibrationStore;
#[cfg(feature = "std")]
use crate::shared::{CalibrationSnapshot, SharedCalibration};
use crate::smoothing::Smoother;
use crate::types::{Accuracy, CorrectedReading, DriverSettings, RawSample};

/// Compass sensor driver
///
/// # Example
/// ```
/// use compass_calibration::{Accuracy, CompassDriver, DriverSettings, MemoryStore, RawSample};
///
/// let mut store = MemoryStore::new();
/// let mut driver = CompassDriver::new(DriverSettings::default()).unwrap();
/// driver.enable(&mut store);
///
/// let reading = driver.feed(RawSample::new(20.0, -5.0, 33.0, 0));
/// assert_eq!(reading.accuracy, Accuracy::Low);
///
/// driver.disable(&mut store).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CompassDriver {
    settings: DriverSettings,
    engine: CalibrationEngine,
    smoother: Option<Smoother>,
    enabled: bool,
    #[cfg(feature = "std")]
    publisher: Option<SharedCalibration>,
    #[cfg(feature = "std")]
    published: Option<CalibrationSnapshot>,
}

impl CompassDriver {
    pub fn new(settings: DriverSettings) -> Result<Self, CalibrationError> {
        settings.validate()?;
        Ok(Self {
            settings,
            engine: CalibrationEngine::new(settings.engine)?,
            smoother: settings.smoothing.map(Smoother::new),
            enabled: false,
            #[cfg(feature = "std")]
            publisher: None,
            #[cfg(feature = "std")]
            published: None,
        })
    }

    /// Publish every change of the calibration in force to `shared`
    #[cfg(feature = "std")]
    pub fn with_publisher(mut self, shared: SharedCalibration) -> Self {
        self.publisher = Some(shared);
        self.published = None;
        self
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn axes(&self) -> &AxisMapping {
        &self.settings.axes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start a session seeded from `store`
    pub fn enable(&mut self, store: &mut impl CalibrationStore) {
        if self.enabled {
            return;
        }
        let seed = store.load();
        if seed.is_none() {
            info!("no stored calibration, starting uncalibrated");
        }
        self.engine.init(seed);
        if let Some(smoother) = self.smoother.as_mut() {
            smoother.reset();
        }
        self.enabled = true;
        self.publish();
    }

    /// End the session, storing the calibration if one is in force
    pub fn disable(&mut self, store: &mut impl CalibrationStore) -> Result<(), CalibrationError> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        if self.engine.is_calibrated() {
            debug!("storing calibration");
            store.store(&self.engine.transform())?;
        }
        Ok(())
    }

    /// Calibrate with one reading and return it corrected
    pub fn feed(&mut self, sample: RawSample) -> CorrectedReading {
        self.engine.collect_sample(sample);
        let accuracy = if self.engine.ready_check() {
            Accuracy::High
        } else {
            Accuracy::Low
        };
        self.publish();

        let mut corrected = self.engine.apply(sample.vector());
        if let Some(smoother) = self.smoother.as_mut() {
            corrected = smoother.smooth(corrected, sample.t_ms);
        }

        CorrectedReading {
            x: corrected.x,
            y: corrected.y,
            z: corrected.z,
            accuracy,
            t_ms: sample.t_ms,
        }
    }

    /// Convert raw device counts through the axis mapping, then [`feed`](Self::feed)
    pub fn feed_counts(&mut self, counts: [i32; 3], t_ms: i64) -> CorrectedReading {
        let reading = self.settings.axes.convert(counts);
        self.feed(RawSample::new(reading.x, reading.y, reading.z, t_ms))
    }

    #[cfg(feature = "std")]
    fn publish(&mut self) {
        let Some(shared) = &self.publisher else {
            return;
        };
        let snapshot = CalibrationSnapshot {
            transform: self.engine.transform(),
            calibrated: self.engine.is_calibrated(),
        };
        if self.published != Some(snapshot) {
            shared.publish(snapshot);
            self.published = Some(snapshot);
        }
    }

    #[cfg(not(feature = "std"))]
    fn publish(&mut self) {}
}
