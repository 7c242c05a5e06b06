//! Calibration snapshots shared with other threads

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::RwLock;

use crate::types::{Accuracy, CalibrationTransform};

/// Transform and calibrated flag, always published together
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationSnapshot {
    pub transform: CalibrationTransform,
    pub calibrated: bool,
}

impl CalibrationSnapshot {
    pub fn accuracy(&self) -> Accuracy {
        if self.calibrated { Accuracy::High } else { Accuracy::Low }
    }

    /// Correct a raw reading, passing it through unchanged when uncalibrated
    pub fn apply(&self, raw: Vector3<f64>) -> Vector3<f64> {
        if self.calibrated {
            self.transform.apply(raw)
        } else {
            raw
        }
    }
}

/// Handle to the calibration in force, cheap to clone across threads
///
/// The sensor read loop publishes; persistence or IPC threads read whole
/// snapshots and never observe a partially updated transform.
///
/// # Example
/// ```
/// use std::thread;
/// use compass_calibration::{CalibrationSnapshot, CalibrationTransform, SharedCalibration};
///
/// let shared = SharedCalibration::new();
/// let reader = shared.clone();
///
/// shared.publish(CalibrationSnapshot {
///     transform: CalibrationTransform::identity(),
///     calibrated: true,
/// });
///
/// let handle = thread::spawn(move || reader.snapshot().calibrated);
/// assert!(handle.join().unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedCalibration {
    inner: Arc<RwLock<CalibrationSnapshot>>,
}

impl SharedCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: CalibrationSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        *self.inner.read()
    }
}
