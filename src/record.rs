//! Persistence of calibrations between sessions
//!
//! A calibration is stored as one whitespace-separated text line:
//!
//! ```text
//! <calibrated 0|1> off_x off_y off_z scale_x scale_y scale_z field
//! ```
//!
//! A field of `0` means the strategy produced no field-strength estimate.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "std")]
use log::warn;
use nalgebra::Vector3;

use crate::error::CalibrationError;
use crate::types::CalibrationTransform;

/// One persisted calibration
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_calibration::{CalibrationRecord, CalibrationTransform};
///
/// let record: CalibrationRecord = "1 5 -3 2 1 1.02 0.98 40".parse().unwrap();
/// assert!(record.calibrated);
/// assert_eq!(record.transform.offset, Vector3::new(5.0, -3.0, 2.0));
/// assert_eq!(record.transform.field_strength, Some(40.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    pub calibrated: bool,
    pub transform: CalibrationTransform,
}

impl CalibrationRecord {
    pub fn new(transform: CalibrationTransform) -> Self {
        Self {
            calibrated: true,
            transform,
        }
    }

    /// The stored transform, if it was marked calibrated
    pub fn seed(&self) -> Option<CalibrationTransform> {
        self.calibrated.then_some(self.transform)
    }
}

impl fmt::Display for CalibrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.transform;
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            u8::from(self.calibrated),
            t.offset.x,
            t.offset.y,
            t.offset.z,
            t.scale.x,
            t.scale.y,
            t.scale.z,
            t.field_strength.unwrap_or(0.0)
        )
    }
}

impl FromStr for CalibrationRecord {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();

        let calibrated = match fields.next() {
            Some("0") => false,
            Some("1") => true,
            _ => return Err(CalibrationError::MalformedRecord),
        };

        let mut values = [0.0f64; 7];
        for value in values.iter_mut() {
            *value = fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or(CalibrationError::MalformedRecord)?;
        }
        if fields.next().is_some() {
            return Err(CalibrationError::MalformedRecord);
        }

        let [ox, oy, oz, sx, sy, sz, field] = values;
        let transform = CalibrationTransform::new(
            Vector3::new(ox, oy, oz),
            Vector3::new(sx, sy, sz),
            (field != 0.0).then_some(field),
        );
        if calibrated && !transform.is_valid() {
            return Err(CalibrationError::MalformedRecord);
        }

        Ok(Self {
            calibrated,
            transform,
        })
    }
}

/// Storage for the calibration carried between sessions
pub trait CalibrationStore {
    /// The stored calibration, or `None` when nothing usable is stored
    fn load(&mut self) -> Option<CalibrationTransform>;

    fn store(&mut self, transform: &CalibrationTransform) -> Result<(), CalibrationError>;
}

/// In-memory store, mostly useful for tests and `no_std` targets
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    transform: Option<CalibrationTransform>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(transform: CalibrationTransform) -> Self {
        Self {
            transform: Some(transform),
        }
    }

    pub fn get(&self) -> Option<&CalibrationTransform> {
        self.transform.as_ref()
    }
}

impl CalibrationStore for MemoryStore {
    fn load(&mut self) -> Option<CalibrationTransform> {
        self.transform.filter(|t| t.is_valid())
    }

    fn store(&mut self, transform: &CalibrationTransform) -> Result<(), CalibrationError> {
        self.transform = Some(*transform);
        Ok(())
    }
}

/// Text-record store backed by a file
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct FileStore {
    path: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl FileStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read and parse the record, `Ok(None)` when the file does not exist
    pub fn read(&self) -> Result<Option<CalibrationRecord>, CalibrationError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents.parse().map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(feature = "std")]
impl CalibrationStore for FileStore {
    fn load(&mut self) -> Option<CalibrationTransform> {
        match self.read() {
            Ok(record) => record.and_then(|r| r.seed()),
            Err(e) => {
                warn!("ignoring calibration file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn store(&mut self, transform: &CalibrationTransform) -> Result<(), CalibrationError> {
        let record = CalibrationRecord::new(*transform);
        std::fs::write(&self.path, format!("{}\n", record))?;
        Ok(())
    }
}
