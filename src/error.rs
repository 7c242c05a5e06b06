//! Error types for the compass calibration library

use thiserror::Error;

/// Errors surfaced by the calibration engine, its settings, and persistence
///
/// Rejected samples, degenerate fits, and fits failing a quality gate are
/// part of normal operation and are reported through booleans and
/// [`FitOutcome`](crate::FitOutcome), never through this type.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// A calibration was requested before one is in force
    #[error("calibration not ready")]
    NotReady,

    /// A settings value is out of its supported range
    #[error("invalid setting `{0}`")]
    InvalidSetting(&'static str),

    /// A persisted calibration record could not be used
    #[error("malformed calibration record")]
    MalformedRecord,

    /// Reading or writing a calibration file failed
    #[cfg(feature = "std")]
    #[error("calibration file i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for calibration operations
pub type CalibrationResult<T> = Result<T, CalibrationError>;
