//! Device axis remapping and count conversion
//!
//! Magnetometers report raw counts on their own axes. Before calibration the
//! driver converts each count to micro-Tesla and places it on the board axes
//! the sensor is mounted against.
//!
//! # Example
//! ```
//! use compass_calibration::AxisMapping;
//!
//! // Sensor rotated 90° about Z, reporting 0.15 µT per count
//! let mapping = AxisMapping {
//!     source: [1, 0, 2],
//!     invert: [false, true, false],
//!     gain: [100.0 / 0.15; 3],
//! };
//!
//! let reading = mapping.convert([100, 200, 300]);
//! assert!((reading.x - 30.0).abs() < 1e-9);  // Board X = +Sensor Y
//! assert!((reading.y + 15.0).abs() < 1e-9);  // Board Y = -Sensor X
//! assert!((reading.z - 45.0).abs() < 1e-9);
//! ```

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Mapping from device counts to board-frame micro-Tesla
///
/// Output axis `i` takes device axis `source[i]`, negated when `invert[i]`
/// is set, and converts it as `counts * 100 / gain[i]`. A gain of 100 passes
/// counts through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisMapping {
    /// Device axis feeding each output axis
    pub source: [usize; 3],
    /// Negate the output axis
    pub invert: [bool; 3],
    /// Counts per 100 µT on each output axis
    pub gain: [f64; 3],
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl AxisMapping {
    /// Device axes are board axes, one count per µT
    pub fn identity() -> Self {
        Self {
            source: [0, 1, 2],
            invert: [false; 3],
            gain: [100.0; 3],
        }
    }

    /// Sources must be a permutation of the three device axes, gains finite and positive
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let mut seen = [false; 3];
        for &axis in &self.source {
            if axis > 2 || seen[axis] {
                return Err(CalibrationError::InvalidSetting("source"));
            }
            seen[axis] = true;
        }
        if self.gain.iter().any(|g| !(g.is_finite() && *g > 0.0)) {
            return Err(CalibrationError::InvalidSetting("gain"));
        }
        Ok(())
    }

    /// Convert one raw device reading to board-frame micro-Tesla
    pub fn convert(&self, counts: [i32; 3]) -> Vector3<f64> {
        Vector3::from_fn(|i, _| {
            let value = counts[self.source[i]] as f64 * 100.0 / self.gain[i];
            if self.invert[i] { -value } else { value }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mapping() {
        let mapping = AxisMapping::default();
        assert!(mapping.validate().is_ok());
        assert_eq!(mapping.convert([12, -7, 300]), Vector3::new(12.0, -7.0, 300.0));
    }

    #[test]
    fn test_gain_conversion() {
        let mapping = AxisMapping {
            gain: [200.0, 50.0, 100.0],
            ..Default::default()
        };
        assert_eq!(mapping.convert([80, 80, 80]), Vector3::new(40.0, 160.0, 80.0));
    }

    #[test]
    fn test_remap_preserves_magnitude() {
        let mapping = AxisMapping {
            source: [2, 0, 1],
            invert: [true, false, true],
            ..Default::default()
        };
        let reading = mapping.convert([1, 2, 3]);
        assert_eq!(reading, Vector3::new(-3.0, 1.0, -2.0));
        assert!((reading.magnitude() - Vector3::<f64>::new(1.0, 2.0, 3.0).magnitude()).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_mapping() {
        let mapping = AxisMapping {
            source: [0, 0, 2],
            ..Default::default()
        };
        assert!(matches!(
            mapping.validate(),
            Err(CalibrationError::InvalidSetting("source"))
        ));

        let mapping = AxisMapping {
            source: [0, 1, 3],
            ..Default::default()
        };
        assert!(mapping.validate().is_err());

        let mapping = AxisMapping {
            gain: [100.0, 0.0, 100.0],
            ..Default::default()
        };
        assert!(matches!(
            mapping.validate(),
            Err(CalibrationError::InvalidSetting("gain"))
        ));
    }
}
