//! Scalar helpers that work with and without `std`

use nalgebra::{ComplexField, Vector3};

#[inline]
pub(crate) fn sqrt(x: f64) -> f64 {
    ComplexField::sqrt(x)
}

#[inline]
pub(crate) fn cbrt(x: f64) -> f64 {
    ComplexField::cbrt(x)
}

#[inline]
pub(crate) fn abs(x: f64) -> f64 {
    ComplexField::abs(x)
}

/// Largest absolute per-axis difference between two readings
#[inline]
pub(crate) fn max_axis_difference(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a - b).iter().fold(0.0, |acc, d| acc.max(abs(*d)))
}
