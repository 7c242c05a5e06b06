//! Sample admission for the calibration strategies
//!
//! Every raw reading passes through [`SampleFilter`] before it may reach a
//! fit model. Rules are applied in order and the first match rejects:
//!
//! 1. **Spike**: the reading arrives within `jump_window_ms` of the previous
//!    one and an axis moved more than `jump_threshold`.
//! 2. **Out of range**: a calibration is in force and the calibrated
//!    magnitude reaches `max_field`. Skipped while bootstrapping, when
//!    uncorrected readings can legitimately be large.
//! 3. **Near duplicate**: every one of the last `lookback` accepted readings
//!    is within `min_difference` on all three axes.

use log::trace;
use nalgebra::Vector3;

use crate::math::max_axis_difference;
use crate::types::{CalibrationTransform, FilterSettings, RawSample};

/// Capacity of the recently-accepted ring
pub const RECENT_CAPACITY: usize = 6;

/// Reason a reading was kept out of calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Spike,
    OutOfRange,
    NearDuplicate,
}

/// Stateful admission filter
///
/// # Example
/// ```
/// use compass_calibration::{FilterSettings, RawSample, SampleFilter};
///
/// let mut filter = SampleFilter::new(FilterSettings::default());
/// assert!(filter.admit(RawSample::new(10.0, 20.0, 30.0, 0), None));
///
/// // 10 ms later with a 40 µT jump on X
/// assert!(!filter.admit(RawSample::new(50.0, 20.0, 30.0, 10), None));
/// ```
#[derive(Debug, Clone)]
pub struct SampleFilter {
    settings: FilterSettings,
    /// Last reading seen, accepted or not
    previous: Option<RawSample>,
    recent: [Vector3<f64>; RECENT_CAPACITY],
    recent_len: usize,
    /// Slot the next accepted reading is written to
    recent_head: usize,
}

impl SampleFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self {
            settings,
            previous: None,
            recent: [Vector3::zeros(); RECENT_CAPACITY],
            recent_len: 0,
            recent_head: 0,
        }
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.previous = None;
        self.recent_len = 0;
        self.recent_head = 0;
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Returns true if the reading may be used for calibration
    ///
    /// An admitted reading is recorded for near-duplicate rejection.
    pub fn admit(&mut self, sample: RawSample, current: Option<&CalibrationTransform>) -> bool {
        if !self.screen(sample, current) {
            return false;
        }
        self.remember(sample.vector());
        true
    }

    /// Like [`admit`](Self::admit), but leaves recording the reading to the
    /// caller through [`remember`](Self::remember)
    pub fn screen(&mut self, sample: RawSample, current: Option<&CalibrationTransform>) -> bool {
        match self.check(sample, current) {
            None => true,
            Some(reason) => {
                trace!(
                    "sample rejected ({:?}): [{:.3}, {:.3}, {:.3}] at {} ms",
                    reason, sample.x, sample.y, sample.z, sample.t_ms
                );
                false
            }
        }
    }

    /// Apply the admission rules, returning the first one that rejects
    ///
    /// The previous-reading history is always updated; the recent ring only
    /// records accepted readings.
    pub fn classify(
        &mut self,
        sample: RawSample,
        current: Option<&CalibrationTransform>,
    ) -> Option<Rejection> {
        let rejection = self.check(sample, current);
        if rejection.is_none() {
            self.remember(sample.vector());
        }
        rejection
    }

    /// Record a reading that was taken for calibration
    pub fn remember(&mut self, reading: Vector3<f64>) {
        self.recent[self.recent_head] = reading;
        self.recent_head = (self.recent_head + 1) % RECENT_CAPACITY;
        self.recent_len = (self.recent_len + 1).min(RECENT_CAPACITY);
    }

    fn check(
        &mut self,
        sample: RawSample,
        current: Option<&CalibrationTransform>,
    ) -> Option<Rejection> {
        let reading = sample.vector();
        let previous = self.previous.replace(sample);

        if let Some(previous) = previous {
            if self.is_spike(&previous, &sample) {
                return Some(Rejection::Spike);
            }
        }

        if let Some(transform) = current {
            if self.is_out_of_range(transform, &reading) {
                return Some(Rejection::OutOfRange);
            }
        }

        if self.is_near_duplicate(&reading) {
            return Some(Rejection::NearDuplicate);
        }
        None
    }

    fn is_spike(&self, previous: &RawSample, sample: &RawSample) -> bool {
        if self.settings.jump_threshold == 0.0 {
            return false;
        }
        sample.t_ms.saturating_sub(previous.t_ms) <= self.settings.jump_window_ms
            && max_axis_difference(&sample.vector(), &previous.vector())
                > self.settings.jump_threshold
    }

    fn is_out_of_range(&self, transform: &CalibrationTransform, reading: &Vector3<f64>) -> bool {
        if self.settings.max_field == 0.0 {
            return false;
        }
        let max_field = self.settings.max_field;
        transform.apply(*reading).magnitude_squared() >= max_field * max_field
    }

    fn is_near_duplicate(&self, reading: &Vector3<f64>) -> bool {
        if self.settings.min_difference == 0.0 {
            return false;
        }
        let lookback = self.settings.lookback.min(self.recent_len);
        if lookback == 0 {
            return false;
        }
        (1..=lookback).all(|age| {
            let slot = (self.recent_head + RECENT_CAPACITY - age) % RECENT_CAPACITY;
            max_axis_difference(reading, &self.recent[slot]) < self.settings.min_difference
        })
    }
}
