//! Moving-average smoothing of reported compass readings

use log::debug;
use nalgebra::Vector3;

use crate::types::{MAX_SMOOTHING_WINDOW, SmoothingSettings};

/// Moving average over the last `window` readings
///
/// The history is refilled with the current reading when the stream has a
/// gap of at least `valid_time_ms`, or when `jump_limit` consecutive
/// readings each moved more than `jump_threshold` from the previous one,
/// so the output follows a real change of heading quickly.
///
/// Jumps are measured against the previous input reading, not against the
/// oldest reading still in the window.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_calibration::{Smoother, SmoothingSettings};
///
/// let mut smoother = Smoother::new(SmoothingSettings {
///     window: 2,
///     ..Default::default()
/// });
/// assert_eq!(smoother.smooth(Vector3::new(10.0, 0.0, 0.0), 0), Vector3::new(10.0, 0.0, 0.0));
/// assert_eq!(smoother.smooth(Vector3::new(14.0, 0.0, 0.0), 10), Vector3::new(12.0, 0.0, 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct Smoother {
    settings: SmoothingSettings,
    buffer: [Vector3<f64>; MAX_SMOOTHING_WINDOW],
    sum: Vector3<f64>,
    /// Slot holding the oldest reading
    head: usize,
    primed: bool,
    previous: Option<(Vector3<f64>, i64)>,
    jumps: u32,
}

impl Smoother {
    pub fn new(settings: SmoothingSettings) -> Self {
        Self {
            settings,
            buffer: [Vector3::zeros(); MAX_SMOOTHING_WINDOW],
            sum: Vector3::zeros(),
            head: 0,
            primed: false,
            previous: None,
            jumps: 0,
        }
    }

    pub fn settings(&self) -> &SmoothingSettings {
        &self.settings
    }

    pub fn reset(&mut self) {
        self.primed = false;
        self.previous = None;
        self.jumps = 0;
    }

    fn window(&self) -> usize {
        self.settings.window.clamp(1, MAX_SMOOTHING_WINDOW)
    }

    /// Add a reading and return the current average
    pub fn smooth(&mut self, reading: Vector3<f64>, t_ms: i64) -> Vector3<f64> {
        if let Some((previous, previous_t)) = self.previous {
            let gap = t_ms.saturating_sub(previous_t);
            if gap >= self.settings.valid_time_ms {
                debug!("smoothing reset after {} ms gap", gap);
                self.primed = false;
            }

            let threshold = self.settings.jump_threshold;
            if (reading - previous).magnitude_squared() > threshold * threshold {
                self.jumps += 1;
            } else {
                self.jumps = 0;
            }
            if self.jumps >= self.settings.jump_limit {
                debug!("smoothing flushed after {} consecutive jumps", self.jumps);
                self.primed = false;
                self.jumps = 0;
            }
        }
        self.previous = Some((reading, t_ms));

        let window = self.window();
        if !self.primed {
            self.buffer[..window].fill(reading);
            self.sum = reading * window as f64;
            self.head = 0;
            self.primed = true;
            return reading;
        }

        self.sum += reading - self.buffer[self.head];
        self.buffer[self.head] = reading;
        self.head = (self.head + 1) % window;
        self.sum / window as f64
    }
}
