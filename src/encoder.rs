//! Absolute encoder tracking
//!
//! Turns absolute knob samples (0-127) into signed deltas. The knob domain is
//! treated as circular, so a jump from 127 to 0 resolves to a one-step move
//! rather than a full sweep.

use std::collections::HashMap;
use tracing::trace;

/// Size of the absolute sample domain (7-bit controller values)
pub const ENCODER_RANGE: i32 = 128;

/// Per-control history of absolute samples
#[derive(Debug, Clone)]
pub struct EncoderTracker {
    // Scale applied to the wraparound-corrected step
    sensitivity: f64,
    // Last observed absolute value per control id
    history: HashMap<u8, i32>,
}

impl EncoderTracker {
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            history: HashMap::new(),
        }
    }

    /// Resolve an absolute sample into a delta
    ///
    /// The first sample of a control only records a baseline and returns 0.
    /// The sign is inverted relative to the raw device direction, and the
    /// scaled result is truncated toward zero. The sample always becomes the
    /// new baseline, so feeding the same sample twice is not idempotent.
    pub fn resolve(&mut self, control_id: u8, value: u8) -> i32 {
        let current = i32::from(value) % ENCODER_RANGE;

        let Some(previous) = self.history.insert(control_id, current) else {
            trace!("Encoder {} baseline = {}", control_id, current);
            return 0;
        };

        let raw = wrap_step(current - previous);
        let delta = (-f64::from(raw) * self.sensitivity).trunc() as i32;

        trace!(
            "Encoder {}: {} -> {} (raw {}, delta {})",
            control_id, previous, current, raw, delta
        );

        delta
    }

    /// Last absolute value seen for a control
    pub fn last_value(&self, control_id: u8) -> Option<i32> {
        self.history.get(&control_id).copied()
    }

    /// Number of controls observed so far
    pub fn tracked(&self) -> usize {
        self.history.len()
    }

    /// Forget all baselines
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// Shortest-arc correction of a raw step on the circular domain
fn wrap_step(raw: i32) -> i32 {
    let half = ENCODER_RANGE / 2;
    if raw > half {
        raw - ENCODER_RANGE
    } else if raw < -half {
        raw + ENCODER_RANGE
    } else {
        raw
    }
}
