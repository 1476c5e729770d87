//! # Calibration Module
//!
//! Normalizes raw trigger and stick values and applies a deadzone.
//!
//! A deadzone eliminates small movements near the rest position that would
//! otherwise drive the outputs from sensor noise. Values within the deadzone
//! map to 0.0, values outside are rescaled so full deflection still reaches 1.0.
//!
//! ```
//! use pi_rc_boat::controller::calibration::Deadzone;
//!
//! let dz = Deadzone::new(0.05);
//! assert_eq!(dz.trigger(20), 0.0);    // 2% travel, ignored
//! assert_eq!(dz.trigger(1023), 1.0);  // full travel
//! ```

use super::event::{STICK_MAX, TRIGGER_MAX};

/// Symmetric deadzone around the rest position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadzone {
    /// Fraction of travel (0.0 to 0.5).
    threshold: f64,
}

impl Default for Deadzone {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

impl Deadzone {
    /// Creates a deadzone; out-of-range thresholds are clamped to 0.0..0.5.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 0.5),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Applies the deadzone to a normalized value (-1.0 to 1.0).
    #[must_use]
    pub fn apply(&self, input: f64) -> f64 {
        let magnitude = input.abs().min(1.0);
        if magnitude <= self.threshold {
            0.0
        } else {
            input.signum() * (magnitude - self.threshold) / (1.0 - self.threshold)
        }
    }

    /// Raw trigger (0..1023) to 0.0..1.0 with the deadzone applied.
    #[must_use]
    pub fn trigger(&self, raw: i32) -> f64 {
        self.apply(normalize_trigger(raw))
    }

    /// Raw stick (-32767..32767) to -1.0..1.0 with the deadzone applied.
    #[must_use]
    pub fn stick(&self, raw: i32) -> f64 {
        self.apply(normalize_stick(raw))
    }
}

/// Converts a raw trigger value to 0.0..1.0.
#[must_use]
pub fn normalize_trigger(raw: i32) -> f64 {
    (f64::from(raw) / f64::from(TRIGGER_MAX)).clamp(0.0, 1.0)
}

/// Converts a raw stick value to -1.0..1.0.
#[must_use]
pub fn normalize_stick(raw: i32) -> f64 {
    (f64::from(raw) / f64::from(STICK_MAX)).clamp(-1.0, 1.0)
}
