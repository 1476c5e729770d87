//! # Servo Actuator
//!
//! Angle-commanded RC servo on one PWM channel.
//!
//! A command goes through three steps before it reaches the pin:
//!
//! 1. Direction reversal and trim: `deg_max - angle + trim` when reversed,
//!    `angle + trim` otherwise
//! 2. Clamping to `[deg_min, deg_max]`
//! 3. Linear conversion to a pulse width, truncated to whole microseconds:
//!    `pw_min + (pw_max - pw_min) * (angle - deg_min) / (deg_max - deg_min)`

use tracing::{debug, info, warn};

use crate::config::ServoConfig;
use crate::error::Result;
use crate::pwm::driver::PwmDriver;
use crate::pwm::{ChannelConfig, PulseOutput};

/// RC servo with trim, reversal and travel limits.
///
/// The servo is moved to its start angle on construction and again on
/// [`release`](ServoActuator::release). If it is dropped without being
/// released (early return, panic), the drop handler performs the same teardown.
#[derive(Debug)]
pub struct ServoActuator<D: PwmDriver> {
    output: PulseOutput<D>,
    deg_min: f64,
    deg_max: f64,
    deg_start: f64,
    deg_trim: f64,
    calibrated_trim: f64,
    reverse: bool,
    angle: Option<f64>,
}

impl<D: PwmDriver> ServoActuator<D> {
    /// Open the channel and move the servo to its start angle.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the bounds are invalid (e.g. `deg_min == deg_max`)
    /// - `Hardware` if the pin cannot be claimed
    pub fn new(config: &ServoConfig, driver: D) -> Result<Self> {
        config.validate("servo")?;

        let pw_start = pulse_for(config, config.deg_start);
        let channel = ChannelConfig::new(config.pin, config.pw_min, config.pw_max, pw_start, config.pw_freq);
        let output = PulseOutput::open(channel, driver)?;

        let mut servo = Self {
            output,
            deg_min: config.deg_min,
            deg_max: config.deg_max,
            deg_start: config.deg_start,
            deg_trim: config.deg_trim,
            calibrated_trim: config.deg_trim,
            reverse: config.reverse,
            angle: None,
        };
        servo.write(servo.deg_start);
        info!("Servo on GPIO {} ready at {}°", config.pin, servo.deg_start);
        Ok(servo)
    }

    /// Move to `angle` degrees (before trim and reversal).
    ///
    /// The stored angle is updated to the clamped value even if the hardware
    /// write fails. Returns whether the write reached the driver.
    pub fn write(&mut self, angle: f64) -> bool {
        if angle.is_nan() {
            warn!("Ignoring NaN angle for servo on GPIO {}", self.pin());
            return false;
        }
        let target = if self.reverse {
            self.deg_max - angle + self.deg_trim
        } else {
            angle + self.deg_trim
        };
        let clamped = target.clamp(self.deg_min, self.deg_max);
        let pulse = self.deg_to_pw(clamped);

        let written = self.output.write(pulse);
        self.angle = Some(clamped);
        debug!("Servo GPIO {}: {}° -> {}° ({}us)", self.pin(), angle, clamped, pulse);
        written
    }

    /// Pulse width for an already trimmed and clamped angle.
    #[must_use]
    pub fn deg_to_pw(&self, angle: f64) -> u32 {
        let config = self.output.config();
        linear_pulse(config.pw_min, config.pw_max, self.deg_min, self.deg_max, angle)
    }

    /// Set the trim and return to the start angle.
    pub fn reset(&mut self, trim: f64) -> bool {
        self.deg_trim = trim;
        self.write(self.deg_start)
    }

    /// Adopt the current pose as the new neutral: `trim = angle - start`.
    ///
    /// Does nothing before the first write.
    pub fn set_trim_from_current(&mut self) {
        if let Some(angle) = self.angle {
            self.deg_trim = angle - self.deg_start;
            info!("Servo GPIO {} trim set to {}°", self.pin(), self.deg_trim);
        }
    }

    /// Move back to the start angle.
    pub fn park(&mut self) -> bool {
        self.write(self.deg_start)
    }

    /// Park the servo and release the channel.
    pub fn release(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.output.is_released() {
            return;
        }
        self.park();
        self.output.release();
        info!("Servo on GPIO {} released", self.pin());
    }

    /// Last commanded angle after trim and clamping.
    pub fn angle(&self) -> Option<f64> {
        self.angle
    }

    pub fn trim(&self) -> f64 {
        self.deg_trim
    }

    /// Trim from the configuration file.
    pub fn calibrated_trim(&self) -> f64 {
        self.calibrated_trim
    }

    pub fn start_angle(&self) -> f64 {
        self.deg_start
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.deg_min, self.deg_max)
    }

    pub fn pin(&self) -> u8 {
        self.output.config().pin
    }
}

impl<D: PwmDriver> Drop for ServoActuator<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn pulse_for(config: &ServoConfig, angle: f64) -> u32 {
    linear_pulse(config.pw_min, config.pw_max, config.deg_min, config.deg_max, angle)
}

fn linear_pulse(pw_min: u32, pw_max: u32, deg_min: f64, deg_max: f64, angle: f64) -> u32 {
    let span = f64::from(pw_max) - f64::from(pw_min);
    (f64::from(pw_min) + span * (angle - deg_min) / (deg_max - deg_min)) as u32
}
