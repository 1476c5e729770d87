//! # PWM Output Module
//!
//! Lowest layer between the actuators and the GPIO header.
//!
//! This module handles:
//! - Classifying a pin as hardware PWM (GPIO 12/13/18/19) or software PWM
//! - Converting a pulse width into the driver call for that pin
//! - Reporting failed writes without retrying them

pub mod driver;
pub mod gpio;

use tracing::{debug, warn};

use crate::error::Result;
use driver::PwmDriver;

/// How a pin produces its PWM signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmKind {
    /// Driven by the PWM peripheral
    Hardware,
    /// Timed in software
    Software,
}

/// Hardware PWM channel of a pin, if it has one.
///
/// GPIO 12 and 18 share channel 0, GPIO 13 and 19 share channel 1. Only one
/// signal per channel can be generated at a time.
pub fn hardware_channel(pin: u8) -> Option<u8> {
    match pin {
        12 | 18 => Some(0),
        13 | 19 => Some(1),
        _ => None,
    }
}

impl PwmKind {
    /// Classifies a BCM GPIO number.
    pub fn for_pin(pin: u8) -> Self {
        if hardware_channel(pin).is_some() {
            PwmKind::Hardware
        } else {
            PwmKind::Software
        }
    }
}

/// Immutable description of one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub pin: u8,
    pub kind: PwmKind,
    pub pw_min: u32,
    pub pw_max: u32,
    /// Neutral pulse width (motor stopped / servo resting).
    pub pw_stop: u32,
    pub pw_freq: u32,
}

impl ChannelConfig {
    #[must_use]
    pub fn new(pin: u8, pw_min: u32, pw_max: u32, pw_stop: u32, pw_freq: u32) -> Self {
        Self {
            pin,
            kind: PwmKind::for_pin(pin),
            pw_min,
            pw_max,
            pw_stop,
            pw_freq,
        }
    }

    /// Duty cycle in millionths of the period for a pulse width.
    ///
    /// ```
    /// use pi_rc_boat::pwm::ChannelConfig;
    ///
    /// let channel = ChannelConfig::new(12, 1000, 2000, 1500, 50);
    /// assert_eq!(channel.duty(1500), 75_000); // 7.5 %
    /// ```
    #[must_use]
    pub fn duty(&self, pulse_us: u32) -> u32 {
        pulse_us.saturating_mul(self.pw_freq)
    }
}

/// One opened output channel.
///
/// The software path ignores `pw_freq`; software pulses always run at 50 Hz.
#[derive(Debug)]
pub struct PulseOutput<D: PwmDriver> {
    config: ChannelConfig,
    driver: D,
    released: bool,
}

impl<D: PwmDriver> PulseOutput<D> {
    /// Configure the pin as an output.
    ///
    /// # Errors
    ///
    /// Returns `Hardware` if the driver cannot claim the pin.
    pub fn open(config: ChannelConfig, mut driver: D) -> Result<Self> {
        driver.set_output_mode(config.pin)?;
        debug!("Opened {:?} PWM output on GPIO {}", config.kind, config.pin);
        Ok(Self {
            config,
            driver,
            released: false,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Issue one write and return the driver's error, if any.
    pub fn try_write(&mut self, pulse_us: u32) -> Result<()> {
        match self.config.kind {
            PwmKind::Hardware => {
                self.driver
                    .write_hardware_pwm(self.config.pin, self.config.pw_freq, self.config.duty(pulse_us))
            }
            PwmKind::Software => self.driver.write_software_pwm(self.config.pin, pulse_us),
        }
    }

    /// Issue one write. A failure is logged and reported as `false`.
    pub fn write(&mut self, pulse_us: u32) -> bool {
        match self.try_write(pulse_us) {
            Ok(()) => {
                debug!("GPIO {} <- {}us", self.config.pin, pulse_us);
                true
            }
            Err(e) => {
                warn!("PWM write of {}us to GPIO {} failed: {}", pulse_us, self.config.pin, e);
                false
            }
        }
    }

    /// Stop the signal and give the pin back. Only the first call reaches the driver.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.driver.stop(self.config.pin) {
            warn!("Failed to stop GPIO {}: {}", self.config.pin, e);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}
