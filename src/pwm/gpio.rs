//! [`PwmDriver`] implementation for the Raspberry Pi on top of `rppal`.
//!
//! Hardware PWM pins are driven through the PWM peripheral (`/sys/class/pwm`,
//! requires the `pwm-2chan` device tree overlay). All other pins use `rppal`'s
//! software PWM, which runs a timing thread per pin.

use std::collections::HashMap;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::debug;

use super::driver::PwmDriver;
use super::hardware_channel;
use crate::error::{BoatError, Result};

/// Software PWM period (50 Hz, standard RC servo frame).
const SOFTWARE_PWM_PERIOD: Duration = Duration::from_millis(20);

fn hw_err(context: &str, pin: u8, e: impl std::fmt::Display) -> BoatError {
    BoatError::Hardware(format!("{} on GPIO {}: {}", context, pin, e))
}

/// Raspberry Pi GPIO/PWM driver
pub struct RppalDriver {
    gpio: Gpio,
    outputs: HashMap<u8, OutputPin>,
    channels: HashMap<u8, Pwm>,
}

impl std::fmt::Debug for RppalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RppalDriver")
            .field("software_pins", &self.outputs.keys().collect::<Vec<_>>())
            .field("hardware_pins", &self.channels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RppalDriver {
    /// Open the GPIO peripheral.
    ///
    /// # Errors
    ///
    /// Returns `Hardware` if `/dev/gpiomem` cannot be accessed (not a
    /// Raspberry Pi, or missing permissions).
    pub fn new() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| BoatError::Hardware(format!("Failed to open GPIO: {}", e)))?;
        Ok(Self {
            gpio,
            outputs: HashMap::new(),
            channels: HashMap::new(),
        })
    }
}

fn pwm_channel(pin: u8) -> Result<Channel> {
    match hardware_channel(pin) {
        Some(0) => Ok(Channel::Pwm0),
        Some(1) => Ok(Channel::Pwm1),
        _ => Err(BoatError::Hardware(format!("GPIO {} has no hardware PWM channel", pin))),
    }
}

impl PwmDriver for RppalDriver {
    fn set_output_mode(&mut self, pin: u8) -> Result<()> {
        if hardware_channel(pin).is_some() {
            // Pin function is owned by the PWM peripheral
            debug!("GPIO {} reserved for hardware PWM", pin);
            return Ok(());
        }
        let output = self
            .gpio
            .get(pin)
            .map_err(|e| hw_err("Failed to acquire pin", pin, e))?
            .into_output_low();
        self.outputs.insert(pin, output);
        debug!("GPIO {} configured as output", pin);
        Ok(())
    }

    fn write_hardware_pwm(&mut self, pin: u8, freq: u32, duty: u32) -> Result<()> {
        let duty_cycle = f64::from(duty) / 1_000_000.0;
        if let Some(pwm) = self.channels.get(&pin) {
            return pwm
                .set_frequency(f64::from(freq), duty_cycle)
                .map_err(|e| hw_err("Failed to set PWM", pin, e));
        }
        let pwm = Pwm::with_frequency(pwm_channel(pin)?, f64::from(freq), duty_cycle, Polarity::Normal, true)
            .map_err(|e| hw_err("Failed to enable PWM", pin, e))?;
        self.channels.insert(pin, pwm);
        Ok(())
    }

    fn write_software_pwm(&mut self, pin: u8, pulse_width_us: u32) -> Result<()> {
        let output = self
            .outputs
            .get_mut(&pin)
            .ok_or_else(|| BoatError::Hardware(format!("GPIO {} is not configured as output", pin)))?;
        output
            .set_pwm(SOFTWARE_PWM_PERIOD, Duration::from_micros(u64::from(pulse_width_us)))
            .map_err(|e| hw_err("Failed to set software PWM", pin, e))
    }

    fn stop(&mut self, pin: u8) -> Result<()> {
        if let Some(pwm) = self.channels.remove(&pin) {
            pwm.disable().map_err(|e| hw_err("Failed to disable PWM", pin, e))?;
        }
        if let Some(mut output) = self.outputs.remove(&pin) {
            output.clear_pwm().map_err(|e| hw_err("Failed to clear software PWM", pin, e))?;
            output.set_low();
        }
        Ok(())
    }
}
