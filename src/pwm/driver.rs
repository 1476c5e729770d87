//! Trait abstraction for the PWM driver to enable testing

use crate::error::Result;

/// The four operations the GPIO/PWM driver has to offer.
///
/// Pulse widths are in microseconds. Hardware duty cycles are given in
/// millionths of the PWM period (`1_000_000` = always high).
#[cfg_attr(test, mockall::automock)]
pub trait PwmDriver: Send {
    /// Configure `pin` as an output.
    fn set_output_mode(&mut self, pin: u8) -> Result<()>;

    /// Drive a hardware PWM channel at `freq` Hz with the given duty cycle.
    fn write_hardware_pwm(&mut self, pin: u8, freq: u32, duty: u32) -> Result<()>;

    /// Emit a software-timed servo pulse of `pulse_width_us` on `pin`.
    fn write_software_pwm(&mut self, pin: u8, pulse_width_us: u32) -> Result<()>;

    /// Stop any signal on `pin` and give the pin back.
    fn stop(&mut self, pin: u8) -> Result<()>;
}
