//! # Thruster Actuator
//!
//! Electronic speed controller (ESC) on one PWM channel, commanded directly
//! in pulse-width microseconds.
//!
//! ## Write Policy
//!
//! | Request | Result |
//! |---------|--------|
//! | Same as last written value | Nothing is written |
//! | Outside `[pw_min, pw_max]` or equal to `pw_stop` | `pw_stop` is written |
//! | In range, `safe = false` | Target is written directly |
//! | In range, `safe = true` | Ramp in 10us steps, 10ms apart; a reversal through neutral first holds `pw_stop` for 1s |
//!
//! The ramp blocks the caller for its whole duration, so no other command can
//! reach the channel while the motor reverses.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ThrusterConfig;
use crate::error::{BoatError, Result};
use crate::pwm::driver::PwmDriver;
use crate::pwm::{ChannelConfig, PulseOutput};

/// Hold time at neutral after arming.
pub const ARM_SETTLE: Duration = Duration::from_secs(2);

/// Hold time at neutral before reversing direction.
pub const REVERSE_SETTLE: Duration = Duration::from_secs(1);

/// Largest pulse-width change per ramp step.
pub const RAMP_STEP: u32 = 10;

/// Delay between ramp steps.
pub const RAMP_STEP_DELAY: Duration = Duration::from_millis(10);

/// Accepted range for programming the ESC's full-throttle endpoint.
pub const PROGRAM_PULSE_RANGE: std::ops::RangeInclusive<u32> = 1600..=2500;

/// Operator actions during [`ThrusterActuator::program_endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammingStep {
    /// Battery must be disconnected before the endpoint pulse is applied.
    DisconnectBattery,
    /// Endpoint pulse is applied, battery may be connected.
    ConnectBattery,
    /// Wait for the ESC to confirm the endpoint with a beep.
    AwaitBeep,
}

/// ESC with debounced, fail-safe writes.
///
/// Created through [`arm`](ThrusterActuator::arm), which leaves the motor
/// stopped. Like the servo, the channel is driven to neutral and released on
/// [`release`](ThrusterActuator::release) or on drop.
#[derive(Debug)]
pub struct ThrusterActuator<D: PwmDriver> {
    output: PulseOutput<D>,
    last: Option<u32>,
}

impl<D: PwmDriver> ThrusterActuator<D> {
    /// Open the channel, write neutral and wait [`ARM_SETTLE`].
    ///
    /// # Errors
    ///
    /// - `Configuration` if the pulse bounds are invalid
    /// - `Hardware` if the pin cannot be claimed
    pub async fn arm(config: &ThrusterConfig, driver: D) -> Result<Self> {
        config.validate("thruster")?;

        let channel = ChannelConfig::new(config.pin, config.pw_min, config.pw_max, config.pw_stop, config.pw_freq);
        let output = PulseOutput::open(channel, driver)?;
        let mut thruster = Self { output, last: None };

        if !thruster.put(config.pw_stop) {
            warn!("ESC on GPIO {} did not accept the neutral pulse", config.pin);
        }
        sleep(ARM_SETTLE).await;
        info!("ESC on GPIO {} armed at {}us", config.pin, config.pw_stop);
        Ok(thruster)
    }

    /// Command a pulse width.
    ///
    /// Returns whether every hardware write of this command succeeded. A
    /// skipped (debounced) write counts as success.
    pub async fn write(&mut self, pulse: u32, safe: bool) -> bool {
        if self.last == Some(pulse) {
            return true;
        }

        let channel = *self.output.config();
        if pulse == channel.pw_stop || !(channel.pw_min..=channel.pw_max).contains(&pulse) {
            if pulse != channel.pw_stop {
                debug!(
                    "ESC GPIO {}: {}us outside {}..={}, falling back to neutral",
                    channel.pin, pulse, channel.pw_min, channel.pw_max
                );
            }
            if self.last == Some(channel.pw_stop) {
                return true;
            }
            return self.put(channel.pw_stop);
        }

        if !safe {
            return self.put(pulse);
        }

        let stop = channel.pw_stop;
        let mut from = self.last.unwrap_or(stop);
        let reverses = (from < stop && pulse > stop) || (from > stop && pulse < stop);
        if reverses {
            debug!("ESC GPIO {}: reversing through neutral", channel.pin);
            if !self.put(stop) {
                return false;
            }
            sleep(REVERSE_SETTLE).await;
            from = stop;
        }
        self.ramp(from, pulse).await
    }

    async fn ramp(&mut self, from: u32, to: u32) -> bool {
        let mut current = from;
        while current != to {
            current = if to > current {
                (current + RAMP_STEP).min(to)
            } else {
                current.saturating_sub(RAMP_STEP).max(to)
            };
            if !self.put(current) {
                warn!("ESC GPIO {}: ramp to {}us aborted at {}us", self.pin(), to, current);
                return false;
            }
            if current != to {
                sleep(RAMP_STEP_DELAY).await;
            }
        }
        true
    }

    /// Single write; the stored value only follows successful writes.
    fn put(&mut self, pulse: u32) -> bool {
        let written = self.output.write(pulse);
        if written {
            self.last = Some(pulse);
        }
        written
    }

    /// Write neutral, bypassing the debounce.
    pub fn park(&mut self) -> bool {
        let stop = self.output.config().pw_stop;
        self.put(stop)
    }

    /// Stop the motor and release the channel.
    pub fn release(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.output.is_released() {
            return;
        }
        self.park();
        self.output.release();
        info!("ESC on GPIO {} released", self.pin());
    }

    /// Program the ESC's full-throttle endpoint.
    ///
    /// Writes `max_pulse` while the battery is connected, waits for the ESC to
    /// beep and returns to neutral. `prompt` is called at every step and must
    /// return once the operator has completed it.
    ///
    /// # Errors
    ///
    /// - `Configuration` if `max_pulse` is outside [`PROGRAM_PULSE_RANGE`]
    /// - `Hardware` if a write fails
    pub fn program_endpoint<F>(&mut self, max_pulse: u32, mut prompt: F) -> Result<()>
    where
        F: FnMut(ProgrammingStep),
    {
        if !PROGRAM_PULSE_RANGE.contains(&max_pulse) {
            return Err(BoatError::Configuration(format!(
                "endpoint pulse {}us outside {}..={}",
                max_pulse,
                PROGRAM_PULSE_RANGE.start(),
                PROGRAM_PULSE_RANGE.end()
            )));
        }
        let stop = self.output.config().pw_stop;

        info!("Programming ESC on GPIO {} with endpoint {}us", self.pin(), max_pulse);
        prompt(ProgrammingStep::DisconnectBattery);
        self.output.try_write(max_pulse)?;
        self.last = Some(max_pulse);
        prompt(ProgrammingStep::ConnectBattery);
        prompt(ProgrammingStep::AwaitBeep);
        self.output.try_write(stop)?;
        self.last = Some(stop);
        Ok(())
    }

    /// Last pulse width the driver accepted.
    pub fn last_pulse(&self) -> Option<u32> {
        self.last
    }

    pub fn channel(&self) -> &ChannelConfig {
        self.output.config()
    }

    pub fn pin(&self) -> u8 {
        self.output.config().pin
    }
}

impl<D: PwmDriver> Drop for ThrusterActuator<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::driver::mocks::{DriverCall, RecordingDriver};
    use crate::pwm::driver::MockPwmDriver;
    use tokio::time::Instant;

    fn thruster_config() -> ThrusterConfig {
        ThrusterConfig {
            pin: 5,
            pw_min: 1000,
            pw_max: 2000,
            pw_stop: 1500,
            pw_freq: 50,
        }
    }

    async fn armed() -> (ThrusterActuator<RecordingDriver>, RecordingDriver) {
        let driver = RecordingDriver::new();
        let thruster = ThrusterActuator::arm(&thruster_config(), driver.clone()).await.unwrap();
        driver.clear();
        (thruster, driver)
    }

    fn assert_ramp(pulses: &[u32], rising: bool) {
        for pair in pulses.windows(2) {
            let step = pair[1].abs_diff(pair[0]);
            assert!(step <= RAMP_STEP, "step {:?} larger than {}", pair, RAMP_STEP);
            if rising {
                assert!(pair[1] >= pair[0], "not monotonic: {:?}", pair);
            } else {
                assert!(pair[1] <= pair[0], "not monotonic: {:?}", pair);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_writes_neutral_and_settles() {
        let driver = RecordingDriver::new();
        let start = Instant::now();
        let thruster = ThrusterActuator::arm(&thruster_config(), driver.clone()).await.unwrap();

        assert!(start.elapsed() >= ARM_SETTLE);
        assert_eq!(thruster.last_pulse(), Some(1500));
        assert_eq!(
            driver.calls(),
            vec![DriverCall::SetOutput(5), DriverCall::Software { pin: 5, pulse_us: 1500 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_rejects_invalid_bounds() {
        let mut config = thruster_config();
        config.pw_stop = 2500;
        let result = ThrusterActuator::arm(&config, RecordingDriver::new()).await;
        assert!(matches!(result, Err(BoatError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_write_is_debounced() {
        let mut mock = MockPwmDriver::new();
        mock.expect_set_output_mode().returning(|_| Ok(()));
        mock.expect_write_software_pwm()
            .withf(|_, pulse| *pulse == 1500)
            .returning(|_, _| Ok(()));
        mock.expect_write_software_pwm()
            .withf(|_, pulse| *pulse == 1700)
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_stop().returning(|_| Ok(()));

        let mut thruster = ThrusterActuator::arm(&thruster_config(), mock).await.unwrap();
        assert!(thruster.write(1700, false).await);
        assert!(thruster.write(1700, false).await);
        assert_eq!(thruster.last_pulse(), Some(1700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_write() {
        let (mut thruster, driver) = armed().await;
        assert!(thruster.write(1800, false).await);
        assert_eq!(driver.pulses(), vec![1800]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_falls_back_to_neutral() {
        let (mut thruster, driver) = armed().await;
        for pulse in [0, 999, 2001, 5000, 1500] {
            thruster.write(1700, false).await;
            thruster.write(pulse, false).await;
            assert_eq!(thruster.last_pulse(), Some(1500), "request {}", pulse);
            assert_eq!(driver.last_pulse(), Some(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_fallback_is_debounced() {
        let (mut thruster, driver) = armed().await;
        thruster.write(3000, false).await;
        thruster.write(4000, true).await;
        assert!(driver.pulses().is_empty(), "already neutral after arming");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounds_are_inclusive() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1000, false).await;
        thruster.write(2000, false).await;
        assert_eq!(driver.pulses(), vec![1000, 2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safe_ramp_from_below_neutral_is_monotonic() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1000, false).await;
        driver.clear();

        assert!(thruster.write(2000, true).await);
        let pulses = driver.pulses();
        assert_ramp(&pulses, true);
        assert_eq!(pulses.last(), Some(&2000));
        assert_eq!(thruster.last_pulse(), Some(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversal_writes_neutral_first() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1200, false).await;
        driver.clear();

        let start = Instant::now();
        thruster.write(1800, true).await;

        let pulses = driver.pulses();
        assert_eq!(pulses[0], 1500, "neutral before any ramp step");
        assert_eq!(pulses[1], 1510);
        assert_eq!(pulses.last(), Some(&1800));
        assert_ramp(&pulses, true);
        assert!(start.elapsed() >= REVERSE_SETTLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversal_from_above() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1900, false).await;
        driver.clear();

        thruster.write(1100, true).await;
        let pulses = driver.pulses();
        assert_eq!(pulses[0], 1500);
        assert_ramp(&pulses, false);
        assert_eq!(pulses.last(), Some(&1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safe_ramp_same_side_has_no_settle() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1600, false).await;
        driver.clear();

        let start = Instant::now();
        thruster.write(1645, true).await;
        assert_eq!(driver.pulses(), vec![1610, 1620, 1630, 1640, 1645]);
        assert!(start.elapsed() < REVERSE_SETTLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_duration() {
        let (mut thruster, _) = armed().await;
        let start = Instant::now();
        // 1500 -> 1600 is 10 steps with 9 pauses in between
        thruster.write(1600, true).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= RAMP_STEP_DELAY * 9, "{:?}", elapsed);
        assert!(elapsed < RAMP_STEP_DELAY * 10, "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_previous_value() {
        let (mut thruster, driver) = armed().await;
        driver.set_fail_writes(true);
        assert!(!thruster.write(1700, false).await);
        assert_eq!(thruster.last_pulse(), Some(1500));

        // The same command is retried once the driver recovers
        driver.set_fail_writes(false);
        assert!(thruster.write(1700, false).await);
        assert_eq!(driver.pulses(), vec![1700]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ramp_aborts() {
        let (mut thruster, driver) = armed().await;
        driver.set_fail_writes(true);
        assert!(!thruster.write(1700, true).await);
        assert_eq!(thruster.last_pulse(), Some(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_park_bypasses_debounce() {
        let (mut thruster, driver) = armed().await;
        assert!(thruster.park());
        assert_eq!(driver.pulses(), vec![1500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_writes_neutral_then_stops() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1900, false).await;
        driver.clear();

        thruster.release();
        assert_eq!(
            driver.calls(),
            vec![DriverCall::Software { pin: 5, pulse_us: 1500 }, DriverCall::Stop(5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_motor() {
        let (mut thruster, driver) = armed().await;
        thruster.write(1900, false).await;
        drop(thruster);
        let calls = driver.calls();
        assert_eq!(calls[calls.len() - 2], DriverCall::Software { pin: 5, pulse_us: 1500 });
        assert_eq!(calls[calls.len() - 1], DriverCall::Stop(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_endpoint_sequence() {
        let (mut thruster, driver) = armed().await;
        let mut steps = Vec::new();
        thruster.program_endpoint(2100, |step| steps.push(step)).unwrap();

        assert_eq!(
            steps,
            vec![
                ProgrammingStep::DisconnectBattery,
                ProgrammingStep::ConnectBattery,
                ProgrammingStep::AwaitBeep
            ]
        );
        assert_eq!(driver.pulses(), vec![2100, 1500]);
        assert_eq!(thruster.last_pulse(), Some(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_endpoint_rejects_out_of_range() {
        let (mut thruster, driver) = armed().await;
        for pulse in [1599, 2501] {
            let result = thruster.program_endpoint(pulse, |_| {});
            assert!(matches!(result, Err(BoatError::Configuration(_))));
        }
        assert!(driver.pulses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hardware_pin_uses_duty() {
        let mut config = thruster_config();
        config.pin = 19;
        let driver = RecordingDriver::new();
        let _thruster = ThrusterActuator::arm(&config, driver.clone()).await.unwrap();
        assert_eq!(driver.calls()[1], DriverCall::Hardware { pin: 19, freq: 50, duty: 75_000 });
    }
}
