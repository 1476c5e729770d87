//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional. A missing file section falls back
//! to the built-in defaults, which match `config/default.toml`. When an
//! actuator section is present, its `pin` must be given explicitly.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{BoatError, Result};
use crate::pwm::hardware_channel;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default = "default_servo_left")]
    pub servo_left: ServoConfig,

    #[serde(default = "default_servo_right")]
    pub servo_right: ServoConfig,

    #[serde(default = "default_thruster_left")]
    pub thruster_left: ThrusterConfig,

    #[serde(default = "default_thruster_right")]
    pub thruster_right: ThrusterConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controller discovery and input conditioning
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ControllerConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Explicit `/dev/input/eventX` path; empty means discover by name.
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_discovery_timeout_s")]
    pub discovery_timeout_s: u64,

    #[serde(default = "default_discovery_poll_s")]
    pub discovery_poll_s: u64,

    #[serde(default = "default_trigger_deadzone")]
    pub trigger_deadzone: f64,

    #[serde(default = "default_stick_deadzone")]
    pub stick_deadzone: f64,
}

/// Trim servo channel
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServoConfig {
    pub pin: u8,

    #[serde(default = "default_deg_min")]
    pub deg_min: f64,

    #[serde(default = "default_deg_max")]
    pub deg_max: f64,

    #[serde(default = "default_deg_start")]
    pub deg_start: f64,

    /// Mechanical calibration offset applied on top of every command.
    #[serde(default)]
    pub deg_trim: f64,

    #[serde(default)]
    pub reverse: bool,

    #[serde(default = "default_servo_pw_min")]
    pub pw_min: u32,

    #[serde(default = "default_servo_pw_max")]
    pub pw_max: u32,

    #[serde(default = "default_pw_freq")]
    pub pw_freq: u32,
}

/// Thruster (ESC) channel
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ThrusterConfig {
    pub pin: u8,

    #[serde(default = "default_esc_pw_min")]
    pub pw_min: u32,

    #[serde(default = "default_esc_pw_max")]
    pub pw_max: u32,

    #[serde(default = "default_esc_pw_stop")]
    pub pw_stop: u32,

    #[serde(default = "default_pw_freq")]
    pub pw_freq: u32,
}

/// Controller-to-actuator mapping parameters
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MappingConfig {
    /// Share of the stop-to-endpoint travel reached at full trigger.
    #[serde(default = "default_travel_fraction")]
    pub travel_fraction: f64,

    /// Share of reverse travel the inner thruster runs while pivoting.
    #[serde(default = "default_turn_reverse_fraction")]
    pub turn_reverse_fraction: f64,

    /// Share of forward travel the outer thruster runs while pivoting.
    #[serde(default = "default_turn_forward_fraction")]
    pub turn_forward_fraction: f64,

    /// Speed trim change per d-pad press, in percent.
    #[serde(default = "default_speed_trim_step")]
    pub speed_trim_step: f64,

    /// Speed trim bound, in percent.
    #[serde(default = "default_speed_trim_limit")]
    pub speed_trim_limit: f64,

    /// Servo trim change per full-deflection stick event, in degrees.
    #[serde(default = "default_servo_trim_rate")]
    pub servo_trim_rate: f64,

    #[serde(default = "default_safe_acceleration")]
    pub safe_acceleration: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, written in addition to the console.
    #[serde(default)]
    pub file: String,
}

// Default value functions
fn default_device_name() -> String { "Xbox Wireless Controller".to_string() }
fn default_discovery_timeout_s() -> u64 { 120 }
fn default_discovery_poll_s() -> u64 { 5 }
fn default_trigger_deadzone() -> f64 { 0.05 }
fn default_stick_deadzone() -> f64 { 0.10 }

fn default_deg_min() -> f64 { 0.0 }
fn default_deg_max() -> f64 { 180.0 }
fn default_deg_start() -> f64 { 90.0 }
fn default_servo_pw_min() -> u32 { 500 }
fn default_servo_pw_max() -> u32 { 2400 }
fn default_pw_freq() -> u32 { 50 }

fn default_esc_pw_min() -> u32 { 1000 }
fn default_esc_pw_max() -> u32 { 2000 }
fn default_esc_pw_stop() -> u32 { 1500 }

fn default_travel_fraction() -> f64 { 1.0 }
fn default_turn_reverse_fraction() -> f64 { 0.5 }
fn default_turn_forward_fraction() -> f64 { 0.32 }
fn default_speed_trim_step() -> f64 { 5.0 }
fn default_speed_trim_limit() -> f64 { 50.0 }
fn default_servo_trim_rate() -> f64 { 2.0 }
fn default_safe_acceleration() -> bool { true }

fn default_log_level() -> String { "info".to_string() }

fn default_servo(pin: u8) -> ServoConfig {
    ServoConfig {
        pin,
        deg_min: default_deg_min(),
        deg_max: default_deg_max(),
        deg_start: default_deg_start(),
        deg_trim: 0.0,
        reverse: false,
        pw_min: default_servo_pw_min(),
        pw_max: default_servo_pw_max(),
        pw_freq: default_pw_freq(),
    }
}

fn default_thruster(pin: u8) -> ThrusterConfig {
    ThrusterConfig {
        pin,
        pw_min: default_esc_pw_min(),
        pw_max: default_esc_pw_max(),
        pw_stop: default_esc_pw_stop(),
        pw_freq: default_pw_freq(),
    }
}

fn default_servo_left() -> ServoConfig { default_servo(12) }
fn default_servo_right() -> ServoConfig { default_servo(13) }
fn default_thruster_left() -> ThrusterConfig { default_thruster(5) }
fn default_thruster_right() -> ThrusterConfig { default_thruster(6) }

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn invalid(msg: impl Into<String>) -> BoatError {
    BoatError::Configuration(msg.into())
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            device_path: String::new(),
            discovery_timeout_s: default_discovery_timeout_s(),
            discovery_poll_s: default_discovery_poll_s(),
            trigger_deadzone: default_trigger_deadzone(),
            stick_deadzone: default_stick_deadzone(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            travel_fraction: default_travel_fraction(),
            turn_reverse_fraction: default_turn_reverse_fraction(),
            turn_forward_fraction: default_turn_forward_fraction(),
            speed_trim_step: default_speed_trim_step(),
            speed_trim_limit: default_speed_trim_limit(),
            servo_trim_rate: default_servo_trim_rate(),
            safe_acceleration: default_safe_acceleration(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            servo_left: default_servo_left(),
            servo_right: default_servo_right(),
            thruster_left: default_thruster_left(),
            thruster_right: default_thruster_right(),
            mapping: MappingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServoConfig {
    /// Checks the angle and pulse-width bounds of one servo channel.
    ///
    /// `name` is only used in the error message.
    pub fn validate(&self, name: &str) -> Result<()> {
        for (field, value) in [
            ("deg_min", self.deg_min),
            ("deg_max", self.deg_max),
            ("deg_start", self.deg_start),
            ("deg_trim", self.deg_trim),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{}: {} must be finite", name, field)));
            }
        }
        if !(self.deg_min < self.deg_max) {
            return Err(invalid(format!(
                "{}: deg_min ({}) must be less than deg_max ({})",
                name, self.deg_min, self.deg_max
            )));
        }
        if self.deg_start < self.deg_min || self.deg_start > self.deg_max {
            return Err(invalid(format!(
                "{}: deg_start ({}) must be within deg_min..deg_max",
                name, self.deg_start
            )));
        }
        validate_pulse_range(name, self.pw_min, self.pw_max, self.pw_freq)
    }
}

impl ThrusterConfig {
    /// Checks `pw_min < pw_max`, `pw_min <= pw_stop <= pw_max` and the frequency.
    pub fn validate(&self, name: &str) -> Result<()> {
        validate_pulse_range(name, self.pw_min, self.pw_max, self.pw_freq)?;
        if self.pw_stop < self.pw_min || self.pw_stop > self.pw_max {
            return Err(invalid(format!(
                "{}: pw_stop ({}) must be within pw_min..pw_max ({}..{})",
                name, self.pw_stop, self.pw_min, self.pw_max
            )));
        }
        Ok(())
    }
}

fn validate_pulse_range(name: &str, pw_min: u32, pw_max: u32, pw_freq: u32) -> Result<()> {
    if pw_min >= pw_max {
        return Err(invalid(format!(
            "{}: pw_min ({}) must be less than pw_max ({})",
            name, pw_min, pw_max
        )));
    }
    if pw_freq == 0 {
        return Err(invalid(format!("{}: pw_freq must be greater than 0", name)));
    }
    // The pulse has to fit into one PWM period.
    if u64::from(pw_max) * u64::from(pw_freq) > 1_000_000 {
        return Err(invalid(format!(
            "{}: pw_max ({}us) does not fit into a {}Hz period",
            name, pw_max, pw_freq
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pi_rc_boat::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        self.servo_left.validate("servo_left")?;
        self.servo_right.validate("servo_right")?;
        self.thruster_left.validate("thruster_left")?;
        self.thruster_right.validate("thruster_right")?;

        // Pins must be distinct, and two hardware pins must not share a PWM channel
        let pins = [
            ("servo_left", self.servo_left.pin),
            ("servo_right", self.servo_right.pin),
            ("thruster_left", self.thruster_left.pin),
            ("thruster_right", self.thruster_right.pin),
        ];
        let mut seen_pins = HashSet::new();
        let mut seen_channels = HashSet::new();
        for (name, pin) in pins {
            if pin > 27 {
                return Err(invalid(format!("{}: GPIO {} does not exist (0-27)", name, pin)));
            }
            if !seen_pins.insert(pin) {
                return Err(invalid(format!("{}: GPIO {} is assigned twice", name, pin)));
            }
            if let Some(channel) = hardware_channel(pin) {
                if !seen_channels.insert(channel) {
                    return Err(invalid(format!(
                        "{}: GPIO {} shares hardware PWM channel {} with another output",
                        name, pin, channel
                    )));
                }
            }
        }

        // Validate controller
        if self.controller.device_path.is_empty() && self.controller.device_name.is_empty() {
            return Err(invalid("controller: device_name cannot be empty without device_path"));
        }
        if self.controller.discovery_poll_s == 0 {
            return Err(invalid("controller: discovery_poll_s must be greater than 0"));
        }
        for (name, value) in [
            ("trigger_deadzone", self.controller.trigger_deadzone),
            ("stick_deadzone", self.controller.stick_deadzone),
        ] {
            if !(0.0..0.5).contains(&value) {
                return Err(invalid(format!("controller: {} must be between 0.0 and 0.5", name)));
            }
        }

        // Validate mapping fractions
        for (name, value) in [
            ("travel_fraction", self.mapping.travel_fraction),
            ("turn_reverse_fraction", self.mapping.turn_reverse_fraction),
            ("turn_forward_fraction", self.mapping.turn_forward_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("mapping: {} must be between 0.0 and 1.0", name)));
            }
        }
        for (name, value) in [
            ("speed_trim_step", self.mapping.speed_trim_step),
            ("speed_trim_limit", self.mapping.speed_trim_limit),
            ("servo_trim_rate", self.mapping.servo_trim_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("mapping: {} must be a non-negative number", name)));
            }
        }

        // Validate log level
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging: level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_pins() {
        let config = create_valid_config();
        assert_eq!(config.servo_left.pin, 12);
        assert_eq!(config.servo_right.pin, 13);
        assert_eq!(config.thruster_left.pin, 5);
        assert_eq!(config.thruster_right.pin, 6);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_shipped_default_file_matches_defaults() {
        let config = Config::parse(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[controller]
device_path = "/dev/input/event3"

[servo_left]
pin = 18
reverse = true

[thruster_right]
pin = 6
pw_stop = 1520

[mapping]
safe_acceleration = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.controller.device_path, "/dev/input/event3");
        assert_eq!(config.servo_left.pin, 18);
        assert!(config.servo_left.reverse);
        assert_eq!(config.servo_left.deg_max, 180.0);
        assert_eq!(config.thruster_right.pw_stop, 1520);
        assert!(!config.mapping.safe_acceleration);
        assert_eq!(config.servo_right, default_servo_right());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/pi-rc-boat.toml");
        assert!(matches!(result, Err(BoatError::Io(_))));
    }

    #[test]
    fn test_section_without_pin_is_rejected() {
        let result = Config::parse("[servo_left]\ndeg_trim = 3.0\n");
        assert!(matches!(result, Err(BoatError::ConfigParse(_))));
    }

    #[test]
    fn test_deg_min_equals_deg_max() {
        let mut config = create_valid_config();
        config.servo_left.deg_min = 90.0;
        config.servo_left.deg_max = 90.0;
        config.servo_left.deg_start = 90.0;
        assert!(matches!(config.validate(), Err(BoatError::Configuration(_))));
    }

    #[test]
    fn test_non_finite_angles_rejected() {
        for doc in [
            "[servo_left]\npin = 12\ndeg_start = nan\n",
            "[servo_left]\npin = 12\ndeg_max = inf\n",
            "[servo_right]\npin = 13\ndeg_min = -inf\n",
            "[servo_right]\npin = 13\ndeg_trim = nan\n",
        ] {
            let result = Config::parse(doc);
            assert!(
                matches!(result, Err(BoatError::Configuration(_))),
                "accepted: {:?}",
                doc
            );
        }
    }

    #[test]
    fn test_deg_start_out_of_range() {
        let mut config = create_valid_config();
        config.servo_right.deg_start = 200.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_servo_pw_min_greater_than_max() {
        let mut config = create_valid_config();
        config.servo_left.pw_min = 2500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pw_stop_below_min() {
        let mut config = create_valid_config();
        config.thruster_left.pw_stop = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pw_stop_above_max() {
        let mut config = create_valid_config();
        config.thruster_right.pw_stop = 2100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pw_stop_on_bound_is_valid() {
        let mut config = create_valid_config();
        config.thruster_right.pw_stop = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_frequency() {
        let mut config = create_valid_config();
        config.thruster_left.pw_freq = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pulse_longer_than_period() {
        let mut config = create_valid_config();
        // 2000us does not fit into a 1kHz (1000us) period
        config.thruster_left.pw_freq = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_pin() {
        let mut config = create_valid_config();
        config.thruster_right.pin = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_hardware_channel() {
        let mut config = create_valid_config();
        // GPIO 12 and 18 are both PWM0
        config.thruster_left.pin = 18;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pin_out_of_range() {
        let mut config = create_valid_config();
        config.thruster_left.pin = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_device_name_without_path() {
        let mut config = create_valid_config();
        config.controller.device_name = String::new();
        assert!(config.validate().is_err());

        config.controller.device_path = "/dev/input/event0".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_discovery_poll_zero() {
        let mut config = create_valid_config();
        config.controller.discovery_poll_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadzone_too_high() {
        let mut config = create_valid_config();
        config.controller.trigger_deadzone = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadzone_negative() {
        let mut config = create_valid_config();
        config.controller.stick_deadzone = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_travel_fraction_too_high() {
        let mut config = create_valid_config();
        config.mapping.travel_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_trim_step() {
        let mut config = create_valid_config();
        config.mapping.speed_trim_step = -5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_trim_rate() {
        let mut config = create_valid_config();
        config.mapping.servo_trim_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_device_name(), "Xbox Wireless Controller");
        assert_eq!(default_discovery_timeout_s(), 120);
        assert_eq!(default_discovery_poll_s(), 5);
        assert_eq!(default_servo_pw_min(), 500);
        assert_eq!(default_servo_pw_max(), 2400);
        assert_eq!(default_esc_pw_min(), 1000);
        assert_eq!(default_esc_pw_max(), 2000);
        assert_eq!(default_esc_pw_stop(), 1500);
        assert_eq!(default_pw_freq(), 50);
        assert_eq!(default_speed_trim_step(), 5.0);
        assert_eq!(default_log_level(), "info");
    }
}
