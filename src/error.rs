//! # Error Types
//!
//! Custom error types for Pi RC Boat using `thiserror`.

use thiserror::Error;

/// Main error type for Pi RC Boat
#[derive(Debug, Error)]
pub enum BoatError {
    /// Invalid channel bounds, pins or mapping values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TOML syntax or type errors
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// No matching input device appeared within the discovery timeout
    #[error("Input device '{name}' not found within {timeout_s}s")]
    DeviceNotFound { name: String, timeout_s: u64 },

    /// evdev errors while opening or reading a controller
    #[error("Controller error: {0}")]
    Controller(String),

    /// PWM driver errors
    #[error("Hardware write error: {0}")]
    Hardware(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Pi RC Boat
pub type Result<T> = std::result::Result<T, BoatError>;
