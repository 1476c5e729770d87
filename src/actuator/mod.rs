//! # Actuator Module
//!
//! Stateful wrappers around one PWM channel each.
//!
//! This module handles:
//! - Servo angle commands with trim, reversal and travel limits
//! - ESC pulse commands with debouncing, fail-safe neutral and safe ramps
//! - Driving every channel to a safe state before it is released

pub mod servo;
pub mod thruster;

pub use servo::ServoActuator;
pub use thruster::{ProgrammingStep, ThrusterActuator};
