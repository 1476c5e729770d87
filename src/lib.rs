//! # Pi RC Boat Library
//!
//! Drive a twin-thruster RC boat from an Xbox controller on a Raspberry Pi.
//!
//! This library provides the building blocks: PWM outputs on GPIO pins,
//! servo and ESC actuators on top of them, controller input via evdev, and the
//! control loop that maps one to the other.

pub mod actuator;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod pwm;
pub mod shutdown;
