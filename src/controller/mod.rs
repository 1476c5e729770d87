//! # Controller Module
//!
//! Xbox controller input handling.
//!
//! This module handles:
//! - Xbox controller detection and connection via evdev
//! - Decoding raw events into [`ControlEvent`]s
//! - Deadzones for triggers and sticks

pub mod calibration;
pub mod event;
pub mod xbox;

use async_trait::async_trait;

pub use event::{Axis, Button, ControlEvent};

/// Source of controller events, in arrival order.
///
/// The sequence is consumed destructively: after the first `None` every
/// further call returns `None` as well. Sources do not debounce or coalesce;
/// rapid repeated axis events are normal.
#[async_trait]
pub trait InputSource: Send {
    /// Wait for the next event. `None` means the device is gone.
    async fn next_event(&mut self) -> Option<ControlEvent>;
}
