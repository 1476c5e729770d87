//! # Controller Event Decoding
//!
//! Turns raw evdev events from an Xbox controller (xpadneo driver) into the
//! closed [`ControlEvent`] type. Decoding happens once, at the input boundary;
//! everything downstream matches on enum variants instead of integer codes.
//!
//! ## Axis Codes (EV_ABS)
//!
//! | Axis | evdev Code | Range |
//! |------|------------|-------|
//! | Left Stick X | ABS_X (0) | -32767..32767 |
//! | Left Stick Y | ABS_Y (1) | -32767..32767 |
//! | Left Trigger | ABS_Z (2) | 0..1023 |
//! | Right Stick X | ABS_RX (3) | -32767..32767 |
//! | Right Stick Y | ABS_RY (4) | -32767..32767 |
//! | Right Trigger | ABS_RZ (5) | 0..1023 |
//! | D-Pad X | ABS_HAT0X (16) | -1/0/1 |
//! | D-Pad Y | ABS_HAT0Y (17) | -1/0/1 |
//!
//! ## Button Codes (EV_KEY)
//!
//! | Button | evdev Code |
//! |--------|------------|
//! | A | BTN_SOUTH (304) |
//! | B | BTN_EAST (305) |
//! | X | BTN_NORTH (307) |
//! | Y | BTN_WEST (308) |
//! | LB / RB | BTN_TL (310) / BTN_TR (311) |
//! | Back / Start | BTN_SELECT (314) / BTN_START (315) |
//! | LS / RS | BTN_THUMBL (317) / BTN_THUMBR (318) |

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind, Key};
use tracing::debug;

/// Analog stick range.
pub const STICK_MIN: i32 = -32767;
/// Analog stick range.
pub const STICK_MAX: i32 = 32767;

/// Analog trigger range.
pub const TRIGGER_MIN: i32 = 0;
/// Analog trigger range.
pub const TRIGGER_MAX: i32 = 1023;

/// D-Pad range (-1 = left/up, 1 = right/down).
pub const DPAD_MIN: i32 = -1;
/// D-Pad range.
pub const DPAD_MAX: i32 = 1;

/// Key event value the kernel sends for auto-repeat.
const KEY_REPEAT: i32 = 2;

/// Digital buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Start,
    Back,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
}

impl Button {
    /// Recognized buttons by evdev key.
    #[must_use]
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::BTN_SOUTH => Some(Button::A),
            Key::BTN_EAST => Some(Button::B),
            Key::BTN_NORTH => Some(Button::X),
            Key::BTN_WEST => Some(Button::Y),
            Key::BTN_START => Some(Button::Start),
            Key::BTN_SELECT => Some(Button::Back),
            Key::BTN_TL => Some(Button::LeftBumper),
            Key::BTN_TR => Some(Button::RightBumper),
            Key::BTN_THUMBL => Some(Button::LeftStick),
            Key::BTN_THUMBR => Some(Button::RightStick),
            _ => None,
        }
    }
}

/// Absolute axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    DpadX,
    DpadY,
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

impl Axis {
    /// Recognized axes by evdev axis type.
    #[must_use]
    pub fn from_abs(axis: AbsoluteAxisType) -> Option<Self> {
        match axis {
            AbsoluteAxisType::ABS_X => Some(Axis::LeftStickX),
            AbsoluteAxisType::ABS_Y => Some(Axis::LeftStickY),
            AbsoluteAxisType::ABS_Z => Some(Axis::LeftTrigger),
            AbsoluteAxisType::ABS_RX => Some(Axis::RightStickX),
            AbsoluteAxisType::ABS_RY => Some(Axis::RightStickY),
            AbsoluteAxisType::ABS_RZ => Some(Axis::RightTrigger),
            AbsoluteAxisType::ABS_HAT0X => Some(Axis::DpadX),
            AbsoluteAxisType::ABS_HAT0Y => Some(Axis::DpadY),
            _ => None,
        }
    }

    /// Declared value range (inclusive).
    #[must_use]
    pub fn range(self) -> (i32, i32) {
        match self {
            Axis::DpadX | Axis::DpadY => (DPAD_MIN, DPAD_MAX),
            Axis::LeftTrigger | Axis::RightTrigger => (TRIGGER_MIN, TRIGGER_MAX),
            _ => (STICK_MIN, STICK_MAX),
        }
    }
}

/// One decoded controller state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Button edge (`pressed = true` on press, `false` on release).
    Button { button: Button, pressed: bool },
    /// Absolute axis value, clamped to [`Axis::range`].
    Axis { axis: Axis, value: i32 },
}

impl ControlEvent {
    /// Decode a raw evdev event.
    ///
    /// Returns `None` for sync reports, key auto-repeat and codes this
    /// controller layout does not use.
    ///
    /// # Examples
    ///
    /// ```
    /// use evdev::{EventType, InputEvent};
    /// use pi_rc_boat::controller::event::{Axis, ControlEvent};
    ///
    /// let raw = InputEvent::new(EventType::ABSOLUTE, 5, 1023);
    /// assert_eq!(
    ///     ControlEvent::decode(&raw),
    ///     Some(ControlEvent::Axis { axis: Axis::RightTrigger, value: 1023 })
    /// );
    /// ```
    #[must_use]
    pub fn decode(event: &InputEvent) -> Option<Self> {
        match event.kind() {
            InputEventKind::Key(key) => {
                if event.value() == KEY_REPEAT {
                    return None;
                }
                match Button::from_key(key) {
                    Some(button) => Some(ControlEvent::Button {
                        button,
                        pressed: event.value() != 0,
                    }),
                    None => {
                        debug!("Ignoring unknown key code {}", key.code());
                        None
                    }
                }
            }
            InputEventKind::AbsAxis(abs) => match Axis::from_abs(abs) {
                Some(axis) => {
                    let (min, max) = axis.range();
                    Some(ControlEvent::Axis {
                        axis,
                        value: event.value().clamp(min, max),
                    })
                }
                None => {
                    debug!("Ignoring unknown axis code {}", abs.0);
                    None
                }
            },
            // Sync reports, misc scan codes, force feedback status
            _ => None,
        }
    }
}
