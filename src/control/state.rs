//! Per-side trim and reset state shared by the mapping rules.

/// Boat side. Sides are always processed left first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];
}

/// One value per side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pair<T> {
    pub left: T,
    pub right: T,
}

impl<T> Pair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Mutable state of the control loop.
///
/// | Field | Unit | Bound |
/// |-------|------|-------|
/// | `speed` | percent of commanded travel | `±speed_trim_limit` |
/// | `servo` | degrees added to the start angle | servo angle domain |
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrimState {
    pub speed: Pair<f64>,
    pub servo: Pair<f64>,
    /// Set by the reset button, cleared by throttle and trim input.
    pub reset: bool,
    /// Previous d-pad X value, for edge detection.
    pub last_dpad_x: i32,
}

impl TrimState {
    /// Apply a d-pad X event. Trim only moves on the press edge, never while held.
    ///
    /// Pushing right (`value = 1`) raises the left trim and lowers the right
    /// one. Returns whether the trims changed.
    pub fn dpad_x(&mut self, value: i32, step: f64, limit: f64) -> bool {
        let rising = self.last_dpad_x == 0 && value != 0;
        self.last_dpad_x = value;
        if !rising {
            return false;
        }
        let delta = step * f64::from(value.signum());
        self.speed.left = (self.speed.left + delta).clamp(-limit, limit);
        self.speed.right = (self.speed.right - delta).clamp(-limit, limit);
        true
    }

    /// Add `delta` degrees to a servo trim, keeping `start + trim` in `[min, max]`.
    pub fn nudge_servo(&mut self, side: Side, delta: f64, start: f64, bounds: (f64, f64)) -> f64 {
        let (min, max) = bounds;
        let trim = self.servo.get_mut(side);
        *trim = (*trim + delta).clamp(min - start, max - start);
        *trim
    }

    /// Speed multiplier for one side.
    #[must_use]
    pub fn speed_factor(&self, side: Side) -> f64 {
        1.0 + self.speed.get(side) / 100.0
    }
}
