//! # Control Module
//!
//! Maps controller events to servo and thruster commands.
//!
//! Every event is handled by one independent rule over the shared
//! [`TrimState`]; there is no driving mode. Rules always command the left
//! side before the right side.
//!
//! ## Mapping
//!
//! | Input | Action |
//! |-------|--------|
//! | A (press) | Thrusters to neutral, servos to calibrated neutral, once until the next input |
//! | X (press / release) | Pivot left / thrusters to neutral |
//! | B (press / release) | Pivot right / thrusters to neutral |
//! | Y (press) | Adopt the current servo pose as neutral |
//! | Right trigger | Forward thrust |
//! | Left trigger | Reverse thrust |
//! | D-Pad X | Speed trim between sides, one step per press |
//! | Left stick Y | Servo trim, applied immediately |
//!
//! ## Shutdown
//!
//! [`ControlLoop::run`] returns when the input ends or the shutdown future
//! completes. In both cases all thrusters are stopped and all servos moved to
//! their start angle before it returns.

pub mod state;

use std::future::Future;

use tracing::{debug, info, trace};

use crate::actuator::{ServoActuator, ThrusterActuator};
use crate::config::{Config, MappingConfig};
use crate::controller::calibration::Deadzone;
use crate::controller::{Axis, Button, ControlEvent, InputSource};
use crate::pwm::driver::PwmDriver;
use crate::pwm::ChannelConfig;

pub use state::{Pair, Side, TrimState};

/// Why [`ControlLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The input source ended (controller disconnected).
    StreamEnded,
    /// The shutdown future completed.
    Shutdown,
}

/// Direction of a throttle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Thrust {
    Forward,
    Reverse,
}

/// Event dispatcher owning all four actuators.
#[derive(Debug)]
pub struct ControlLoop<D: PwmDriver> {
    servos: Pair<ServoActuator<D>>,
    thrusters: Pair<ThrusterActuator<D>>,
    mapping: MappingConfig,
    trigger_deadzone: Deadzone,
    stick_deadzone: Deadzone,
    trim: TrimState,
}

impl<D: PwmDriver> ControlLoop<D> {
    pub fn new(servos: Pair<ServoActuator<D>>, thrusters: Pair<ThrusterActuator<D>>, config: &Config) -> Self {
        Self {
            servos,
            thrusters,
            mapping: config.mapping.clone(),
            trigger_deadzone: Deadzone::new(config.controller.trigger_deadzone),
            stick_deadzone: Deadzone::new(config.controller.stick_deadzone),
            trim: TrimState::default(),
        }
    }

    /// Consume events until the input ends or `shutdown` completes, then park
    /// every actuator.
    ///
    /// Shutdown is checked before each event. A thruster ramp in progress is
    /// finished before shutdown is observed.
    pub async fn run<I, S>(&mut self, input: &mut I, shutdown: S) -> LoopExit
    where
        I: InputSource + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Control loop started");

        let exit = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break LoopExit::Shutdown,
                event = input.next_event() => match event {
                    Some(event) => self.handle(event).await,
                    None => break LoopExit::StreamEnded,
                },
            }
        };

        info!("Control loop stopping ({:?}), parking actuators", exit);
        self.park();
        exit
    }

    /// Apply the mapping rule for one event.
    pub async fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Button { button: Button::A, pressed: true } => self.reset(),
            ControlEvent::Button { button: Button::X, pressed } => self.pivot(Side::Left, pressed).await,
            ControlEvent::Button { button: Button::B, pressed } => self.pivot(Side::Right, pressed).await,
            ControlEvent::Button { button: Button::Y, pressed: true } => self.adopt_servo_pose(),
            ControlEvent::Axis { axis: Axis::RightTrigger, value } => self.throttle(Thrust::Forward, value).await,
            ControlEvent::Axis { axis: Axis::LeftTrigger, value } => self.throttle(Thrust::Reverse, value).await,
            ControlEvent::Axis { axis: Axis::DpadX, value } => self.speed_trim(value),
            ControlEvent::Axis { axis: Axis::LeftStickY, value } => self.servo_trim(value),
            other => trace!("Unmapped event {:?}", other),
        }
    }

    fn reset(&mut self) {
        if self.trim.reset {
            return;
        }
        info!("Reset: thrusters to neutral, servos to calibrated trim");
        for side in Side::ALL {
            self.thrusters.get_mut(side).park();
        }
        self.trim.servo = Pair::default();
        for side in Side::ALL {
            let servo = self.servos.get_mut(side);
            let trim = servo.calibrated_trim();
            servo.reset(trim);
        }
        self.trim.reset = true;
    }

    /// Pivot towards `side`: that side runs in reverse, the other forward.
    async fn pivot(&mut self, toward: Side, pressed: bool) {
        self.trim.reset = false;
        if !pressed {
            debug!("Pivot {:?} released", toward);
            self.stop_thrusters().await;
            return;
        }

        debug!("Pivot {:?}", toward);
        for side in Side::ALL {
            let channel = *self.thrusters.get(side).channel();
            let pulse = if side == toward {
                drive_pulse(&channel, Thrust::Reverse, self.mapping.turn_reverse_fraction)
            } else {
                drive_pulse(&channel, Thrust::Forward, self.mapping.turn_forward_fraction)
            };
            self.thrusters
                .get_mut(side)
                .write(pulse, self.mapping.safe_acceleration)
                .await;
        }
        self.center_servos();
    }

    fn adopt_servo_pose(&mut self) {
        info!("Adopting current servo pose as neutral");
        for side in Side::ALL {
            self.servos.get_mut(side).set_trim_from_current();
        }
        self.trim.servo = Pair::default();
    }

    async fn throttle(&mut self, thrust: Thrust, value: i32) {
        self.trim.reset = false;
        let amount = self.trigger_deadzone.trigger(value);
        if amount == 0.0 {
            self.stop_thrusters().await;
            return;
        }

        for side in Side::ALL {
            let channel = *self.thrusters.get(side).channel();
            let fraction = self.mapping.travel_fraction * amount * self.trim.speed_factor(side);
            let pulse = drive_pulse(&channel, thrust, fraction);
            self.thrusters
                .get_mut(side)
                .write(pulse, self.mapping.safe_acceleration)
                .await;
        }
    }

    fn speed_trim(&mut self, value: i32) {
        self.trim.reset = false;
        if self
            .trim
            .dpad_x(value, self.mapping.speed_trim_step, self.mapping.speed_trim_limit)
        {
            info!(
                "Speed trim: left {:+}%, right {:+}%",
                self.trim.speed.left, self.trim.speed.right
            );
        }
    }

    fn servo_trim(&mut self, value: i32) {
        let amount = self.stick_deadzone.stick(value);
        if amount == 0.0 {
            return;
        }
        self.trim.reset = false;
        let delta = self.mapping.servo_trim_rate * amount;
        for side in Side::ALL {
            let servo = self.servos.get(side);
            let (start, bounds) = (servo.start_angle(), servo.bounds());
            let trim = self.trim.nudge_servo(side, delta, start, bounds);
            self.write_servo(side, start + trim);
        }
    }

    /// Servos to start angle plus the loop's servo trim.
    fn center_servos(&mut self) {
        for side in Side::ALL {
            let start = self.servos.get(side).start_angle();
            let trim = *self.trim.servo.get(side);
            self.write_servo(side, start + trim);
        }
    }

    fn write_servo(&mut self, side: Side, angle: f64) {
        let servo = self.servos.get_mut(side);
        let (min, max) = servo.bounds();
        servo.write(angle.clamp(min, max));
    }

    async fn stop_thrusters(&mut self) {
        for side in Side::ALL {
            let stop = self.thrusters.get(side).channel().pw_stop;
            self.thrusters
                .get_mut(side)
                .write(stop, self.mapping.safe_acceleration)
                .await;
        }
    }

    /// Thrusters to neutral, servos to start angle. The channels stay open.
    pub fn park(&mut self) {
        for side in Side::ALL {
            self.thrusters.get_mut(side).park();
        }
        for side in Side::ALL {
            self.servos.get_mut(side).park();
        }
    }

    /// Park and release all four channels.
    pub fn release(self) {
        let Self { servos, thrusters, .. } = self;
        thrusters.left.release();
        thrusters.right.release();
        servos.left.release();
        servos.right.release();
    }

    pub fn trim(&self) -> &TrimState {
        &self.trim
    }

    pub fn servos(&self) -> &Pair<ServoActuator<D>> {
        &self.servos
    }

    pub fn thrusters(&self) -> &Pair<ThrusterActuator<D>> {
        &self.thrusters
    }
}

/// Pulse for `fraction` of the travel from neutral towards the forward or
/// reverse endpoint, rounded and clamped to the channel bounds.
fn drive_pulse(channel: &ChannelConfig, thrust: Thrust, fraction: f64) -> u32 {
    let stop = f64::from(channel.pw_stop);
    let (min, max) = (f64::from(channel.pw_min), f64::from(channel.pw_max));
    let pulse = match thrust {
        Thrust::Forward => stop + (max - stop) * fraction,
        Thrust::Reverse => stop - (stop - min) * fraction,
    };
    pulse.round().clamp(min, max) as u32
}
