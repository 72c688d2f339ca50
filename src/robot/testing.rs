//! Test doubles shared by the robot module tests

use parking_lot::Mutex;
use std::sync::Arc;

use super::{SharedController, SharedState};
use crate::motor::kinematics::{AccelerationLimits, MotionControl, OperatingMode};
use crate::state::{RobotState, Velocities, Wheels};

/// What the scripted controller saw on its most recent calls
#[derive(Debug, Clone, Default)]
pub struct ControllerLog {
    pub last_target: Option<Velocities>,
    pub last_measured: Option<Wheels<f32>>,
    pub trim: Option<(f32, f32)>,
    pub mode: Option<OperatingMode>,
    pub limits: Option<AccelerationLimits>,
    pub calls: usize,
}

/// Motion controller returning a fixed setpoint for any non-zero target
pub struct ScriptedController {
    pub output: f32,
    pub estimate: Velocities,
    pub log: Arc<Mutex<ControllerLog>>,
}

impl ScriptedController {
    pub fn new(output: f32) -> (Self, Arc<Mutex<ControllerLog>>) {
        let log = Arc::new(Mutex::new(ControllerLog::default()));
        let controller = Self {
            output,
            estimate: Velocities::zero(),
            log: Arc::clone(&log),
        };
        (controller, log)
    }
}

impl MotionControl for ScriptedController {
    fn set_trim(&mut self, left_scale: f32, right_scale: f32) {
        self.log.lock().trim = Some((left_scale, right_scale));
    }

    fn set_acceleration_limits(&mut self, limits: AccelerationLimits) {
        self.log.lock().limits = Some(limits);
    }

    fn set_operating_mode(&mut self, mode: OperatingMode) {
        self.log.lock().mode = Some(mode);
    }

    fn compute_wheel_setpoints(
        &mut self,
        target: Velocities,
        _duty_inputs: Wheels<f32>,
        measured: Wheels<f32>,
    ) -> Wheels<f32> {
        let mut log = self.log.lock();
        log.last_target = Some(target);
        log.last_measured = Some(measured);
        log.calls += 1;
        if target.is_at_rest() {
            Wheels::splat(0.0)
        } else {
            Wheels::splat(self.output)
        }
    }

    fn estimate_velocities(&self, _measured: Wheels<f32>) -> Velocities {
        self.estimate
    }
}

pub fn shared_state() -> SharedState {
    Arc::new(Mutex::new(RobotState::default()))
}

pub fn shared_controller(controller: impl MotionControl + 'static) -> SharedController {
    Arc::new(Mutex::new(Box::new(controller)))
}
