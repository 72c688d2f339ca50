// Motion control loop: commands + telemetry -> wheel setpoints
//
// This is the only place that decides whether the wheels may be driven. A set
// emergency stop or a command older than the timeout zeroes the target and
// forces every setpoint to neutral; measured velocity is refreshed either way.

use std::time::Duration;
use tracing::{info, warn};

use super::{SharedController, SharedState};
use crate::config::MOTOR_NEUTRAL;
use crate::state::{Velocities, Wheels};

/// Why the loop is currently holding the robot still
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmergencyStop,
    StaleCommand,
}

pub struct MotionLoop {
    state: SharedState,
    controller: SharedController,
    command_timeout_ms: u64,
    stop_reason: Option<StopReason>,
}

impl MotionLoop {
    pub fn new(state: SharedState, controller: SharedController, command_timeout: Duration) -> Self {
        Self {
            state,
            controller,
            command_timeout_ms: command_timeout.as_millis() as u64,
            // The robot starts without a command, so it starts stopped
            stop_reason: Some(StopReason::StaleCommand),
        }
    }

    /// Run one control step as of `now_ms` (monotonic milliseconds)
    pub fn tick(&mut self, now_ms: u64) {
        // 1. Snapshot inputs, lock released before the controller runs
        let (cmd, age_ms, estop, measured) = {
            let state = self.state.lock();
            (
                state.cmd,
                state.command_age_ms(now_ms),
                state.estop,
                state.wheel_speeds(),
            )
        };

        // 2. Safety gate
        let stop_reason = if estop {
            Some(StopReason::EmergencyStop)
        } else if age_ms.is_none_or(|age| age > self.command_timeout_ms) {
            Some(StopReason::StaleCommand)
        } else {
            None
        };
        self.log_transition(stop_reason, age_ms);

        let target = if stop_reason.is_some() {
            Velocities::zero()
        } else {
            cmd
        };

        // 3. Controller: setpoints and velocity estimate from the same wheel speeds
        let (setpoints, velocities) = {
            let mut controller = self.controller.lock();
            let setpoints = controller.compute_wheel_setpoints(target, Wheels::splat(0.0), measured);
            (setpoints, controller.estimate_velocities(measured))
        };
        let setpoints = if stop_reason.is_some() {
            Wheels::splat(MOTOR_NEUTRAL)
        } else {
            setpoints
        };

        // 4. Publish results
        let mut state = self.state.lock();
        state.setpoints = setpoints;
        state.measured = velocities;
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    fn log_transition(&mut self, reason: Option<StopReason>, age_ms: Option<u64>) {
        if reason == self.stop_reason {
            return;
        }
        match reason {
            Some(StopReason::EmergencyStop) => warn!("Emergency stop engaged, stopping robot"),
            Some(StopReason::StaleCommand) => match age_ms {
                Some(age) => warn!("Command stale ({}ms old), stopping robot", age),
                None => warn!("No command received, stopping robot"),
            },
            None => info!("Fresh command received, driving"),
        }
        self.stop_reason = reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::testing::{ControllerLog, ScriptedController, shared_controller, shared_state};
    use crate::state::{WheelPosition, WheelTelemetry};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(1000);

    fn control_loop() -> (MotionLoop, SharedState, Arc<Mutex<ControllerLog>>) {
        let state = shared_state();
        let (controller, log) = ScriptedController::new(0.5);
        let motion = MotionLoop::new(Arc::clone(&state), shared_controller(controller), TIMEOUT);
        (motion, state, log)
    }

    fn command(state: &SharedState, cmd: Velocities, ts_ms: u64) {
        let mut state = state.lock();
        state.cmd = cmd;
        state.cmd_ts_ms = Some(ts_ms);
    }

    #[test]
    fn test_fresh_command_drives_wheels() {
        let (mut motion, state, log) = control_loop();
        command(&state, Velocities::new(1.0, 0.0, 0.0), 10_000);

        motion.tick(10_030);

        assert_eq!(state.lock().setpoints, Wheels::splat(0.5));
        assert_eq!(log.lock().last_target, Some(Velocities::new(1.0, 0.0, 0.0)));
        assert_eq!(motion.stop_reason(), None);
    }

    #[test]
    fn test_command_at_timeout_is_still_fresh() {
        let (mut motion, state, _log) = control_loop();
        command(&state, Velocities::new(1.0, 0.0, 0.0), 10_000);
        motion.tick(11_000);
        assert_eq!(state.lock().setpoints, Wheels::splat(0.5));
    }

    #[test]
    fn test_stale_command_forces_neutral() {
        let (mut motion, state, log) = control_loop();
        command(&state, Velocities::new(1.0, 0.0, 0.0), 10_000);
        motion.tick(10_030);

        // age = 1001 ms > 1000 ms threshold
        motion.tick(11_001);

        assert_eq!(state.lock().setpoints, Wheels::splat(MOTOR_NEUTRAL));
        assert_eq!(log.lock().last_target, Some(Velocities::zero()));
        assert_eq!(motion.stop_reason(), Some(StopReason::StaleCommand));
        // The stored command is left alone
        assert_eq!(state.lock().cmd, Velocities::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_stale_after_1500ms_computes_with_zero_target() {
        let (mut motion, state, log) = control_loop();
        command(&state, Velocities::new(1.0, 0.0, 0.0), 0);
        motion.tick(1_500);
        assert_eq!(log.lock().last_target, Some(Velocities::zero()));
        assert_eq!(state.lock().setpoints, Wheels::splat(MOTOR_NEUTRAL));
    }

    #[test]
    fn test_no_command_yet_is_stale() {
        let (mut motion, state, log) = control_loop();
        {
            // A command value without a timestamp must not drive the robot
            state.lock().cmd = Velocities::new(0.5, 0.5, 0.5);
        }
        motion.tick(50);
        assert_eq!(state.lock().setpoints, Wheels::splat(MOTOR_NEUTRAL));
        assert_eq!(log.lock().last_target, Some(Velocities::zero()));
    }

    #[test]
    fn test_estop_overrides_fresh_command() {
        let (mut motion, state, log) = control_loop();
        command(&state, Velocities::new(0.8, 0.2, 0.1), 5_000);
        state.lock().estop = true;

        motion.tick(5_010);

        assert_eq!(state.lock().setpoints, Wheels::splat(MOTOR_NEUTRAL));
        assert_eq!(log.lock().last_target, Some(Velocities::zero()));
        assert_eq!(motion.stop_reason(), Some(StopReason::EmergencyStop));

        // Clearing the flag resumes on the next tick
        state.lock().estop = false;
        motion.tick(5_040);
        assert_eq!(state.lock().setpoints, Wheels::splat(0.5));
    }

    #[test]
    fn test_measured_velocity_refreshed_while_stopped() {
        let state = shared_state();
        let (mut controller, log) = ScriptedController::new(0.5);
        controller.estimate = Velocities::new(0.1, 0.0, -0.2);
        let mut motion =
            MotionLoop::new(Arc::clone(&state), shared_controller(controller), TIMEOUT);
        {
            let mut state = state.lock();
            state.telemetry[WheelPosition::FrontLeft] = WheelTelemetry {
                motor_id: 1,
                rpm: 250.0,
                current: 0.4,
            };
        }

        motion.tick(0);

        assert_eq!(state.lock().measured, Velocities::new(0.1, 0.0, -0.2));
        assert_eq!(
            log.lock().last_measured,
            Some(Wheels::new(250.0, 0.0, 0.0, 0.0))
        );
    }
}
