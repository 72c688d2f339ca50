// Command dispatch loop: pushes the current wheel setpoints to the motor controllers
//
// Wheels of a robot at rest are sent a zero-current hold instead of a duty
// command so the controllers do not burn power fighting residual torque.

use std::sync::Arc;
use tracing::{info, warn};

use super::SharedState;
use crate::config::MOTOR_NEUTRAL;
use crate::motor::vesc::{CommandMode, MotorCodec, MotorCommand};
use crate::state::{MotorMap, RobotState, WheelPosition};
use crate::transport::Transport;

/// Log every Nth consecutive write failure after the first
const FAILURE_LOG_INTERVAL: u32 = 100;

pub struct CommandDispatcher {
    state: SharedState,
    codec: Arc<dyn MotorCodec>,
    transport: Arc<dyn Transport>,
    motors: MotorMap,
    consecutive_failures: u32,
}

impl CommandDispatcher {
    pub fn new(
        state: SharedState,
        codec: Arc<dyn MotorCodec>,
        transport: Arc<dyn Transport>,
        motors: MotorMap,
    ) -> Self {
        Self {
            state,
            codec,
            transport,
            motors,
            consecutive_failures: 0,
        }
    }

    /// Send one command per wheel, in wheel order
    ///
    /// Write failures are logged and dropped; the next tick simply tries again.
    pub fn tick(&mut self) {
        for pos in WheelPosition::ALL {
            let command = {
                let state = self.state.lock();
                select_command(&state, pos, self.motors.id(pos))
            };
            let message = self.codec.encode(&command);

            match self.transport.write(&message) {
                Ok(()) => {
                    if self.consecutive_failures > 0 {
                        info!(
                            "Motor bus writes recovered after {} failures",
                            self.consecutive_failures
                        );
                        self.consecutive_failures = 0;
                    }
                }
                Err(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    if self.consecutive_failures == 1
                        || self.consecutive_failures % FAILURE_LOG_INTERVAL == 0
                    {
                        warn!(
                            "Failed to send command to motor {} ({} consecutive failures): {}",
                            command.motor_id, self.consecutive_failures, e
                        );
                    }
                }
            }
        }
    }
}

/// Command for one wheel given the current state
///
/// Hold mode only when this wheel's setpoint is neutral and the whole robot is
/// measured at rest.
pub(crate) fn select_command(state: &RobotState, pos: WheelPosition, motor_id: u8) -> MotorCommand {
    let setpoint = state.setpoints[pos];
    if setpoint == MOTOR_NEUTRAL && state.measured.is_at_rest() {
        MotorCommand {
            motor_id,
            mode: CommandMode::Current,
            value: MOTOR_NEUTRAL,
        }
    } else {
        MotorCommand {
            motor_id,
            mode: CommandMode::Duty,
            value: setpoint,
        }
    }
}
