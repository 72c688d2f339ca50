// Routes decoded motor telemetry into the robot state
//
// Runs on the transport's receive thread, concurrently with both loops.

use std::sync::Arc;
use tracing::trace;

use super::SharedState;
use crate::motor::vesc::MotorCodec;
use crate::state::{MotorMap, WheelTelemetry};

pub struct TelemetryDemux {
    state: SharedState,
    codec: Arc<dyn MotorCodec>,
    motors: MotorMap,
}

impl TelemetryDemux {
    pub fn new(state: SharedState, codec: Arc<dyn MotorCodec>, motors: MotorMap) -> Self {
        Self {
            state,
            codec,
            motors,
        }
    }

    /// Decode one inbound message and store it in the matching wheel slot
    ///
    /// Invalid payloads and controllers not mapped to a wheel are dropped.
    pub fn handle(&self, message: &[u8]) {
        let feedback = self.codec.decode(message);
        if !feedback.valid {
            trace!("Dropping undecodable message ({} bytes)", message.len());
            return;
        }
        let Some(pos) = self.motors.position(feedback.motor_id) else {
            trace!("Ignoring telemetry from unmapped motor {}", feedback.motor_id);
            return;
        };

        let mut state = self.state.lock();
        state.telemetry[pos] = WheelTelemetry {
            motor_id: feedback.motor_id,
            rpm: feedback.rpm,
            current: feedback.current,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::vesc::{CommandMode, MotorCommand, VescCodec, status_message};
    use crate::robot::testing::shared_state;
    use crate::state::{RobotState, WheelPosition};

    fn demux() -> (TelemetryDemux, SharedState) {
        let state = shared_state();
        let demux = TelemetryDemux::new(
            Arc::clone(&state),
            Arc::new(VescCodec::new()),
            MotorMap::default(),
        );
        (demux, state)
    }

    #[test]
    fn test_routes_status_to_matching_wheel() {
        let (demux, state) = demux();
        demux.handle(&status_message(3, 1200, 2.5, 0.1));

        let state = state.lock();
        let slot = state.telemetry[WheelPosition::BackLeft];
        assert_eq!(slot.motor_id, 3);
        assert_eq!(slot.rpm, 1200.0);
        assert_eq!(slot.current, 2.5);
        // Other wheels untouched
        assert_eq!(
            state.telemetry[WheelPosition::FrontLeft],
            WheelTelemetry::default()
        );
    }

    #[test]
    fn test_unknown_motor_leaves_state_unchanged() {
        let (demux, state) = demux();
        demux.handle(&status_message(1, 500, 1.0, 0.0));
        let before = state.lock().clone();

        demux.handle(&status_message(77, 9999, 9.9, 0.9));

        assert_eq!(*state.lock(), before);
    }

    #[test]
    fn test_invalid_payload_is_dropped() {
        let (demux, state) = demux();
        // A duty command echoed back is not a status packet
        let echo = VescCodec.encode(&MotorCommand {
            motor_id: 2,
            mode: CommandMode::Duty,
            value: 0.4,
        });
        demux.handle(&echo);
        demux.handle(&[1, 2]);

        assert_eq!(*state.lock(), RobotState::default());
    }

    #[test]
    fn test_latest_sample_wins() {
        let (demux, state) = demux();
        demux.handle(&status_message(2, 100, 1.0, 0.0));
        demux.handle(&status_message(2, -300, 0.5, 0.0));
        assert_eq!(state.lock().telemetry[WheelPosition::FrontRight].rpm, -300.0);
    }
}
