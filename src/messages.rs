// Message types exchanged with teleop/scripts over zenoh

use serde::{Deserialize, Serialize};

use crate::state::RobotState;

// Velocity command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    pub linear: f32,  // m/s
    pub angular: f32, // rad/s
    #[serde(default)]
    pub translational: f32, // m/s, positive = left
}

// Emergency stop request: `{"estop": true}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstopCommand {
    pub estop: bool,
}

// Trim adjustment request: `{"delta": 0.01}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimCommand {
    pub delta: f32,
}

/// Robot state published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStatus {
    #[serde(flatten)]
    pub state: RobotState,
    pub trim: f32,
    pub connected: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Estop,
    Disconnected,
}

impl RuntimeHealth {
    /// Most severe condition wins: disconnected, then estop, then stale command
    pub fn evaluate(state: &RobotState, connected: bool, now_ms: u64, timeout_ms: u64) -> Self {
        if !connected {
            RuntimeHealth::Disconnected
        } else if state.estop {
            RuntimeHealth::Estop
        } else if state
            .command_age_ms(now_ms)
            .is_none_or(|age| age > timeout_ms)
        {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }
}
