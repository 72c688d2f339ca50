// Timing, safety limits, motor configuration and zenoh topics
use std::path::PathBuf;
use std::time::Duration;

use crate::motor::kinematics::{PidGains, RobotGeometry};
use crate::transport::CommMode;

// Motion control loop period (fixed delay between ticks)
pub const CONTROL_PERIOD: Duration = Duration::from_millis(30);

// Command dispatch loop period
pub const DISPATCH_PERIOD: Duration = Duration::from_millis(30);

// Commands older than this are treated as zero velocity
pub const CMD_TIMEOUT: Duration = Duration::from_millis(1000);

// Status/health publish rate of the zenoh bridge
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "rover/cmd/base"; // velocity commands
pub const TOPIC_CMD_ESTOP: &str = "rover/cmd/estop"; // emergency stop flag
pub const TOPIC_CMD_TRIM: &str = "rover/cmd/trim"; // trim deltas
pub const TOPIC_STATE_BASE: &str = "rover/state/base"; // robot state snapshot
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

// Motor controller ids on the CAN bus, in wheel order FL, FR, BL, BR
pub const MOTOR_ID_FRONT_LEFT: u8 = 1;
pub const MOTOR_ID_FRONT_RIGHT: u8 = 2;
pub const MOTOR_ID_BACK_LEFT: u8 = 3;
pub const MOTOR_ID_BACK_RIGHT: u8 = 4;

// Duty-cycle output bounds
pub const MOTOR_NEUTRAL: f32 = 0.0;
pub const MOTOR_MAX: f32 = 0.95;
pub const MOTOR_MIN: f32 = -0.95;

// Largest accepted trim magnitude (exclusive)
pub const MAX_CURVATURE_CORRECTION: f32 = 0.15;

// Linear/lateral acceleration limit in m/s^2
pub const LINEAR_JERK_LIMIT: f32 = 1.5;

// Per-tick leak factor applied to the wheel PID integrators
pub const GEOMETRIC_DECAY: f32 = 0.97;

// Default geometry (meters)
pub const WHEEL_RADIUS: f32 = 0.1015;
pub const WHEEL_BASE: f32 = 0.3;
pub const ROBOT_LENGTH: f32 = 0.32;

// Wheel speed at full duty (rad/s) and motor ERPM per wheel RPM
pub const MAX_WHEEL_SPEED: f32 = 22.0;
pub const ERPM_PER_WHEEL_RPM: f32 = 75.0;

// Default closed-loop gains (duty per rad/s of wheel speed error)
pub const PID_KP: f32 = 0.02;
pub const PID_KI: f32 = 0.05;
pub const PID_KD: f32 = 0.0;

// Persistent parameter file
pub const ROBOT_PARAM_PATH: &str = "/var/lib/rover-runtime/params.json";

// Default CAN interface / serial adapter
pub const DEFAULT_DEVICE: &str = "can0";

/// Everything the orchestrator needs to assemble a robot
#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub device: String,
    pub comm_mode: CommMode,
    pub geometry: RobotGeometry,
    pub pid: PidGains,
    pub param_path: PathBuf,
    pub control_period: Duration,
    pub dispatch_period: Duration,
    pub command_timeout: Duration,
    pub max_trim_correction: f32,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            comm_mode: CommMode::Can,
            geometry: RobotGeometry::new(WHEEL_RADIUS, WHEEL_BASE, ROBOT_LENGTH),
            pid: PidGains {
                kp: PID_KP,
                ki: PID_KI,
                kd: PID_KD,
            },
            param_path: PathBuf::from(ROBOT_PARAM_PATH),
            control_period: CONTROL_PERIOD,
            dispatch_period: DISPATCH_PERIOD,
            command_timeout: CMD_TIMEOUT,
            max_trim_correction: MAX_CURVATURE_CORRECTION,
        }
    }
}
