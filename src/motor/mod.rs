// Motor control module for the mecanum base
//
// Provides:
// - Mecanum kinematics and per-wheel speed control (body velocity -> wheel duty)
// - VESC CAN protocol codec

pub mod kinematics;
pub mod vesc;

pub use kinematics::{
    AccelerationLimits, MecanumMotionController, MotionConfig, MotionControl, OperatingMode,
    PidGains, RobotGeometry,
};
pub use vesc::{CommandMode, MotorCodec, MotorCommand, MotorFeedback, VescCodec};
