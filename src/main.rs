use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mecanum_rover_runtime::config::{
    CMD_TIMEOUT, DEFAULT_DEVICE, MAX_CURVATURE_CORRECTION, PID_KD, PID_KI, PID_KP,
    ROBOT_LENGTH, ROBOT_PARAM_PATH, RobotConfig, WHEEL_BASE, WHEEL_RADIUS,
};
use mecanum_rover_runtime::motor::kinematics::{PidGains, RobotGeometry};
use mecanum_rover_runtime::transport::CommMode;

#[derive(Parser, Debug)]
#[command(version, about = "Mecanum rover runtime: zenoh commands in, VESC motor traffic out")]
struct Args {
    /// CAN interface (can mode) or serial port (slcan mode)
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: String,

    /// Motor bus: "can" or "slcan"
    #[arg(long, default_value = "can")]
    comm_mode: CommMode,

    /// Persistent parameter file
    #[arg(long, default_value = ROBOT_PARAM_PATH)]
    params: PathBuf,

    #[arg(long, default_value_t = WHEEL_RADIUS)]
    wheel_radius: f32,

    #[arg(long, default_value_t = WHEEL_BASE)]
    wheel_base: f32,

    #[arg(long, default_value_t = ROBOT_LENGTH)]
    robot_length: f32,

    #[arg(long, default_value_t = PID_KP)]
    kp: f32,

    #[arg(long, default_value_t = PID_KI)]
    ki: f32,

    #[arg(long, default_value_t = PID_KD)]
    kd: f32,

    /// Trim magnitude limit (exclusive)
    #[arg(long, default_value_t = MAX_CURVATURE_CORRECTION)]
    max_trim: f32,

    /// Velocity command timeout in milliseconds
    #[arg(long, default_value_t = CMD_TIMEOUT.as_millis() as u64)]
    cmd_timeout_ms: u64,
}

impl From<Args> for RobotConfig {
    fn from(args: Args) -> Self {
        RobotConfig {
            device: args.device,
            comm_mode: args.comm_mode,
            geometry: RobotGeometry::new(args.wheel_radius, args.wheel_base, args.robot_length),
            pid: PidGains {
                kp: args.kp,
                ki: args.ki,
                kd: args.kd,
            },
            param_path: args.params,
            command_timeout: std::time::Duration::from_millis(args.cmd_timeout_ms),
            max_trim_correction: args.max_trim,
            ..RobotConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let config = RobotConfig::from(Args::parse());
    if let Err(e) = mecanum_rover_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
