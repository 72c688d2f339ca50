// Zenoh bridge between teleop/scripts and the robot
//
// The robot's own loops keep the wheels safe (stale commands stop the base);
// this loop only forwards commands in and publishes state out at LOOP_HZ.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    LOOP_HZ, RobotConfig, TOPIC_CMD_BASE, TOPIC_CMD_ESTOP, TOPIC_CMD_TRIM, TOPIC_HEALTH,
    TOPIC_STATE_BASE,
};
use crate::messages::{BaseCommand, BaseStatus, EstopCommand, RuntimeHealth, TrimCommand};
use crate::robot::Robot;
use crate::state::monotonic_millis;

pub struct Runtime {
    robot: Robot,
    command_timeout_ms: u64,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(robot: Robot, command_timeout: Duration) -> Self {
        Self {
            robot,
            command_timeout_ms: command_timeout.as_millis() as u64,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    fn on_command(&mut self, cmd: BaseCommand) {
        tracing::debug!("Received command: {:?}", &cmd);
        self.robot
            .set_velocity_command(cmd.linear, cmd.angular, cmd.translational);
    }

    fn on_estop(&mut self, cmd: EstopCommand) {
        self.robot.set_emergency_stop(cmd.estop);
    }

    fn on_trim(&mut self, cmd: TrimCommand) {
        if !self.robot.adjust_trim(cmd.delta) {
            warn!(
                "Trim delta {} rejected, trim stays at {}",
                cmd.delta,
                self.robot.trim()
            );
        }
    }

    /// Snapshot the robot and refresh health, logging transitions
    fn status(&mut self) -> BaseStatus {
        let state = self.robot.request_status();
        let connected = self.robot.is_connected();
        let health = RuntimeHealth::evaluate(
            &state,
            connected,
            monotonic_millis(),
            self.command_timeout_ms,
        );
        if health != self.health {
            info!("Health: {:?} -> {:?}", self.health, health);
            self.health = health;
        }
        BaseStatus {
            state,
            trim: self.robot.trim(),
            connected,
        }
    }

    pub fn shutdown(&mut self) {
        self.robot.shutdown();
    }
}

/// Parse a JSON payload, logging and dropping it if malformed
fn parse_payload<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice::<T>(payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse message on {}: {}", topic, e);
            None
        }
    }
}

pub async fn run(config: RobotConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Connecting to motor controllers on {} ({})",
        config.device, config.comm_mode
    );
    let command_timeout = config.command_timeout;
    let robot = Robot::new(config)?;
    let mut runtime = Runtime::new(robot, command_timeout);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_base = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_estop = session.declare_subscriber(TOPIC_CMD_ESTOP).await?;
    let sub_trim = session.declare_subscriber(TOPIC_CMD_TRIM).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_BASE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Bridge started: {}Hz publish rate", LOOP_HZ);
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_BASE, TOPIC_CMD_ESTOP, TOPIC_CMD_TRIM
    );
    info!("Publishing to: {}, {}", TOPIC_STATE_BASE, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                break;
            }
        }

        // 1. Drain all pending requests (non-blocking)
        while let Ok(Some(sample)) = sub_estop.try_recv() {
            if let Some(cmd) = parse_payload(TOPIC_CMD_ESTOP, &sample.payload().to_bytes()) {
                runtime.on_estop(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_trim.try_recv() {
            if let Some(cmd) = parse_payload(TOPIC_CMD_TRIM, &sample.payload().to_bytes()) {
                runtime.on_trim(cmd);
            }
        }
        while let Ok(Some(sample)) = sub_base.try_recv() {
            if let Some(cmd) = parse_payload(TOPIC_CMD_BASE, &sample.payload().to_bytes()) {
                runtime.on_command(cmd);
            }
        }

        // 2. Publish state
        let status = runtime.status();
        let status_json = serde_json::to_string(&status)?;
        pub_state.put(status_json).await?;

        // 3. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }

    runtime.shutdown();
    Ok(())
}
