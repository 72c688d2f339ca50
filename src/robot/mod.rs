//! Runtime controller for the 4-wheel mecanum base
//!
//! `Robot` assembles the transport, codec, motion controller and parameter
//! store, then runs two fixed-delay loops on their own threads:
//! - motion control: commands + telemetry -> wheel setpoints (`control`)
//! - command dispatch: wheel setpoints -> motor controllers (`dispatch`)
//!
//! Inbound telemetry arrives on the transport's receive thread (`telemetry`).
//! All of them share one `RobotState` behind a single mutex, which is never
//! held across a call into the controller, codec or transport.

mod control;
mod dispatch;
mod telemetry;
#[cfg(test)]
mod testing;
mod trim;

pub use control::{MotionLoop, StopReason};
pub use dispatch::CommandDispatcher;
pub use telemetry::TelemetryDemux;
pub use trim::{TRIM_KEY, TrimManager, scales_for};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{
    ERPM_PER_WHEEL_RPM, GEOMETRIC_DECAY, LINEAR_JERK_LIMIT, MAX_WHEEL_SPEED, MOTOR_MAX, MOTOR_MIN,
    RobotConfig,
};
use crate::error::Result;
use crate::motor::kinematics::{
    AccelerationLimits, MecanumMotionController, MotionConfig, MotionControl, OperatingMode,
    RobotGeometry,
};
use crate::motor::vesc::{MotorCodec, VescCodec};
use crate::params::{FileParamStore, ParamStore};
use crate::state::{MotorMap, RobotState, Velocities, monotonic_millis};
use crate::transport::{self, InboundHandler, Transport};

/// Robot state shared between the loops, the receive thread and callers
pub type SharedState = Arc<Mutex<RobotState>>;

/// Motion controller shared between the control loop and the trim manager
pub type SharedController = Arc<Mutex<Box<dyn MotionControl>>>;

pub struct Robot {
    state: SharedState,
    geometry: RobotGeometry,
    transport: Arc<dyn Transport>,
    trim: Mutex<TrimManager>,
    stop: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
}

impl Robot {
    /// Build a robot with the VESC codec, mecanum controller, file parameter
    /// store and the transport selected by `config.comm_mode`
    pub fn new(config: RobotConfig) -> Result<Self> {
        let store = FileParamStore::open(&config.param_path);
        info!("Persistent parameters at {}", store.path().display());
        let controller = MecanumMotionController::new(motion_config(&config));
        let (mode, device) = (config.comm_mode, config.device.clone());

        Self::assemble(
            config,
            Box::new(store),
            Arc::new(VescCodec::new()),
            Box::new(controller),
            move |handler| transport::connect(mode, &device, handler),
        )
    }

    /// Build a robot from explicit collaborators
    ///
    /// `connect` receives the telemetry handler and must return a live
    /// transport; if it fails nothing is started and the error is returned.
    pub fn assemble<F>(
        config: RobotConfig,
        store: Box<dyn ParamStore>,
        codec: Arc<dyn MotorCodec>,
        controller: Box<dyn MotionControl>,
        connect: F,
    ) -> Result<Self>
    where
        F: FnOnce(InboundHandler) -> Result<Arc<dyn Transport>>,
    {
        // Zeroed state: no estop, neutral setpoints, no command yet
        let state: SharedState = Arc::new(Mutex::new(RobotState::default()));
        let motors = MotorMap::default();
        let controller: SharedController = Arc::new(Mutex::new(controller));

        // Trim must be loaded after the controller exists
        let mut trim = TrimManager::new(config.max_trim_correction, store, Arc::clone(&controller));
        trim.load_persistent_params();

        {
            let mut controller = controller.lock();
            controller.set_operating_mode(OperatingMode::IndependentWheel);
            controller.set_acceleration_limits(AccelerationLimits {
                linear: LINEAR_JERK_LIMIT,
                angular: f32::MAX,
            });
        }

        let demux = TelemetryDemux::new(Arc::clone(&state), Arc::clone(&codec), motors);
        let handler: InboundHandler = Arc::new(move |message: &[u8]| demux.handle(message));
        let transport = connect(handler)?;

        let stop = Arc::new(AtomicBool::new(false));
        let mut loops = Vec::with_capacity(2);

        let mut dispatcher = CommandDispatcher::new(
            Arc::clone(&state),
            codec,
            Arc::clone(&transport),
            motors,
        );
        loops.push(spawn_periodic(
            "rover-dispatch",
            config.dispatch_period,
            Arc::clone(&stop),
            move || dispatcher.tick(),
        )?);

        let mut motion = MotionLoop::new(Arc::clone(&state), controller, config.command_timeout);
        let spawned = spawn_periodic(
            "rover-control",
            config.control_period,
            Arc::clone(&stop),
            move || motion.tick(monotonic_millis()),
        );
        match spawned {
            Ok(handle) => loops.push(handle),
            Err(e) => {
                stop.store(true, Ordering::Relaxed);
                for handle in loops {
                    let _ = handle.join();
                }
                return Err(e);
            }
        }

        info!(
            "Robot started: control every {}ms, dispatch every {}ms, {}ms command timeout",
            config.control_period.as_millis(),
            config.dispatch_period.as_millis(),
            config.command_timeout.as_millis()
        );

        Ok(Self {
            state,
            geometry: config.geometry,
            transport,
            trim: Mutex::new(trim),
            stop,
            loops,
        })
    }

    /// Overwrite the commanded velocity and stamp it with the current time
    ///
    /// Non-finite commands are dropped; the previous command and its timestamp
    /// stay in place and age out as usual.
    pub fn set_velocity_command(&self, linear: f32, angular: f32, translational: f32) {
        let cmd = Velocities::new(linear, translational, angular);
        if !cmd.is_finite() {
            warn!(
                "Ignoring non-finite velocity command (linear={}, angular={}, translational={})",
                linear, angular, translational
            );
            return;
        }
        let mut state = self.state.lock();
        state.cmd = cmd;
        state.cmd_ts_ms = Some(monotonic_millis());
    }

    /// Consistent copy of the full robot state
    pub fn request_status(&self) -> RobotState {
        self.state.lock().clone()
    }

    pub fn request_info(&self) -> RobotState {
        self.request_status()
    }

    /// Takes effect on the next motion control tick
    pub fn set_emergency_stop(&self, estop: bool) {
        let mut state = self.state.lock();
        if state.estop != estop {
            info!("Emergency stop {}", if estop { "set" } else { "cleared" });
        }
        state.estop = estop;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Adjust the drivetrain trim by `delta`; see [`TrimManager::adjust_trim`]
    pub fn adjust_trim(&self, delta: f32) -> bool {
        self.trim.lock().adjust_trim(delta)
    }

    pub fn trim(&self) -> f32 {
        self.trim.lock().trimvalue()
    }

    pub fn geometry(&self) -> &RobotGeometry {
        &self.geometry
    }

    /// Stop both loops and wait for them to finish
    pub fn shutdown(&mut self) {
        if self.loops.is_empty() {
            return;
        }
        info!("Stopping robot loops");
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.loops.drain(..) {
            if handle.join().is_err() {
                warn!("A robot loop panicked before shutdown");
            }
        }
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Controller parameters for a robot config
pub fn motion_config(config: &RobotConfig) -> MotionConfig {
    MotionConfig {
        mode: OperatingMode::IndependentWheel,
        geometry: config.geometry,
        pid: config.pid,
        motor_max: MOTOR_MAX,
        motor_min: MOTOR_MIN,
        left_trim: 1.0,
        right_trim: 1.0,
        geometric_decay: GEOMETRIC_DECAY,
        max_wheel_speed: MAX_WHEEL_SPEED,
        erpm_per_wheel_rpm: ERPM_PER_WHEEL_RPM,
        dt: config.control_period.as_secs_f32(),
    }
}

/// Run `tick` on a named thread, sleeping `period` after each tick until `stop` is set
fn spawn_periodic(
    name: &str,
    period: Duration,
    stop: Arc<AtomicBool>,
    mut tick: impl FnMut() + Send + 'static,
) -> Result<JoinHandle<()>> {
    let thread_name = name.to_string();
    let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
        info!("{} loop started ({}ms period)", thread_name, period.as_millis());
        while !stop.load(Ordering::Relaxed) {
            tick();
            thread::sleep(period);
        }
        info!("{} loop stopped", thread_name);
    })?;
    Ok(handle)
}
