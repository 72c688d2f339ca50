// Mecanum kinematics and wheel speed control for the 4-wheel base
// Converts body-frame velocities (linear, lateral, angular) to per-wheel duty
// cycles, and measured wheel speeds back to body velocities.
//
// Wheel speeds use the same sign for all four wheels: positive = the wheel's
// contact patch moves the robot forward.

use std::f32::consts::PI;

use tracing::{debug, warn};

use crate::state::{Velocities, WheelPosition, Wheels};

/// Physical layout of the base (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotGeometry {
    pub wheel_radius: f32,
    /// Track width, left wheel centre to right wheel centre
    pub wheel_base: f32,
    /// Front axle to back axle
    pub intra_axle_distance: f32,
    /// Centre of mass ahead of the geometric centre
    pub center_of_mass_x_offset: f32,
    /// Centre of mass left of the geometric centre
    pub center_of_mass_y_offset: f32,
}

impl RobotGeometry {
    pub fn new(wheel_radius: f32, wheel_base: f32, intra_axle_distance: f32) -> Self {
        Self {
            wheel_radius,
            wheel_base,
            intra_axle_distance,
            center_of_mass_x_offset: 0.0,
            center_of_mass_y_offset: 0.0,
        }
    }

    /// Rotation lever arm (|x| + |y| from the centre of mass) of each wheel
    fn lever_arms(&self) -> Wheels<f32> {
        let lx = self.intra_axle_distance / 2.0;
        let ly = self.wheel_base / 2.0;
        let (cx, cy) = (self.center_of_mass_x_offset, self.center_of_mass_y_offset);
        Wheels::new(
            (lx - cx) + (ly - cy),
            (lx - cx) + (ly + cy),
            (lx + cx) + (ly - cy),
            (lx + cx) + (ly + cy),
        )
    }

    /// Mean lever arm, used for velocity estimation
    fn mean_lever_arm(&self) -> f32 {
        (self.intra_axle_distance + self.wheel_base) / 2.0
    }
}

/// Closed-loop gains, duty per rad/s of wheel speed error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Feed-forward duty only
    OpenLoop,
    /// Feed-forward plus per-wheel PID on measured speed
    IndependentWheel,
}

/// Acceleration limits applied to the commanded body velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationLimits {
    pub linear: f32,  // m/s^2, applies to linear and lateral
    pub angular: f32, // rad/s^2
}

impl Default for AccelerationLimits {
    fn default() -> Self {
        Self {
            linear: f32::MAX,
            angular: f32::MAX,
        }
    }
}

/// Construction parameters for `MecanumMotionController`
#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    pub mode: OperatingMode,
    pub geometry: RobotGeometry,
    pub pid: PidGains,
    pub motor_max: f32,
    pub motor_min: f32,
    pub left_trim: f32,
    pub right_trim: f32,
    /// Integrator leak per step, in (0, 1]
    pub geometric_decay: f32,
    /// Wheel speed reached at full duty (rad/s)
    pub max_wheel_speed: f32,
    /// Motor electrical RPM per wheel RPM (pole pairs x gear ratio)
    pub erpm_per_wheel_rpm: f32,
    /// Nominal time between `compute_wheel_setpoints` calls (s)
    pub dt: f32,
}

/// Motion logic consumed by the control loop
pub trait MotionControl: Send {
    fn set_trim(&mut self, left_scale: f32, right_scale: f32);

    fn set_acceleration_limits(&mut self, limits: AccelerationLimits);

    fn set_operating_mode(&mut self, mode: OperatingMode);

    /// New duty setpoints for the wheels
    ///
    /// `measured` wheel speeds are in motor ERPM as reported by telemetry.
    fn compute_wheel_setpoints(
        &mut self,
        target: Velocities,
        duty_inputs: Wheels<f32>,
        measured: Wheels<f32>,
    ) -> Wheels<f32>;

    /// Body velocity implied by the measured wheel speeds (ERPM)
    fn estimate_velocities(&self, measured: Wheels<f32>) -> Velocities;
}

/// Per-wheel PID memory
#[derive(Debug, Clone, Copy, Default)]
struct WheelPid {
    integral: f32,
    last_error: f32,
}

pub struct MecanumMotionController {
    config: MotionConfig,
    limits: AccelerationLimits,
    /// Body velocity after acceleration limiting on the previous step
    limited: Velocities,
    pid: Wheels<WheelPid>,
}

impl MecanumMotionController {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            limits: AccelerationLimits::default(),
            limited: Velocities::zero(),
            pid: Wheels::default(),
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.config.mode
    }

    pub fn trim(&self) -> (f32, f32) {
        (self.config.left_trim, self.config.right_trim)
    }

    /// Motor ERPM to wheel rad/s
    pub fn erpm_to_rad_s(&self, erpm: f32) -> f32 {
        erpm / self.config.erpm_per_wheel_rpm * 2.0 * PI / 60.0
    }

    /// Wheel rad/s to motor ERPM
    pub fn rad_s_to_erpm(&self, rad_s: f32) -> f32 {
        rad_s * 60.0 / (2.0 * PI) * self.config.erpm_per_wheel_rpm
    }

    /// Inverse kinematics: body velocity to wheel angular speed (rad/s)
    pub fn body_to_wheel(&self, v: Velocities) -> Wheels<f32> {
        let r = self.config.geometry.wheel_radius;
        let k = self.config.geometry.lever_arms();
        Wheels::new(
            (v.linear - v.lateral - k.front_left * v.angular) / r,
            (v.linear + v.lateral + k.front_right * v.angular) / r,
            (v.linear + v.lateral - k.back_left * v.angular) / r,
            (v.linear - v.lateral + k.back_right * v.angular) / r,
        )
    }

    /// Forward kinematics: wheel angular speed (rad/s) to body velocity
    pub fn wheel_to_body(&self, w: Wheels<f32>) -> Velocities {
        let r = self.config.geometry.wheel_radius;
        let k = self.config.geometry.mean_lever_arm();
        Velocities::new(
            r * (w.front_left + w.front_right + w.back_left + w.back_right) / 4.0,
            r * (-w.front_left + w.front_right + w.back_left - w.back_right) / 4.0,
            r * (-w.front_left + w.front_right - w.back_left + w.back_right) / (4.0 * k),
        )
    }

    /// Move `limited` toward `target` no faster than the acceleration limits allow
    fn limit_acceleration(&mut self, target: Velocities) -> Velocities {
        let dt = self.config.dt;
        let step = |current: f32, target: f32, limit: f32| {
            let max_step = limit * dt;
            current + (target - current).clamp(-max_step, max_step)
        };
        let limited = Velocities::new(
            step(self.limited.linear, target.linear, self.limits.linear),
            step(self.limited.lateral, target.lateral, self.limits.linear),
            step(self.limited.angular, target.angular, self.limits.angular),
        );
        // A non-finite ramp state would never recover
        self.limited = if limited.is_finite() {
            limited
        } else {
            warn!("Non-finite velocity target {:?}, holding at rest", target);
            Velocities::zero()
        };
        self.limited
    }

    /// Forget ramp and integrator state
    fn reset(&mut self) {
        self.limited = Velocities::zero();
        self.pid = Wheels::default();
    }

    fn closed_loop_correction(&mut self, pos: WheelPosition, target: f32, measured: f32) -> f32 {
        let gains = self.config.pid;
        let dt = self.config.dt;
        let pid = &mut self.pid[pos];

        let error = target - measured;
        pid.integral = pid.integral * self.config.geometric_decay + error * dt;
        let derivative = (error - pid.last_error) / dt;
        pid.last_error = error;

        gains.kp * error + gains.ki * pid.integral + gains.kd * derivative
    }
}

impl MotionControl for MecanumMotionController {
    fn set_trim(&mut self, left_scale: f32, right_scale: f32) {
        debug!("Trim scales set: left={}, right={}", left_scale, right_scale);
        self.config.left_trim = left_scale;
        self.config.right_trim = right_scale;
    }

    fn set_acceleration_limits(&mut self, limits: AccelerationLimits) {
        self.limits = limits;
    }

    fn set_operating_mode(&mut self, mode: OperatingMode) {
        if mode != self.config.mode {
            self.pid = Wheels::default();
        }
        self.config.mode = mode;
    }

    fn compute_wheel_setpoints(
        &mut self,
        target: Velocities,
        duty_inputs: Wheels<f32>,
        measured: Wheels<f32>,
    ) -> Wheels<f32> {
        let limited = self.limit_acceleration(target);
        if limited.is_at_rest() {
            // No windup while parked
            self.pid = Wheels::default();
        }

        let wheel_targets = self.body_to_wheel(limited);
        let mut duty = Wheels::splat(0.0);

        for pos in WheelPosition::ALL {
            let feed_forward = wheel_targets[pos] / self.config.max_wheel_speed;
            let correction = match self.config.mode {
                OperatingMode::OpenLoop => 0.0,
                OperatingMode::IndependentWheel if limited.is_at_rest() => 0.0,
                OperatingMode::IndependentWheel => {
                    let measured_rad_s = self.erpm_to_rad_s(measured[pos]);
                    self.closed_loop_correction(pos, wheel_targets[pos], measured_rad_s)
                }
            };
            let trim = if pos.is_left() {
                self.config.left_trim
            } else {
                self.config.right_trim
            };
            duty[pos] = (feed_forward + correction + duty_inputs[pos]) * trim;
        }

        // Finite but huge targets overflow the wheel speeds
        if duty.as_array().iter().any(|d| !d.is_finite()) {
            warn!("Non-finite wheel duty for target {:?}, stopping", limited);
            self.reset();
            return Wheels::splat(0.0);
        }

        // Scale all wheels together if any exceeds the bound, keeping the motion direction
        let bound = self.config.motor_max.abs().min(self.config.motor_min.abs());
        let peak = duty.as_array().iter().fold(0.0f32, |m, d| m.max(d.abs()));
        if peak > bound {
            let scale = bound / peak;
            duty = duty.map(|d| d * scale);
        }

        duty.map(|d| d.clamp(self.config.motor_min, self.config.motor_max))
    }

    fn estimate_velocities(&self, measured: Wheels<f32>) -> Velocities {
        self.wheel_to_body(measured.map(|erpm| self.erpm_to_rad_s(erpm)))
    }
}
