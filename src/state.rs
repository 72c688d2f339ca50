//! Shared robot state record
//!
//! `RobotState` is the only mutable data that crosses thread boundaries. The
//! orchestrator keeps it behind a single mutex; every loop copies what it needs
//! out, releases the lock, and writes results back in one short section.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use std::sync::OnceLock;
use std::time::Instant;

use crate::config::{
    MOTOR_ID_BACK_LEFT, MOTOR_ID_BACK_RIGHT, MOTOR_ID_FRONT_LEFT, MOTOR_ID_FRONT_RIGHT,
    MOTOR_NEUTRAL,
};

/// Anchor for the monotonic clock, set on first use
static APP_START: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the process first asked for the time
///
/// Unaffected by wall-clock adjustments, so command ages never go negative.
pub fn monotonic_millis() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

/// Logical wheel positions of the mecanum base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelPosition {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl WheelPosition {
    /// Fixed iteration order used for dispatch and telemetry routing
    pub const ALL: [WheelPosition; 4] = [
        WheelPosition::FrontLeft,
        WheelPosition::FrontRight,
        WheelPosition::BackLeft,
        WheelPosition::BackRight,
    ];

    pub fn is_left(self) -> bool {
        matches!(self, WheelPosition::FrontLeft | WheelPosition::BackLeft)
    }
}

/// One value per wheel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wheels<T> {
    pub front_left: T,
    pub front_right: T,
    pub back_left: T,
    pub back_right: T,
}

impl<T: Copy> Wheels<T> {
    pub fn new(front_left: T, front_right: T, back_left: T, back_right: T) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    /// Same value on every wheel
    pub fn splat(value: T) -> Self {
        Self::new(value, value, value, value)
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> Wheels<U> {
        Wheels::new(
            f(self.front_left),
            f(self.front_right),
            f(self.back_left),
            f(self.back_right),
        )
    }

    /// Returns values as array [fl, fr, bl, br]
    pub fn as_array(&self) -> [T; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }
}

impl<T> Index<WheelPosition> for Wheels<T> {
    type Output = T;

    fn index(&self, pos: WheelPosition) -> &T {
        match pos {
            WheelPosition::FrontLeft => &self.front_left,
            WheelPosition::FrontRight => &self.front_right,
            WheelPosition::BackLeft => &self.back_left,
            WheelPosition::BackRight => &self.back_right,
        }
    }
}

impl<T> IndexMut<WheelPosition> for Wheels<T> {
    fn index_mut(&mut self, pos: WheelPosition) -> &mut T {
        match pos {
            WheelPosition::FrontLeft => &mut self.front_left,
            WheelPosition::FrontRight => &mut self.front_right,
            WheelPosition::BackLeft => &mut self.back_left,
            WheelPosition::BackRight => &mut self.back_right,
        }
    }
}

/// Fixed mapping from wheel position to motor controller id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorMap(Wheels<u8>);

impl MotorMap {
    pub fn new(ids: Wheels<u8>) -> Self {
        Self(ids)
    }

    pub fn id(&self, pos: WheelPosition) -> u8 {
        self.0[pos]
    }

    /// Reverse lookup; `None` for controllers that are not wired to a wheel
    pub fn position(&self, motor_id: u8) -> Option<WheelPosition> {
        WheelPosition::ALL
            .into_iter()
            .find(|&pos| self.0[pos] == motor_id)
    }
}

impl Default for MotorMap {
    fn default() -> Self {
        Self(Wheels::new(
            MOTOR_ID_FRONT_LEFT,
            MOTOR_ID_FRONT_RIGHT,
            MOTOR_ID_BACK_LEFT,
            MOTOR_ID_BACK_RIGHT,
        ))
    }
}

/// Body-frame velocity triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocities {
    pub linear: f32,  // m/s, positive = forward
    pub lateral: f32, // m/s, positive = left
    pub angular: f32, // rad/s, positive = counter-clockwise
}

impl Velocities {
    pub fn new(linear: f32, lateral: f32, angular: f32) -> Self {
        Self {
            linear,
            lateral,
            angular,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_at_rest(&self) -> bool {
        self.linear == 0.0 && self.lateral == 0.0 && self.angular == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.lateral.is_finite() && self.angular.is_finite()
    }
}

/// Last telemetry received from one wheel's motor controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelTelemetry {
    pub motor_id: u8,
    pub rpm: f32,     // electrical RPM as reported by the controller
    pub current: f32, // amps
}

/// Commanded and measured motion of the robot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub cmd: Velocities,
    /// When `cmd` was last written (monotonic ms); `None` until the first command
    pub cmd_ts_ms: Option<u64>,
    pub measured: Velocities,
    pub telemetry: Wheels<WheelTelemetry>,
    pub setpoints: Wheels<f32>,
    pub estop: bool,
}

impl RobotState {
    /// Measured wheel speeds in wheel order
    pub fn wheel_speeds(&self) -> Wheels<f32> {
        self.telemetry.map(|t| t.rpm)
    }

    /// Age of the current command, `None` if no command was ever received
    pub fn command_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.cmd_ts_ms.map(|ts| now_ms.saturating_sub(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_neutral() {
        let state = RobotState::default();
        assert!(!state.estop);
        assert_eq!(state.cmd_ts_ms, None);
        assert_eq!(state.setpoints, Wheels::splat(MOTOR_NEUTRAL));
        assert!(state.measured.is_at_rest());
        for pos in WheelPosition::ALL {
            assert_eq!(state.telemetry[pos], WheelTelemetry::default());
        }
    }

    #[test]
    fn test_motor_map_lookup() {
        let map = MotorMap::default();
        assert_eq!(map.id(WheelPosition::FrontLeft), MOTOR_ID_FRONT_LEFT);
        assert_eq!(map.id(WheelPosition::BackRight), MOTOR_ID_BACK_RIGHT);
        assert_eq!(
            map.position(MOTOR_ID_BACK_LEFT),
            Some(WheelPosition::BackLeft)
        );
        assert_eq!(map.position(42), None);
    }

    #[test]
    fn test_wheels_index_matches_fields() {
        let mut wheels = Wheels::new(1, 2, 3, 4);
        assert_eq!(wheels[WheelPosition::FrontRight], 2);
        wheels[WheelPosition::BackLeft] = 30;
        assert_eq!(wheels.as_array(), [1, 2, 30, 4]);
    }

    #[test]
    fn test_command_age() {
        let mut state = RobotState::default();
        assert_eq!(state.command_age_ms(5000), None);
        state.cmd_ts_ms = Some(1000);
        assert_eq!(state.command_age_ms(2001), Some(1001));
        // Clock readings before the timestamp never underflow
        assert_eq!(state.command_age_ms(500), Some(0));
    }

    #[test]
    fn test_velocities_finite() {
        assert!(Velocities::new(0.5, -0.2, 1.0).is_finite());
        assert!(!Velocities::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(!Velocities::new(0.0, 0.0, f32::INFINITY).is_finite());
    }

    #[test]
    fn test_monotonic_millis_never_decreases() {
        let t1 = monotonic_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t2 = monotonic_millis();
        assert!(t2 >= t1);
    }
}
