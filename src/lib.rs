//! Runtime controller for a four-wheel mecanum rover driven by VESC motor
//! controllers over CAN or SLCAN.

pub mod config;
pub mod error;
pub mod messages;
pub mod motor;
pub mod params;
pub mod robot;
pub mod runtime;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
