//! Transport layer between the runtime and the motor controllers
//!
//! A transport message is one CAN frame: the 4-byte big-endian extended id
//! followed by 0-8 data bytes. Transports deliver inbound messages to a
//! handler registered at construction, on their own receive thread.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};

#[cfg(test)]
pub mod mock;
#[cfg(target_os = "linux")]
mod can;
mod slcan;

#[cfg(target_os = "linux")]
pub use can::SocketCanTransport;
pub use slcan::SlcanTransport;

/// Maximum payload of a classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// Largest valid 29-bit extended id
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Callback invoked with every inbound transport message
pub type InboundHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Bidirectional message channel to the motor controllers
pub trait Transport: Send + Sync {
    /// Send one message; failures are reported but never retried here
    fn write(&self, message: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// How the runtime reaches the CAN bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommMode {
    /// Native Linux SocketCAN interface (e.g. `can0`)
    Can,
    /// Serial-line CAN adapter speaking SLCAN (e.g. `/dev/ttyACM0`)
    Slcan,
}

impl FromStr for CommMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "can" | "socketcan" => Ok(CommMode::Can),
            "slcan" | "serial" => Ok(CommMode::Slcan),
            other => Err(Error::UnsupportedCommMode(other.to_string())),
        }
    }
}

impl fmt::Display for CommMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommMode::Can => write!(f, "can"),
            CommMode::Slcan => write!(f, "slcan"),
        }
    }
}

/// Open the transport for `mode` on `device`, delivering inbound frames to `handler`
pub fn connect(
    mode: CommMode,
    device: &str,
    handler: InboundHandler,
) -> Result<Arc<dyn Transport>> {
    match mode {
        #[cfg(target_os = "linux")]
        CommMode::Can => Ok(Arc::new(SocketCanTransport::open(device, handler)?)),
        #[cfg(not(target_os = "linux"))]
        CommMode::Can => Err(Error::UnsupportedCommMode(format!(
            "{} (SocketCAN requires Linux)",
            mode
        ))),
        CommMode::Slcan => Ok(Arc::new(SlcanTransport::open(device, handler)?)),
    }
}

/// Build a transport message from an extended CAN id and payload
pub fn pack_frame(id: u32, data: &[u8]) -> Vec<u8> {
    let len = data.len().min(MAX_FRAME_DATA);
    let mut message = Vec::with_capacity(4 + len);
    message.extend_from_slice(&id.to_be_bytes());
    message.extend_from_slice(&data[..len]);
    message
}

/// Split a transport message into extended id and payload
pub fn unpack_frame(message: &[u8]) -> Result<(u32, &[u8])> {
    if message.len() < 4 || message.len() > 4 + MAX_FRAME_DATA {
        return Err(Error::InvalidFrame(format!(
            "message length {} outside 4..={}",
            message.len(),
            4 + MAX_FRAME_DATA
        )));
    }
    let id = u32::from_be_bytes([message[0], message[1], message[2], message[3]]);
    if id > MAX_EXTENDED_ID {
        return Err(Error::InvalidFrame(format!("id 0x{:X} exceeds 29 bits", id)));
    }
    Ok((id, &message[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comm_mode_parse() {
        assert_eq!("can".parse::<CommMode>().unwrap(), CommMode::Can);
        assert_eq!("SLCAN".parse::<CommMode>().unwrap(), CommMode::Slcan);
        assert!(matches!(
            "rs485".parse::<CommMode>(),
            Err(Error::UnsupportedCommMode(_))
        ));
    }

    #[test]
    fn test_pack_frame_layout() {
        let message = pack_frame(0x0902, &[1, 2, 3]);
        assert_eq!(message, vec![0x00, 0x00, 0x09, 0x02, 1, 2, 3]);

        let (id, data) = unpack_frame(&message).unwrap();
        assert_eq!(id, 0x0902);
        assert_eq!(data, &[1, 2, 3]);
    }

    #[test]
    fn test_pack_frame_truncates_long_payload() {
        let message = pack_frame(1, &[0u8; 12]);
        assert_eq!(message.len(), 4 + MAX_FRAME_DATA);
    }

    #[test]
    fn test_unpack_rejects_bad_messages() {
        assert!(unpack_frame(&[0, 0, 1]).is_err());
        assert!(unpack_frame(&[0u8; 13]).is_err());
        assert!(unpack_frame(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }
}
