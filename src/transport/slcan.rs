// SLCAN transport: CAN frames tunnelled over a serial adapter
//
// Line protocol (each command terminated by '\r'):
//   C            close channel
//   S6           500 kbit/s
//   O            open channel
//   Tiiiiiiiildd..  extended frame, 8 hex id digits, 1 dlc digit, 2 hex digits per byte

use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{InboundHandler, MAX_FRAME_DATA, Transport, pack_frame, unpack_frame};
use crate::error::{Error, Result};

/// Serial configuration for USB-CAN adapters (the baud rate is ignored by CDC devices)
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Bus bitrate selector for 500 kbit/s
const BITRATE_500K: &str = "S6";

/// Longest line we accept before discarding the buffer
const MAX_LINE: usize = 1 + 8 + 1 + 2 * MAX_FRAME_DATA + 1;

pub struct SlcanTransport {
    device: String,
    writer: Mutex<Box<dyn SerialPort>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SlcanTransport {
    /// Open the adapter on `device`, start the channel and the receive thread
    pub fn open(device: &str, handler: InboundHandler) -> Result<Self> {
        info!("Opening SLCAN adapter on {}", device);
        let mut port = serialport::new(device, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(|e| Error::TransportUnavailable {
                device: device.to_string(),
                reason: e.to_string(),
            })?;

        // Close first in case a previous session left the channel open
        for command in ["C", BITRATE_500K, "O"] {
            port.write_all(command.as_bytes())?;
            port.write_all(b"\r")?;
        }
        port.flush()?;

        let reader = port.try_clone()?;
        let connected = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        {
            let connected = Arc::clone(&connected);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("slcan-rx".into())
                .spawn(move || receive_loop(reader, handler, connected, stop))?;
        }

        Ok(Self {
            device: device.to_string(),
            writer: Mutex::new(port),
            connected,
            stop,
        })
    }
}

impl Transport for SlcanTransport {
    fn write(&self, message: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let line = format_frame(message)?;
        let mut port = self.writer.lock();
        port.write_all(line.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for SlcanTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.writer.lock().write_all(b"C\r") {
            debug!("Failed to close SLCAN channel on {}: {}", self.device, e);
        }
    }
}

fn receive_loop(
    mut port: Box<dyn SerialPort>,
    handler: InboundHandler,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    debug!("SLCAN receive thread started");
    let mut line = Vec::with_capacity(MAX_LINE);
    let mut chunk = [0u8; 64];

    while !stop.load(Ordering::Relaxed) {
        let n = match port.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                continue;
            }
            Err(e) => {
                warn!("SLCAN read failed, marking transport disconnected: {}", e);
                connected.store(false, Ordering::Relaxed);
                break;
            }
        };

        for &byte in &chunk[..n] {
            match byte {
                b'\r' => {
                    if let Some(message) = parse_line(&line) {
                        handler(&message);
                    }
                    line.clear();
                }
                // Adapter NACK
                0x07 => {
                    trace!("SLCAN adapter rejected a command");
                    line.clear();
                }
                _ if line.len() < MAX_LINE => line.push(byte),
                _ => {
                    trace!("Dropping oversized SLCAN line");
                    line.clear();
                }
            }
        }
    }
    debug!("SLCAN receive thread stopped");
}

/// Encode a transport message as an SLCAN extended-frame line
fn format_frame(message: &[u8]) -> Result<String> {
    let (id, data) = unpack_frame(message)?;
    let mut line = format!("T{:08X}{}", id, data.len());
    for byte in data {
        line.push_str(&format!("{:02X}", byte));
    }
    line.push('\r');
    Ok(line)
}

/// Decode one SLCAN line (without the terminator) into a transport message
///
/// Only extended data frames carry motor controller traffic; acknowledgements,
/// standard frames and malformed lines yield `None`.
fn parse_line(line: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(line).ok()?;
    let body = text.strip_prefix('T')?;
    if !body.is_ascii() || body.len() < 9 {
        return None;
    }
    let id = u32::from_str_radix(&body[..8], 16).ok()?;
    let dlc = body[8..9].parse::<usize>().ok()?;
    if dlc > MAX_FRAME_DATA || body.len() < 9 + 2 * dlc {
        return None;
    }
    let data = (0..dlc)
        .map(|i| u8::from_str_radix(&body[9 + 2 * i..11 + 2 * i], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(pack_frame(id, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_frame() {
        let message = pack_frame(0x0000_0001, &[0x00, 0x01, 0x86, 0xA0]);
        assert_eq!(format_frame(&message).unwrap(), "T000000014000186A0\r");
    }

    #[test]
    fn test_format_empty_frame() {
        let message = pack_frame(0x105, &[]);
        assert_eq!(format_frame(&message).unwrap(), "T000001050\r");
    }

    #[test]
    fn test_parse_extended_frame() {
        let message = parse_line(b"T000009038000012C003200064").unwrap();
        assert_eq!(
            message,
            pack_frame(0x0903, &[0x00, 0x00, 0x12, 0xC0, 0x03, 0x20, 0x00, 0x64])
        );
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        assert_eq!(parse_line(b""), None);
        assert_eq!(parse_line(b"z"), None);
        assert_eq!(parse_line(b"t1232AABB"), None);
        // dlc says 2 bytes but only one present
        assert_eq!(parse_line(b"T000009032AA"), None);
        // non-hex payload
        assert_eq!(parse_line(b"T000009031ZZ"), None);
        // dlc above 8
        assert_eq!(parse_line(b"T000009039"), None);
    }

    #[test]
    fn test_format_then_parse_preserves_frame() {
        let message = pack_frame(0x0102, &[0xDE, 0xAD]);
        let line = format_frame(&message).unwrap();
        let parsed = parse_line(line.trim_end_matches('\r').as_bytes()).unwrap();
        assert_eq!(parsed, message);
    }
}
