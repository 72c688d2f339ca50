//! SocketCAN transport (Linux only)
//!
//! The interface bitrate is configured by the system (`ip link set can0 type can
//! bitrate 500000`), not here.

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{InboundHandler, Transport, pack_frame, unpack_frame};
use crate::error::{Error, Result};

/// Receive timeout; bounds how long the receive thread takes to notice shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SocketCanTransport {
    socket: Arc<CanSocket>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SocketCanTransport {
    /// Open `interface` and start the receive thread
    pub fn open(interface: &str, handler: InboundHandler) -> Result<Self> {
        info!("Opening SocketCAN interface {}", interface);
        let socket = CanSocket::open(interface).map_err(|e| Error::TransportUnavailable {
            device: interface.to_string(),
            reason: e.to_string(),
        })?;
        socket.set_read_timeout(READ_TIMEOUT)?;

        let socket = Arc::new(socket);
        let connected = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        {
            let socket = Arc::clone(&socket);
            let connected = Arc::clone(&connected);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("can-rx".into())
                .spawn(move || receive_loop(&socket, handler, &connected, &stop))?;
        }

        Ok(Self {
            socket,
            connected,
            stop,
        })
    }
}

impl Transport for SocketCanTransport {
    fn write(&self, message: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let (id, data) = unpack_frame(message)?;
        let frame = ExtendedId::new(id)
            .and_then(|id| CanFrame::new(id, data))
            .ok_or_else(|| Error::InvalidFrame(format!("cannot build frame 0x{:X}", id)))?;
        self.socket.write_frame(&frame)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn receive_loop(
    socket: &CanSocket,
    handler: InboundHandler,
    connected: &AtomicBool,
    stop: &AtomicBool,
) {
    debug!("SocketCAN receive thread started");
    while !stop.load(Ordering::Relaxed) {
        match socket.read_frame() {
            Ok(frame) => {
                if !frame.is_extended() {
                    trace!("Ignoring frame 0x{:X}", frame.raw_id());
                    continue;
                }
                handler(&pack_frame(frame.raw_id() & 0x1FFF_FFFF, frame.data()));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("SocketCAN read failed, marking transport disconnected: {}", e);
                connected.store(false, Ordering::Relaxed);
                break;
            }
        }
    }
    debug!("SocketCAN receive thread stopped");
}
