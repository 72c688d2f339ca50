//! Mock transport for testing

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{InboundHandler, Transport};
use crate::error::{Error, Result};

/// Records written messages and lets tests inject inbound ones
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

struct MockTransportInner {
    handler: InboundHandler,
    written: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockTransport {
    pub fn new(handler: InboundHandler) -> Self {
        Self {
            inner: Arc::new(MockTransportInner {
                handler,
                written: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Deliver a message as if it came off the bus
    pub fn inject(&self, message: &[u8]) {
        (self.inner.handler)(message);
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.written.lock().clone()
    }

    pub fn clear_written(&self) {
        self.inner.written.lock().clear();
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Relaxed);
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl Transport for MockTransport {
    fn write(&self, message: &[u8]) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Disconnected);
        }
        self.inner.written.lock().push(message.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }
}
