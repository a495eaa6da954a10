//! Mock device transport for testing and simulation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::request::DeviceRequest;
use super::router::AckRouter;
use super::traits::{DeviceTransport, TransportError};
use crate::protocol::{AckEvent, StatusCode};

/// Scripted reply to the next request carrying a given token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckScript {
    /// Acknowledge with this status.
    Status(StatusCode),
    /// Never acknowledge.
    Silent,
}

/// Mock transport that records requests and answers with acknowledgments.
///
/// Acknowledgments travel through the same encode/decode path a byte
/// transport uses, so the router sees exactly what a device would send.
pub struct MockTransport {
    router: Arc<AckRouter>,
    /// Captured requests.
    requests: Mutex<Vec<DeviceRequest>>,
    /// Per-token scripted replies, consumed in order.
    scripts: Mutex<HashMap<u8, VecDeque<AckScript>>>,
    connected: AtomicBool,
    /// Acknowledge unscripted requests with `OK`.
    auto_ack: AtomicBool,
    reject_writes: AtomicBool,
    /// Drop the connection when the n-th request is transmitted.
    disconnect_after: Mutex<Option<usize>>,
    ack_delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Mock that acknowledges every request with `OK`.
    pub fn new() -> Self {
        Self {
            router: Arc::new(AckRouter::new()),
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            auto_ack: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
            disconnect_after: Mutex::new(None),
            ack_delay: Mutex::new(None),
        }
    }

    /// Mock that only answers scripted requests.
    pub fn silent() -> Self {
        let mock = Self::new();
        mock.set_auto_ack(false);
        mock
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        self.auto_ack.store(enabled, Ordering::SeqCst);
    }

    /// Queue a reply for the next request tagged `token`.
    pub fn script(&self, token: u8, reply: AckScript) {
        self.scripts.lock().entry(token).or_default().push_back(reply);
    }

    /// Deliver acknowledgments after `delay` from a separate thread.
    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        *self.ack_delay.lock() = delay;
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Drop the connection while the n-th request (1-based) is in flight.
    pub fn disconnect_after(&self, transmits: usize) {
        *self.disconnect_after.lock() = Some(transmits);
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.router.notify_disconnected();
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Clear captured requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Inject an acknowledgment as if it had arrived from the device.
    pub fn inject_ack(&self, ack: AckEvent) -> bool {
        self.router.dispatch_bytes(&ack.to_bytes())
    }

    fn deliver(&self, ack: AckEvent) {
        let frame = ack.to_bytes();
        match *self.ack_delay.lock() {
            Some(delay) => {
                let router = Arc::clone(&self.router);
                thread::spawn(move || {
                    thread::sleep(delay);
                    router.dispatch_bytes(&frame);
                });
            }
            None => {
                self.router.dispatch_bytes(&frame);
            }
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockTransport {
    fn transmit(&self, request: &DeviceRequest) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("rejected by mock".into()));
        }

        let count = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        trace!(request = request.name(), count, "Mock transmit");

        if *self.disconnect_after.lock() == Some(count) {
            self.disconnect();
            return Ok(());
        }

        let token = request.ack_token();
        let scripted = self
            .scripts
            .lock()
            .get_mut(&token)
            .and_then(VecDeque::pop_front);
        let reply = match scripted {
            Some(reply) => reply,
            None if self.auto_ack.load(Ordering::SeqCst) => AckScript::Status(StatusCode::OK),
            None => AckScript::Silent,
        };

        if let AckScript::Status(status) = reply {
            self.deliver(AckEvent::new(token, status));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn router(&self) -> &AckRouter {
        &self.router
    }
}
