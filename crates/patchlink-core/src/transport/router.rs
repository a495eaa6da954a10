//! Acknowledgment routing.
//!
//! The transport's receive path decodes acknowledgments and hands them to the
//! router, which completes the armed phase of the command currently executing.
//! The router only holds a weak reference to that command.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::command::CommandState;
use crate::protocol::{AckEvent, StatusCode};

/// Responses handed from the receive path back to the processor thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceResponse {
    /// An acknowledgment that completed the executing command's phase.
    Ack(AckEvent),
    /// The connection was lost.
    Disconnected,
}

#[derive(Default)]
pub struct AckRouter {
    current: Mutex<Option<Weak<CommandState>>>,
    responses: Mutex<Option<Sender<DeviceResponse>>>,
    overlaps: AtomicUsize,
}

impl AckRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the processor's response queue.
    pub fn attach_responses(&self, tx: Sender<DeviceResponse>) {
        *self.responses.lock() = Some(tx);
    }

    pub fn set_current(&self, cmd: &Arc<CommandState>) {
        let mut current = self.current.lock();
        if let Some(prev) = current.as_ref().and_then(Weak::upgrade)
            && !Arc::ptr_eq(&prev, cmd)
        {
            warn!(
                previous = ?prev,
                next = ?cmd,
                "Registering a command while another is still executing"
            );
            self.overlaps.fetch_add(1, Ordering::Relaxed);
        }
        *current = Some(Arc::downgrade(cmd));
    }

    pub fn clear_if_current(&self, cmd: &Arc<CommandState>) {
        let mut current = self.current.lock();
        let is_current = current
            .as_ref()
            .is_some_and(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(cmd)));
        if is_current {
            *current = None;
        }
    }

    pub fn current(&self) -> Option<Arc<CommandState>> {
        self.current.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Number of times a command was registered over a live one.
    pub fn overlap_count(&self) -> usize {
        self.overlaps.load(Ordering::Relaxed)
    }

    /// Deliver a decoded acknowledgment. Returns `true` if it released a barrier.
    pub fn dispatch(&self, ack: AckEvent) -> bool {
        let Some(cmd) = self.current() else {
            debug!(?ack, "Acknowledgment with no command executing");
            return false;
        };

        match cmd.expected_token() {
            Some(token) if token == ack.token => {}
            expected => {
                debug!(
                    ?ack,
                    expected = ?expected.map(|t| t as char),
                    "Ignoring acknowledgment for another command"
                );
                return false;
            }
        }

        let released = cmd.complete_active_phase(ack.status);
        if released {
            trace!(?ack, "Acknowledgment matched");
            self.push(DeviceResponse::Ack(ack));
        }
        released
    }

    /// Decode and deliver a raw acknowledgment frame.
    pub fn dispatch_bytes(&self, bytes: &[u8]) -> bool {
        match AckEvent::from_bytes(bytes) {
            Some(ack) => self.dispatch(ack),
            None => {
                trace!(len = bytes.len(), "Not an acknowledgment frame");
                false
            }
        }
    }

    /// Connection lost: fail the executing phase and tell the processor.
    pub fn notify_disconnected(&self) {
        if let Some(cmd) = self.current() {
            cmd.complete_active_phase(StatusCode::NOT_READY);
        }
        self.push(DeviceResponse::Disconnected);
    }

    fn push(&self, response: DeviceResponse) {
        if let Some(tx) = self.responses.lock().as_ref() {
            match tx.try_send(response) {
                Ok(()) => {}
                Err(TrySendError::Full(r)) => debug!(?r, "Response queue full, dropping"),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Phase;
    use crate::protocol::constants::*;
    use std::time::Duration;

    #[test]
    fn test_matching_token_releases() {
        let router = AckRouter::new();
        let cmd = Arc::new(CommandState::new(TOKEN_DELETE));
        let barrier = cmd.arm(Phase::Request, TOKEN_DELETE);
        router.set_current(&cmd);

        assert!(router.dispatch(AckEvent::new(TOKEN_DELETE, StatusCode::OK)));
        assert_eq!(
            barrier.wait(Duration::from_millis(10), None),
            Ok(StatusCode::OK)
        );
    }

    #[test]
    fn test_foreign_token_ignored() {
        let router = AckRouter::new();
        let cmd = Arc::new(CommandState::new(TOKEN_DELETE));
        let barrier = cmd.arm(Phase::Request, TOKEN_DELETE);
        router.set_current(&cmd);

        assert!(!router.dispatch(AckEvent::new(TOKEN_CREATE_DIR, StatusCode::OK)));
        assert!(!barrier.is_released());
    }

    #[test]
    fn test_event_for_unregistered_command_ignored() {
        let router = AckRouter::new();
        let first = Arc::new(CommandState::new(TOKEN_START_PATCH));
        let second = Arc::new(CommandState::new(TOKEN_STOP_PATCH));
        let first_barrier = first.arm(Phase::Request, TOKEN_START_PATCH);
        let _second_barrier = second.arm(Phase::Request, TOKEN_STOP_PATCH);

        router.set_current(&second);
        assert!(!router.dispatch(AckEvent::new(TOKEN_START_PATCH, StatusCode::OK)));
        assert!(!first_barrier.is_released());
    }

    #[test]
    fn test_clear_only_if_current() {
        let router = AckRouter::new();
        let a = Arc::new(CommandState::new(b'a'));
        let b = Arc::new(CommandState::new(b'b'));
        router.set_current(&a);
        router.clear_if_current(&b);
        assert!(router.current().is_some());
        router.clear_if_current(&a);
        assert!(router.current().is_none());
        assert_eq!(router.overlap_count(), 0);
    }

    #[test]
    fn test_weak_reference_does_not_keep_command_alive() {
        let router = AckRouter::new();
        let cmd = Arc::new(CommandState::new(TOKEN_PING));
        router.set_current(&cmd);
        drop(cmd);
        assert!(router.current().is_none());
        assert!(!router.dispatch(AckEvent::new(TOKEN_PING, StatusCode::OK)));
    }

    #[test]
    fn test_disconnect_releases_and_reports() {
        let router = AckRouter::new();
        let (tx, rx) = crossbeam_channel::bounded(RESPONSE_QUEUE_CAPACITY);
        router.attach_responses(tx);

        let cmd = Arc::new(CommandState::new(TOKEN_FILE_UPLOAD));
        let barrier = cmd.arm(Phase::Append, TOKEN_FILE_APPEND);
        router.set_current(&cmd);
        router.notify_disconnected();

        assert_eq!(
            barrier.wait(Duration::from_millis(10), None),
            Ok(StatusCode::NOT_READY)
        );
        assert_eq!(rx.try_recv(), Ok(DeviceResponse::Disconnected));
    }

    #[test]
    fn test_dispatch_bytes() {
        let router = AckRouter::new();
        let cmd = Arc::new(CommandState::new(TOKEN_CREATE_DIR));
        let barrier = cmd.arm(Phase::Request, TOKEN_CREATE_DIR);
        router.set_current(&cmd);

        assert!(!router.dispatch_bytes(b"garbage"));
        assert!(router.dispatch_bytes(b"AxoRk\x08"));
        assert_eq!(
            barrier.wait(Duration::from_millis(10), None),
            Ok(StatusCode::EXIST)
        );
    }
}
