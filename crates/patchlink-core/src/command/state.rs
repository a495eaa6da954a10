//! Shared state of a serial command, as seen by the acknowledgment router.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::barrier::Barrier;
use crate::protocol::StatusCode;
use crate::protocol::ack::token_char;

/// Transaction phase a barrier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Single request of a one-shot command.
    Request,
    Open,
    Append,
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Request => write!(f, "request"),
            Phase::Open => write!(f, "open"),
            Phase::Append => write!(f, "append"),
            Phase::Close => write!(f, "close"),
        }
    }
}

struct ActivePhase {
    phase: Phase,
    token: u8,
    barrier: Arc<Barrier>,
}

/// Acknowledgment target of one serial command.
///
/// Each armed phase gets a fresh barrier, so a late acknowledgment for an
/// abandoned phase can only ever hit a barrier nobody waits on.
pub struct CommandState {
    token: u8,
    status: Mutex<StatusCode>,
    active: Mutex<Option<ActivePhase>>,
}

impl CommandState {
    pub fn new(token: u8) -> Self {
        Self {
            token,
            status: Mutex::new(StatusCode::UNSET),
            active: Mutex::new(None),
        }
    }

    /// Acknowledgment token fixed at construction.
    pub fn token(&self) -> u8 {
        self.token
    }

    pub fn status(&self) -> StatusCode {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: StatusCode) {
        *self.status.lock() = status;
    }

    /// Arm a fresh barrier for `phase`, expecting an acknowledgment tagged `token`.
    pub fn arm(&self, phase: Phase, token: u8) -> Arc<Barrier> {
        let barrier = Arc::new(Barrier::new());
        *self.active.lock() = Some(ActivePhase {
            phase,
            token,
            barrier: Arc::clone(&barrier),
        });
        barrier
    }

    pub fn disarm(&self) {
        self.active.lock().take();
    }

    pub fn active_phase(&self) -> Option<Phase> {
        self.active.lock().as_ref().map(|a| a.phase)
    }

    /// Token the currently armed phase expects, if any.
    pub fn expected_token(&self) -> Option<u8> {
        self.active.lock().as_ref().map(|a| a.token)
    }

    pub fn set_completed_with_status(&self, status: StatusCode) -> bool {
        self.release_phase(Phase::Request, status)
    }

    pub fn set_open_completed_with_status(&self, status: StatusCode) -> bool {
        self.release_phase(Phase::Open, status)
    }

    pub fn set_append_completed_with_status(&self, status: StatusCode) -> bool {
        self.release_phase(Phase::Append, status)
    }

    pub fn set_close_completed_with_status(&self, status: StatusCode) -> bool {
        self.release_phase(Phase::Close, status)
    }

    /// Route a status to the setter of whichever phase is armed.
    pub fn complete_active_phase(&self, status: StatusCode) -> bool {
        match self.active_phase() {
            Some(Phase::Request) => self.set_completed_with_status(status),
            Some(Phase::Open) => self.set_open_completed_with_status(status),
            Some(Phase::Append) => self.set_append_completed_with_status(status),
            Some(Phase::Close) => self.set_close_completed_with_status(status),
            None => false,
        }
    }

    fn release_phase(&self, phase: Phase, status: StatusCode) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(a) if a.phase == phase => a.barrier.release(status),
            _ => {
                debug!(%phase, "Completion for a phase that is not armed");
                false
            }
        }
    }
}

impl fmt::Debug for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandState")
            .field("token", &token_char(self.token))
            .field("status", &self.status())
            .field("phase", &self.active_phase())
            .finish()
    }
}
