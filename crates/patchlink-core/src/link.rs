//! Device link - the single-transaction primitive every serial command uses.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::barrier::{CancelToken, WaitError};
use crate::command::{CommandError, CommandState, Phase};
use crate::protocol::StatusCode;
use crate::transport::{DeviceRequest, DeviceTransport, TransportError};

/// Transport plus the cancellation token of the owning dispatcher.
pub struct DeviceLink {
    transport: Arc<dyn DeviceTransport>,
    cancel: CancelToken,
}

/// Keeps a command registered as "currently executing" until dropped.
pub struct Registration<'a> {
    link: &'a DeviceLink,
    state: &'a Arc<CommandState>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.state.disarm();
        self.link
            .transport
            .clear_if_current_executing_command(self.state);
    }
}

impl DeviceLink {
    pub fn new(transport: Arc<dyn DeviceTransport>, cancel: CancelToken) -> Self {
        Self { transport, cancel }
    }

    pub fn transport(&self) -> &Arc<dyn DeviceTransport> {
        &self.transport
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn register<'a>(&'a self, state: &'a Arc<CommandState>) -> Registration<'a> {
        self.transport.set_current_executing_command(state);
        Registration { link: self, state }
    }

    pub fn unregister(&self, state: &Arc<CommandState>) {
        state.disarm();
        self.transport.clear_if_current_executing_command(state);
    }

    /// Run one phase: check liveness, arm a fresh barrier, register, transmit, wait.
    ///
    /// Returns the raw device status; interpreting it is up to the caller.
    #[instrument(level = "debug", skip(self, state, request), fields(request = request.name()))]
    pub fn transact(
        &self,
        state: &Arc<CommandState>,
        phase: Phase,
        request: &DeviceRequest,
        timeout: Duration,
    ) -> Result<StatusCode, CommandError> {
        if self.cancel.is_cancelled() {
            return Err(CommandError::Interrupted);
        }
        if !self.transport.is_connected() {
            return Err(CommandError::Disconnected);
        }

        let barrier = state.arm(phase, request.ack_token());
        self.transport.set_current_executing_command(state);

        if let Err(e) = self.transport.transmit(request) {
            state.disarm();
            debug!(error = %e, "Transmit rejected");
            return Err(match e {
                TransportError::Disconnected => CommandError::Disconnected,
                other => CommandError::Write(other),
            });
        }

        let result = barrier.wait(timeout, Some(&self.cancel));
        state.disarm();

        match result {
            Ok(status) if status == StatusCode::NOT_READY && !self.transport.is_connected() => {
                Err(CommandError::Disconnected)
            }
            Ok(status) => {
                trace!(%status, %phase, "Phase acknowledged");
                Ok(status)
            }
            Err(WaitError::Timeout { timeout_ms }) => {
                Err(CommandError::Timeout { phase, timeout_ms })
            }
            Err(WaitError::Interrupted) => Err(CommandError::Interrupted),
        }
    }
}

/// Accept `OK` plus any extra tolerated codes; everything else is a device error.
pub(crate) fn accept(
    status: StatusCode,
    phase: Phase,
    tolerated: &[StatusCode],
) -> Result<StatusCode, CommandError> {
    if status.is_ok() || tolerated.contains(&status) {
        Ok(status)
    } else {
        Err(CommandError::Device { phase, status })
    }
}
