//! Device transport abstraction.
//!
//! Defines the `DeviceTransport` trait the command layer transmits through,
//! allowing different implementations (USB bulk, serial, mock, etc.).

use std::sync::Arc;

use thiserror::Error;

use super::request::DeviceRequest;
use super::router::AckRouter;
use crate::command::CommandState;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract device transport.
///
/// `transmit` only sends; acknowledgments come back asynchronously through
/// the transport's receive path, which feeds them to [`DeviceTransport::router`].
pub trait DeviceTransport: Send + Sync {
    /// Send one request. An error means nothing was sent.
    fn transmit(&self, request: &DeviceRequest) -> Result<(), TransportError>;

    /// Check if the device is still connected.
    fn is_connected(&self) -> bool;

    /// Router the receive path delivers acknowledgments to.
    fn router(&self) -> &AckRouter;

    fn set_current_executing_command(&self, cmd: &Arc<CommandState>) {
        self.router().set_current(cmd);
    }

    fn clear_if_current_executing_command(&self, cmd: &Arc<CommandState>) {
        self.router().clear_if_current(cmd);
    }
}
