//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front ends to subscribe to command events without
//! tight coupling to the dispatcher. The UI side is responsible for
//! marshalling events onto its own thread.

use std::fmt;

use crate::protocol::StatusCode;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// GUI-bound actions requested by GUI tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuiAction {
    /// A build tool failed; show the failure.
    ShowCompileFailure { detail: String },
    /// Flashing tool failed.
    ShowFlashFailure { detail: String },
    /// Connection to the device was lost.
    ShowDisconnected,
    /// Re-read the file browser contents.
    RefreshFileList,
    /// Free-form message to show to the user.
    ShowMessage(String),
}

impl fmt::Display for GuiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuiAction::ShowCompileFailure { detail } => write!(f, "compile failed: {}", detail),
            GuiAction::ShowFlashFailure { detail } => write!(f, "flash failed: {}", detail),
            GuiAction::ShowDisconnected => write!(f, "disconnected"),
            GuiAction::RefreshFileList => write!(f, "refresh file list"),
            GuiAction::ShowMessage(msg) => write!(f, "{}", msg),
        }
    }
}

/// Events emitted by the dispatcher and the commands it runs.
#[derive(Debug, Clone)]
pub enum CommandEvent {
    /// A command was dequeued and is starting.
    Started { message: String },
    /// A command finished.
    Done {
        message: String,
        success: bool,
        status: StatusCode,
    },
    /// Transfer progress, only emitted when the percentage changes.
    Progress { operation: String, percent: u8 },
    /// Severity-tagged log line.
    Log { level: LogLevel, message: String },
    /// GUI action to be marshalled onto the UI thread.
    Gui(GuiAction),
    /// The device went away; remaining queued commands were flushed.
    DeviceDisconnected { flushed: usize },
}

/// Observer trait for receiving command events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait CommandObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &CommandEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl CommandObserver for NullObserver {
    fn on_event(&self, _event: &CommandEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl CommandObserver for TracingObserver {
    fn on_event(&self, event: &CommandEvent) {
        match event {
            CommandEvent::Started { message } => {
                tracing::info!("{}", message);
            }
            CommandEvent::Done {
                message,
                success: true,
                ..
            } => {
                tracing::info!("{}", message);
            }
            CommandEvent::Done {
                message, status, ..
            } => {
                tracing::warn!(status = %status, "{}", message);
            }
            CommandEvent::Progress { operation, percent } => {
                tracing::info!(operation = %operation, "{}%", percent);
            }
            CommandEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            CommandEvent::Gui(action) => {
                tracing::info!(action = %action, "GUI action");
            }
            CommandEvent::DeviceDisconnected { flushed } => {
                tracing::warn!(flushed = flushed, "Device disconnected");
            }
        }
    }
}

/// Observer that records every event, for tests and simple front ends.
#[derive(Default)]
pub struct RecordingObserver {
    events: parking_lot::Mutex<Vec<CommandEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CommandEvent> {
        self.events.lock().clone()
    }

    pub fn drain_events(&self) -> Vec<CommandEvent> {
        self.events.lock().drain(..).collect()
    }

    /// Percentages reported by progress events, in order.
    pub fn progress(&self) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CommandEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }
}

impl CommandObserver for RecordingObserver {
    fn on_event(&self, event: &CommandEvent) {
        self.events.lock().push(event.clone());
    }
}
