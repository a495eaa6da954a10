//! Command taxonomy.
//!
//! A [`Command`] is one of three kinds:
//! - `Gui`: runs a GUI-bound action, marshalled by the observer
//! - `Serial`: a device transaction awaiting acknowledgments
//! - `Shell`: an external build/flash process

mod gui;
mod serial;
mod shell;
mod state;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use thiserror::Error;

use crate::admission::AdmissionClass;
use crate::barrier::Barrier;
use crate::config::DispatcherConfig;
use crate::events::{CommandObserver, GuiAction};
use crate::link::DeviceLink;
use crate::protocol::StatusCode;
use crate::transfer::{FileUpload, FirmwareUpload, TransferSource};
use crate::transport::TransportError;

pub use gui::GuiTask;
pub use serial::{ControlSource, SerialCommand, SerialKind};
pub use shell::{LineClass, ShellOutcome, ShellPurpose, ShellTask, classify_line};
pub use state::{CommandState, Phase};

/// Why a device transaction failed.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Write failed: {0}")]
    Write(TransportError),

    #[error("No acknowledgment for {phase} within {timeout_ms}ms")]
    Timeout { phase: Phase, timeout_ms: u64 },

    #[error("Device reported {status} during {phase}")]
    Device { phase: Phase, status: StatusCode },

    #[error("Interrupted while waiting for the device")]
    Interrupted,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Upload source unreadable: {0}")]
    Source(#[from] std::io::Error),
}

impl CommandError {
    /// Status code recorded on the command for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            CommandError::Write(_) => StatusCode::WRITE_FAILED,
            CommandError::Timeout { .. } => StatusCode::NO_ACK,
            CommandError::Device { status, .. } => *status,
            CommandError::Interrupted => StatusCode::INTERRUPTED,
            CommandError::Disconnected => StatusCode::NOT_READY,
            CommandError::Source(_) => StatusCode::INT_ERR,
        }
    }
}

/// Final result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    pub success: bool,
}

impl Outcome {
    pub fn new(status: StatusCode, success: bool) -> Self {
        Self { status, success }
    }
}

/// Handle for blocking on a command's final outcome.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

struct CompletionInner {
    done: Barrier,
    outcome: Mutex<Option<Outcome>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                done: Barrier::new(),
                outcome: Mutex::new(None),
            }),
        }
    }

    /// Record the outcome. Only the first call has any effect.
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        {
            let mut slot = self.inner.outcome.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.done.release(outcome.status)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        *self.inner.outcome.lock()
    }

    pub fn is_done(&self) -> bool {
        self.outcome().is_some()
    }

    /// Wait up to `timeout` for the command to finish.
    pub fn wait(&self, timeout: Duration) -> Option<Outcome> {
        if let Some(outcome) = self.outcome() {
            return Some(outcome);
        }
        let _ = self.inner.done.wait(timeout, None);
        self.outcome()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Resources a command needs while it runs on the processor thread.
pub struct ExecContext<'a> {
    pub link: &'a DeviceLink,
    pub observer: &'a dyn CommandObserver,
    pub config: &'a DispatcherConfig,
}

/// A unit of work for the command processor.
pub enum Command {
    Gui(GuiTask),
    Serial(SerialCommand),
    Shell(ShellTask),
}

impl Command {
    pub fn ping() -> Self {
        Self::serial(SerialKind::Ping)
    }

    pub fn transmit_controls(source: Arc<dyn ControlSource>) -> Self {
        Self::serial(SerialKind::TransmitControls(source))
    }

    pub fn start_patch() -> Self {
        Self::serial(SerialKind::StartPatch)
    }

    pub fn stop_patch() -> Self {
        Self::serial(SerialKind::StopPatch)
    }

    pub fn delete_file(path: impl Into<String>) -> Self {
        Self::serial(SerialKind::DeleteFile { path: path.into() })
    }

    pub fn create_directory(path: impl Into<String>) -> Self {
        Self::serial(SerialKind::CreateDirectory {
            path: path.into(),
            modified: SystemTime::now(),
        })
    }

    pub fn change_directory(path: impl Into<String>) -> Self {
        Self::serial(SerialKind::ChangeDirectory { path: path.into() })
    }

    pub fn get_file_list() -> Self {
        Self::serial(SerialKind::GetFileList)
    }

    pub fn get_file_info(path: impl Into<String>) -> Self {
        Self::serial(SerialKind::GetFileInfo { path: path.into() })
    }

    pub fn upload_file(source: TransferSource, destination: impl Into<String>) -> Self {
        Self::serial(SerialKind::UploadFile(FileUpload::new(source, destination)))
    }

    pub fn upload_firmware(image: &[u8]) -> Self {
        Self::serial(SerialKind::UploadFirmware(FirmwareUpload::new(image)))
    }

    pub fn gui(action: GuiAction) -> Self {
        Command::Gui(GuiTask::new(action))
    }

    pub fn shell(task: ShellTask) -> Self {
        Command::Shell(task)
    }

    fn serial(kind: SerialKind) -> Self {
        Command::Serial(SerialCommand::new(kind))
    }

    pub fn start_message(&self) -> String {
        match self {
            Command::Gui(task) => task.start_message(),
            Command::Serial(cmd) => cmd.start_message(),
            Command::Shell(task) => task.start_message(),
        }
    }

    pub fn done_message(&self, success: bool) -> String {
        match self {
            Command::Gui(task) => task.done_message(),
            Command::Serial(cmd) => cmd.done_message(success),
            Command::Shell(task) => task.done_message(success),
        }
    }

    /// Handle to wait on this command's outcome after it has been queued.
    pub fn completion(&self) -> Completion {
        match self {
            Command::Gui(task) => task.completion(),
            Command::Serial(cmd) => cmd.completion(),
            Command::Shell(task) => task.completion(),
        }
    }

    pub fn admission_class(&self) -> AdmissionClass {
        match self {
            Command::Serial(cmd) => match cmd.kind() {
                SerialKind::Ping | SerialKind::TransmitControls(_) => AdmissionClass::Periodic,
                SerialKind::GetFileList => AdmissionClass::FileListRefresh,
                _ => AdmissionClass::Normal,
            },
            _ => AdmissionClass::Normal,
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Gui(task) => write!(f, "Gui({})", task.action()),
            Command::Serial(cmd) => write!(f, "Serial({})", cmd.kind().name()),
            Command::Shell(task) => write!(f, "Shell({})", task.program()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_first_finish_wins() {
        let completion = Completion::new();
        assert!(!completion.is_done());
        assert!(completion.finish(Outcome::new(StatusCode::OK, true)));
        assert!(!completion.finish(Outcome::new(StatusCode::DISK_ERR, false)));
        assert_eq!(
            completion.wait(Duration::from_millis(10)),
            Some(Outcome::new(StatusCode::OK, true))
        );
        // Repeated waits keep answering.
        assert_eq!(
            completion.wait(Duration::from_millis(10)),
            Some(Outcome::new(StatusCode::OK, true))
        );
    }

    #[test]
    fn test_completion_wait_times_out() {
        let completion = Completion::new();
        assert_eq!(completion.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            CommandError::Write(TransportError::WriteFailed("x".into())).status(),
            StatusCode::WRITE_FAILED
        );
        assert_eq!(
            CommandError::Timeout {
                phase: Phase::Open,
                timeout_ms: 3000
            }
            .status(),
            StatusCode::NO_ACK
        );
        assert_eq!(
            CommandError::Device {
                phase: Phase::Append,
                status: StatusCode::DENIED
            }
            .status(),
            StatusCode::DENIED
        );
        assert_eq!(CommandError::Interrupted.status(), StatusCode::INTERRUPTED);
        assert_eq!(CommandError::Disconnected.status(), StatusCode::NOT_READY);
    }

    #[test]
    fn test_admission_classes() {
        assert_eq!(Command::ping().admission_class(), AdmissionClass::Periodic);
        assert_eq!(
            Command::get_file_list().admission_class(),
            AdmissionClass::FileListRefresh
        );
        assert_eq!(
            Command::delete_file("/x").admission_class(),
            AdmissionClass::Normal
        );
        assert_eq!(
            Command::gui(GuiAction::RefreshFileList).admission_class(),
            AdmissionClass::Normal
        );
    }
}
