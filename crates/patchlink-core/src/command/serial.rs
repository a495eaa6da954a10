//! Serial commands: one device transaction awaiting acknowledgments.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, instrument, warn};

use super::{CommandError, CommandState, Completion, ExecContext, Phase};
use crate::events::{CommandEvent, LogLevel};
use crate::link::accept;
use crate::protocol::StatusCode;
use crate::protocol::constants::*;
use crate::transfer::{self, FileUpload, FirmwareUpload};
use crate::transport::{ControlValue, DeviceRequest};

/// Supplies control-dial values that changed since the last transmit.
pub trait ControlSource: Send + Sync {
    fn take_pending(&self) -> Vec<ControlValue>;
}

/// What a serial command does on the device.
pub enum SerialKind {
    /// Heartbeat.
    Ping,
    TransmitControls(Arc<dyn ControlSource>),
    StartPatch,
    StopPatch,
    DeleteFile { path: String },
    CreateDirectory { path: String, modified: SystemTime },
    ChangeDirectory { path: String },
    GetFileList,
    GetFileInfo { path: String },
    UploadFile(FileUpload),
    UploadFirmware(FirmwareUpload),
}

impl SerialKind {
    /// Acknowledgment token identifying this command.
    pub fn token(&self) -> u8 {
        match self {
            SerialKind::Ping => TOKEN_PING,
            SerialKind::TransmitControls(_) => TOKEN_CONTROLS,
            SerialKind::StartPatch => TOKEN_START_PATCH,
            SerialKind::StopPatch => TOKEN_STOP_PATCH,
            SerialKind::DeleteFile { .. } => TOKEN_DELETE,
            SerialKind::CreateDirectory { .. } => TOKEN_CREATE_DIR,
            SerialKind::ChangeDirectory { .. } => TOKEN_CHANGE_DIR,
            SerialKind::GetFileList => TOKEN_FILE_LIST,
            SerialKind::GetFileInfo { .. } => TOKEN_FILE_INFO,
            SerialKind::UploadFile(_) => TOKEN_FILE_UPLOAD,
            SerialKind::UploadFirmware(_) => TOKEN_MEM_WRITE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SerialKind::Ping => "ping",
            SerialKind::TransmitControls(_) => "transmit controls",
            SerialKind::StartPatch => "start patch",
            SerialKind::StopPatch => "stop patch",
            SerialKind::DeleteFile { .. } => "delete file",
            SerialKind::CreateDirectory { .. } => "create directory",
            SerialKind::ChangeDirectory { .. } => "change directory",
            SerialKind::GetFileList => "get file list",
            SerialKind::GetFileInfo { .. } => "get file info",
            SerialKind::UploadFile(_) => "upload file",
            SerialKind::UploadFirmware(_) => "upload firmware",
        }
    }

    /// Extra status codes that still count as success.
    pub fn tolerated(&self) -> &'static [StatusCode] {
        match self {
            SerialKind::CreateDirectory { .. } => &[StatusCode::EXIST],
            _ => &[],
        }
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        status.is_ok() || self.tolerated().contains(&status)
    }

    fn one_shot_request(&self) -> Option<DeviceRequest> {
        let request = match self {
            SerialKind::Ping => DeviceRequest::Ping,
            SerialKind::StartPatch => DeviceRequest::StartPatch,
            SerialKind::StopPatch => DeviceRequest::StopPatch,
            SerialKind::DeleteFile { path } => DeviceRequest::Delete { path: path.clone() },
            SerialKind::CreateDirectory { path, modified } => DeviceRequest::CreateDirectory {
                path: path.clone(),
                modified: *modified,
            },
            SerialKind::ChangeDirectory { path } => {
                DeviceRequest::ChangeDirectory { path: path.clone() }
            }
            SerialKind::GetFileList => DeviceRequest::GetFileList,
            SerialKind::GetFileInfo { path } => DeviceRequest::GetFileInfo { path: path.clone() },
            SerialKind::TransmitControls(_)
            | SerialKind::UploadFile(_)
            | SerialKind::UploadFirmware(_) => return None,
        };
        Some(request)
    }

    fn subject(&self) -> Option<&str> {
        match self {
            SerialKind::DeleteFile { path }
            | SerialKind::CreateDirectory { path, .. }
            | SerialKind::ChangeDirectory { path }
            | SerialKind::GetFileInfo { path } => Some(path),
            SerialKind::UploadFile(upload) => Some(upload.destination()),
            _ => None,
        }
    }
}

/// Command sent to the device that waits for acknowledgments.
pub struct SerialCommand {
    kind: SerialKind,
    state: Arc<CommandState>,
    completion: Completion,
}

impl SerialCommand {
    pub fn new(kind: SerialKind) -> Self {
        let state = Arc::new(CommandState::new(kind.token()));
        Self {
            kind,
            state,
            completion: Completion::new(),
        }
    }

    pub fn kind(&self) -> &SerialKind {
        &self.kind
    }

    pub fn state(&self) -> &Arc<CommandState> {
        &self.state
    }

    /// Device-reported status; `UNSET` until executed.
    pub fn status(&self) -> StatusCode {
        self.state.status()
    }

    pub fn succeeded(&self) -> bool {
        self.kind.accepts(self.status())
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub fn start_message(&self) -> String {
        match self.kind.subject() {
            Some(subject) => format!("Start {} {}", self.kind.name(), subject),
            None => format!("Start {}", self.kind.name()),
        }
    }

    pub fn done_message(&self, success: bool) -> String {
        let verdict = if success { "Done" } else { "Failed" };
        match self.kind.subject() {
            Some(subject) => format!("{} {} {}", verdict, self.kind.name(), subject),
            None => format!("{} {}", verdict, self.kind.name()),
        }
    }

    /// Run the whole transaction on the calling thread.
    ///
    /// Failures are recorded as the command's status, never returned.
    #[instrument(level = "debug", skip_all, fields(command = self.kind.name()))]
    pub fn execute(&mut self, ctx: &ExecContext<'_>) -> StatusCode {
        let _registration = ctx.link.register(&self.state);

        let result = match &mut self.kind {
            SerialKind::UploadFile(upload) => transfer::run_transfer(ctx, &self.state, upload),
            SerialKind::UploadFirmware(upload) => transfer::run_transfer(ctx, &self.state, upload),
            SerialKind::TransmitControls(source) => {
                let values = source.take_pending();
                if values.is_empty() {
                    Ok(StatusCode::OK)
                } else {
                    one_shot(ctx, &self.state, &DeviceRequest::ControlValues(values), &[])
                }
            }
            kind => match kind.one_shot_request() {
                Some(request) => one_shot(ctx, &self.state, &request, kind.tolerated()),
                None => Ok(StatusCode::OK),
            },
        };

        let status = match result {
            Ok(status) => status,
            Err(e @ CommandError::Interrupted) => {
                debug!(command = self.kind.name(), "Serial command interrupted");
                e.status()
            }
            Err(e) => {
                warn!(command = self.kind.name(), error = %e, "Serial command failed");
                ctx.observer.on_event(&CommandEvent::Log {
                    level: LogLevel::Error,
                    message: format!("{}: {}", self.kind.name(), e),
                });
                e.status()
            }
        };
        self.state.set_status(status);
        status
    }
}

impl std::fmt::Debug for SerialCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialCommand")
            .field("kind", &self.kind.name())
            .field("state", &self.state)
            .finish()
    }
}

fn one_shot(
    ctx: &ExecContext<'_>,
    state: &Arc<CommandState>,
    request: &DeviceRequest,
    tolerated: &[StatusCode],
) -> Result<StatusCode, CommandError> {
    let status = ctx
        .link
        .transact(state, Phase::Request, request, ctx.config.ack_timeout())?;
    accept(status, Phase::Request, tolerated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::CancelToken;
    use crate::config::DispatcherConfig;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::link::DeviceLink;
    use crate::protocol::AckEvent;
    use crate::transport::{AckScript, DeviceTransport, MockTransport};
    use parking_lot::Mutex;

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            ack_timeout_ms: 50,
            open_timeout_ms: 50,
            ..Default::default()
        }
    }

    fn run(mock: &Arc<MockTransport>, cmd: &mut SerialCommand) -> StatusCode {
        let link = DeviceLink::new(mock.clone(), CancelToken::new());
        let config = fast_config();
        let ctx = ExecContext {
            link: &link,
            observer: &NullObserver,
            config: &config,
        };
        cmd.execute(&ctx)
    }

    struct FixedControls(Mutex<Vec<ControlValue>>);

    impl ControlSource for FixedControls {
        fn take_pending(&self) -> Vec<ControlValue> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    #[test]
    fn test_status_unset_before_execute() {
        let cmd = SerialCommand::new(SerialKind::StartPatch);
        assert!(cmd.status().is_unset());
        assert!(!cmd.succeeded());
        assert_eq!(cmd.state().token(), TOKEN_START_PATCH);
    }

    #[test]
    fn test_one_shot_success() {
        let mock = Arc::new(MockTransport::new());
        let mut cmd = SerialCommand::new(SerialKind::DeleteFile {
            path: "/old.axp".into(),
        });
        assert_eq!(run(&mock, &mut cmd), StatusCode::OK);
        assert!(cmd.succeeded());
        assert_eq!(
            mock.requests(),
            vec![DeviceRequest::Delete {
                path: "/old.axp".into()
            }]
        );
        assert!(mock.router().current().is_none());
    }

    #[test]
    fn test_create_directory_tolerates_exist() {
        let mock = Arc::new(MockTransport::silent());
        mock.script(TOKEN_CREATE_DIR, AckScript::Status(StatusCode::EXIST));
        let mut cmd = SerialCommand::new(SerialKind::CreateDirectory {
            path: "/banks".into(),
            modified: SystemTime::UNIX_EPOCH,
        });
        assert_eq!(run(&mock, &mut cmd), StatusCode::EXIST);
        assert!(cmd.succeeded());
    }

    #[test]
    fn test_delete_does_not_tolerate_exist() {
        let mock = Arc::new(MockTransport::silent());
        mock.script(TOKEN_DELETE, AckScript::Status(StatusCode::EXIST));
        let mut cmd = SerialCommand::new(SerialKind::DeleteFile { path: "/x".into() });
        assert_eq!(run(&mock, &mut cmd), StatusCode::EXIST);
        assert!(!cmd.succeeded());
    }

    #[test]
    fn test_timeout_recorded_as_status() {
        let mock = Arc::new(MockTransport::silent());
        let mut cmd = SerialCommand::new(SerialKind::GetFileList);
        assert_eq!(run(&mock, &mut cmd), StatusCode::NO_ACK);
        assert!(!cmd.succeeded());
    }

    #[test]
    fn test_missing_ack_distinct_from_device_timeout() {
        let silent = Arc::new(MockTransport::silent());
        let mut unanswered = SerialCommand::new(SerialKind::GetFileInfo { path: "/a".into() });
        assert_eq!(run(&silent, &mut unanswered), StatusCode::NO_ACK);

        let answering = Arc::new(MockTransport::silent());
        answering.script(TOKEN_FILE_INFO, AckScript::Status(StatusCode::from_u8(0x0F)));
        let mut reported = SerialCommand::new(SerialKind::GetFileInfo { path: "/a".into() });
        assert_eq!(run(&answering, &mut reported), StatusCode::TIMEOUT);

        assert_ne!(unanswered.status(), reported.status());
        assert!(!unanswered.succeeded());
        assert!(!reported.succeeded());
    }

    #[test]
    fn test_late_ack_after_timeout_is_ignored() {
        let mock = Arc::new(MockTransport::silent());
        let mut first = SerialCommand::new(SerialKind::StartPatch);
        assert_eq!(run(&mock, &mut first), StatusCode::NO_ACK);

        // The start-patch acknowledgment shows up while stop-patch is executing.
        let link = DeviceLink::new(mock.clone(), CancelToken::new());
        let second = SerialCommand::new(SerialKind::StopPatch);
        let _registration = link.register(second.state());
        let barrier = second.state().arm(Phase::Request, TOKEN_STOP_PATCH);

        let late = AckEvent::new(TOKEN_START_PATCH, StatusCode::OK);
        assert!(!mock.inject_ack(late));
        assert!(!barrier.is_released());
        assert_eq!(first.status(), StatusCode::NO_ACK);
    }

    #[test]
    fn test_write_error_recorded() {
        let mock = Arc::new(MockTransport::new());
        mock.set_reject_writes(true);
        let mut cmd = SerialCommand::new(SerialKind::Ping);
        assert_eq!(run(&mock, &mut cmd), StatusCode::WRITE_FAILED);
    }

    #[test]
    fn test_controls_sent_only_when_pending() {
        let mock = Arc::new(MockTransport::new());
        let source = Arc::new(FixedControls(Mutex::new(vec![ControlValue {
            index: 3,
            value: -12,
        }])));

        let mut cmd = SerialCommand::new(SerialKind::TransmitControls(source.clone()));
        assert_eq!(run(&mock, &mut cmd), StatusCode::OK);
        let mut cmd = SerialCommand::new(SerialKind::TransmitControls(source));
        assert_eq!(run(&mock, &mut cmd), StatusCode::OK);

        assert_eq!(
            mock.requests(),
            vec![DeviceRequest::ControlValues(vec![ControlValue {
                index: 3,
                value: -12
            }])]
        );
    }

    #[test]
    fn test_failure_logged_to_observer() {
        let mock = Arc::new(MockTransport::silent());
        mock.script(TOKEN_DELETE, AckScript::Status(StatusCode::NO_FILE));
        let link = DeviceLink::new(mock.clone(), CancelToken::new());
        let config = fast_config();
        let observer = RecordingObserver::new();
        let ctx = ExecContext {
            link: &link,
            observer: &observer,
            config: &config,
        };
        let mut cmd = SerialCommand::new(SerialKind::DeleteFile { path: "/x".into() });
        cmd.execute(&ctx);

        let events = observer.events();
        assert!(events.iter().any(|e| matches!(
            e,
            CommandEvent::Log {
                level: LogLevel::Error,
                ..
            }
        )));
    }

    #[test]
    fn test_interrupted_command_not_logged_as_error() {
        let mock = Arc::new(MockTransport::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let link = DeviceLink::new(mock.clone(), cancel);
        let config = fast_config();
        let observer = RecordingObserver::new();
        let ctx = ExecContext {
            link: &link,
            observer: &observer,
            config: &config,
        };
        let mut cmd = SerialCommand::new(SerialKind::Ping);
        assert_eq!(cmd.execute(&ctx), StatusCode::INTERRUPTED);
        assert!(observer.events().is_empty());
        assert!(mock.requests().is_empty());
    }
}
