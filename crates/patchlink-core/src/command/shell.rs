//! External build/flash tool runner.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command as Process, ExitStatus, Stdio};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, info, instrument, warn};

use super::{Command, Completion, Outcome};
use crate::events::{CommandEvent, CommandObserver, GuiAction, LogLevel};
use crate::protocol::StatusCode;

/// Which GUI failure a non-zero exit turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellPurpose {
    Build,
    Flash,
}

/// Severity and optional explanation for one line of tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineClass {
    pub level: LogLevel,
    pub hint: Option<&'static str>,
}

const HINTS: &[(&str, &str)] = &[
    (
        "overflowed",
        "The patch does not fit in device memory. Reduce its size or move data to SDRAM.",
    ),
    (
        "undefined reference",
        "A referenced function or object is missing from the build. Check the object list and its spelling.",
    ),
    (
        "No such file or directory",
        "A file required by the build was not found. Check the toolchain installation and paths.",
    ),
];

/// Classify a line of tool output by substring.
pub fn classify_line(line: &str) -> LineClass {
    if let Some((_, hint)) = HINTS.iter().find(|(needle, _)| line.contains(needle)) {
        return LineClass {
            level: LogLevel::Error,
            hint: Some(hint),
        };
    }

    let lower = line.to_ascii_lowercase();
    let level = if lower.contains("error") {
        LogLevel::Error
    } else if lower.contains("warning") {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    LineClass { level, hint: None }
}

/// Result of a shell run: the outcome and, on failure, a follow-up command.
pub struct ShellOutcome {
    pub outcome: Outcome,
    pub follow_up: Option<Command>,
}

/// Command that runs an external process.
pub struct ShellTask {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    purpose: ShellPurpose,
    completion: Completion,
}

impl ShellTask {
    pub fn new(program: impl Into<String>, purpose: ShellPurpose) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            purpose,
            completion: Completion::new(),
        }
    }

    pub fn build(program: impl Into<String>) -> Self {
        Self::new(program, ShellPurpose::Build)
    }

    pub fn flash(program: impl Into<String>) -> Self {
        Self::new(program, ShellPurpose::Flash)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn purpose(&self) -> ShellPurpose {
        self.purpose
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub fn start_message(&self) -> String {
        match self.purpose {
            ShellPurpose::Build => format!("Start compiling with {}", self.program),
            ShellPurpose::Flash => format!("Start flashing with {}", self.program),
        }
    }

    pub fn done_message(&self, success: bool) -> String {
        let verb = match self.purpose {
            ShellPurpose::Build => "compiling",
            ShellPurpose::Flash => "flashing",
        };
        if success {
            format!("Done {}", verb)
        } else {
            format!("Failed {}", verb)
        }
    }

    /// Run the process to completion, forwarding classified output lines.
    #[instrument(level = "info", skip_all, fields(program = %self.program))]
    pub fn run(&self, observer: &dyn CommandObserver) -> ShellOutcome {
        let mut process = Process::new(&self.program);
        process
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            process.current_dir(dir);
        }

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "Failed to spawn");
                let detail = format!("could not start {}: {}", self.program, e);
                observer.on_event(&CommandEvent::Log {
                    level: LogLevel::Error,
                    message: detail.clone(),
                });
                return self.failed(detail);
            }
        };

        let (tx, rx) = unbounded::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let mut last_error: Option<String> = None;
        for line in rx.iter() {
            let class = classify_line(&line);
            if class.level == LogLevel::Error {
                last_error = Some(line.clone());
            }
            observer.on_event(&CommandEvent::Log {
                level: class.level,
                message: line,
            });
            if let Some(hint) = class.hint {
                observer.on_event(&CommandEvent::Log {
                    level: LogLevel::Info,
                    message: hint.to_string(),
                });
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        match child.wait() {
            Ok(status) if status.success() => {
                info!("Process exited cleanly");
                ShellOutcome {
                    outcome: Outcome::new(StatusCode::OK, true),
                    follow_up: None,
                }
            }
            Ok(status) => {
                debug!(%status, "Process failed");
                let detail = last_error.unwrap_or_else(|| describe_exit(status));
                self.failed(detail)
            }
            Err(e) => {
                warn!(error = %e, "Failed to wait for process");
                self.failed(e.to_string())
            }
        }
    }

    fn failed(&self, detail: String) -> ShellOutcome {
        let action = match self.purpose {
            ShellPurpose::Build => GuiAction::ShowCompileFailure { detail },
            ShellPurpose::Flash => GuiAction::ShowFlashFailure { detail },
        };
        ShellOutcome {
            outcome: Outcome::new(StatusCode::INT_ERR, false),
            follow_up: Some(Command::gui(action)),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("compiling main.c").level, LogLevel::Info);
        assert_eq!(
            classify_line("main.c:3: warning: unused variable").level,
            LogLevel::Warn
        );
        assert_eq!(classify_line("main.c:4: Error: bad").level, LogLevel::Error);

        let class = classify_line("region `SRAM' overflowed by 24 bytes");
        assert_eq!(class.level, LogLevel::Error);
        assert!(class.hint.is_some());
        assert!(classify_line("undefined reference to `foo'").hint.is_some());
        assert!(classify_line("cc1: fatal: x.h: No such file or directory").hint.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success_streams_lines() {
        let observer = RecordingObserver::new();
        let task = ShellTask::build("sh")
            .arg("-c")
            .arg("echo building; echo \"warning: $PATCH_NAME\" 1>&2")
            .env("PATCH_NAME", "osc");
        let result = task.run(&observer);

        assert!(result.outcome.success);
        assert!(result.follow_up.is_none());
        let logs: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                CommandEvent::Log { level, message } => Some((level, message)),
                _ => None,
            })
            .collect();
        assert!(logs.contains(&(LogLevel::Info, "building".to_string())));
        assert!(logs.contains(&(LogLevel::Warn, "warning: osc".to_string())));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_failure_yields_follow_up() {
        let observer = RecordingObserver::new();
        let task = ShellTask::build("sh")
            .arg("-c")
            .arg("echo 'ld: region RAM overflowed' 1>&2; exit 2");
        let result = task.run(&observer);

        assert!(!result.outcome.success);
        match result.follow_up {
            Some(Command::Gui(gui)) => assert_eq!(
                gui.action(),
                &GuiAction::ShowCompileFailure {
                    detail: "ld: region RAM overflowed".into()
                }
            ),
            other => panic!("unexpected follow-up {:?}", other),
        }
        // The hint follows the offending line.
        assert!(observer.events().iter().any(|e| matches!(
            e,
            CommandEvent::Log { level: LogLevel::Info, message } if message.contains("does not fit")
        )));
    }

    #[test]
    fn test_missing_program_fails() {
        let observer = RecordingObserver::new();
        let result = ShellTask::flash("/nonexistent/flash-tool").run(&observer);
        assert!(!result.outcome.success);
        assert!(matches!(
            result.follow_up,
            Some(Command::Gui(ref gui)) if matches!(gui.action(), GuiAction::ShowFlashFailure { .. })
        ));
    }
}
