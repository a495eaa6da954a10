//! Admission control for long-running operations.
//!
//! While a batch (multi-file upload, firmware flash) is running, only the
//! periodic heartbeat and control traffic may enter the queue. For a short
//! cooldown after the batch ends, a file-list refresh is let through too.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::command::Command;

/// How the admission controller treats a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionClass {
    /// Heartbeat and control values; always admitted.
    Periodic,
    /// Admitted during the cooldown that follows a long operation.
    FileListRefresh,
    Normal,
}

#[derive(Debug, Default)]
struct AdmissionState {
    long_operation: bool,
    last_end: Option<Instant>,
}

#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
    cooldown: Duration,
}

impl AdmissionController {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(AdmissionState::default()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn should_offer(&self, command: &Command) -> bool {
        self.admits(command.admission_class())
    }

    pub fn admits(&self, class: AdmissionClass) -> bool {
        if class == AdmissionClass::Periodic {
            return true;
        }

        let state = self.state.lock();
        if state.long_operation {
            trace!(?class, "Rejected during long operation");
            return false;
        }

        let cooling = state
            .last_end
            .is_some_and(|end| end.elapsed() < self.cooldown);
        if cooling {
            return class == AdmissionClass::FileListRefresh;
        }
        true
    }

    pub fn start_long_operation(&self) {
        debug!("Long operation started");
        self.state.lock().long_operation = true;
    }

    pub fn end_long_operation(&self) {
        debug!("Long operation ended");
        let mut state = self.state.lock();
        state.long_operation = false;
        state.last_end = Some(Instant::now());
    }

    pub fn is_long_operation_in_progress(&self) -> bool {
        self.state.lock().long_operation
    }

    /// Bracket `f` with start/end of a long operation.
    pub fn long_operation<T>(&self, f: impl FnOnce() -> T) -> T {
        self.start_long_operation();
        let _guard = EndOnDrop(self);
        f()
    }
}

struct EndOnDrop<'a>(&'a AdmissionController);

impl Drop for EndOnDrop<'_> {
    fn drop(&mut self) {
        self.0.end_long_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_idle_admits_everything() {
        let admission = AdmissionController::new(Duration::from_millis(2000));
        assert!(admission.should_offer(&Command::ping()));
        assert!(admission.should_offer(&Command::delete_file("/x")));
        assert!(admission.should_offer(&Command::get_file_list()));
    }

    #[test]
    fn test_long_operation_blocks_all_but_periodic() {
        let admission = AdmissionController::new(Duration::from_millis(2000));
        admission.start_long_operation();
        assert!(admission.is_long_operation_in_progress());
        assert!(admission.should_offer(&Command::ping()));
        assert!(!admission.should_offer(&Command::start_patch()));
        assert!(!admission.should_offer(&Command::get_file_list()));
    }

    #[test]
    fn test_cooldown_admits_refresh_only() {
        let admission = AdmissionController::new(Duration::from_millis(100));
        admission.start_long_operation();
        admission.end_long_operation();

        assert!(admission.should_offer(&Command::get_file_list()));
        assert!(!admission.should_offer(&Command::delete_file("/x")));
        assert!(admission.should_offer(&Command::ping()));

        thread::sleep(Duration::from_millis(150));
        assert!(admission.should_offer(&Command::get_file_list()));
        assert!(admission.should_offer(&Command::delete_file("/x")));
    }

    #[test]
    fn test_long_operation_guard_ends_on_return() {
        let admission = AdmissionController::new(Duration::ZERO);
        let seen = admission.long_operation(|| admission.is_long_operation_in_progress());
        assert!(seen);
        assert!(!admission.is_long_operation_in_progress());
        assert!(admission.should_offer(&Command::stop_patch()));
    }
}
