//! GUI-bound commands.

use tracing::debug;

use super::{Completion, Outcome};
use crate::events::{CommandEvent, CommandObserver, GuiAction};
use crate::protocol::StatusCode;

/// Command that runs a GUI-bound action.
pub struct GuiTask {
    action: GuiAction,
    completion: Completion,
}

impl GuiTask {
    pub fn new(action: GuiAction) -> Self {
        Self {
            action,
            completion: Completion::new(),
        }
    }

    pub fn action(&self) -> &GuiAction {
        &self.action
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub fn start_message(&self) -> String {
        format!("Start {}", self.action)
    }

    pub fn done_message(&self) -> String {
        format!("Done {}", self.action)
    }

    /// Hand the action to the observer, which marshals it onto the UI thread.
    pub fn run(&self, observer: &dyn CommandObserver) -> Outcome {
        debug!(action = %self.action, "GUI task");
        observer.on_event(&CommandEvent::Gui(self.action.clone()));
        Outcome::new(StatusCode::OK, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;

    #[test]
    fn test_gui_task_emits_action() {
        let observer = RecordingObserver::new();
        let task = GuiTask::new(GuiAction::RefreshFileList);
        let outcome = task.run(&observer);
        assert!(outcome.success);
        assert!(matches!(
            observer.events().as_slice(),
            [CommandEvent::Gui(GuiAction::RefreshFileList)]
        ));
    }
}
