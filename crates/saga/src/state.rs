//! Saga lifecycle state.

use serde::{Deserialize, Serialize};

/// The lifecycle state of a saga instance.
///
/// State transitions:
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──┬──► Compensated
///                               └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Steps are being executed forward.
    #[default]
    Running,

    /// A step failed and compensating actions are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Every completed step was compensated after a failure (terminal state).
    Compensated,

    /// A compensating action itself failed (terminal state).
    Failed,
}

impl SagaState {
    /// The state an instance settles in once its steps run out.
    pub fn finished(compensating: bool) -> Self {
        if compensating {
            SagaState::Compensated
        } else {
            SagaState::Completed
        }
    }

    /// Returns true while a step may be executing or waiting for replies.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Compensated | SagaState::Failed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Compensated => "Compensated",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
