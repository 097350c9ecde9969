//! Step cursor and direction of a running saga.

use serde::{Deserialize, Serialize};

/// Where a saga is in its step list and which way it is moving.
///
/// Going forward the cursor is the index of the next step to try; while
/// compensating it is the number of steps still below the cursor. The cursor
/// only grows going forward and only shrinks going backward, and the state
/// ends exactly when it reaches the far boundary of the current direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaExecutionState {
    cursor: usize,
    total_steps: usize,
    compensating: bool,
    end_state: bool,
}

impl SagaExecutionState {
    /// The starting state for a saga with `total_steps` steps.
    pub fn initial(total_steps: usize) -> Self {
        Self {
            cursor: 0,
            total_steps,
            compensating: false,
            end_state: false,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    pub fn is_end_state(&self) -> bool {
        self.end_state
    }

    /// Moves the cursor `advance_by` steps along the current direction.
    ///
    /// An ended state is returned unchanged.
    pub fn next_state(&self, advance_by: usize) -> Self {
        if self.end_state {
            return *self;
        }

        if self.compensating {
            let cursor = self.cursor.saturating_sub(advance_by);
            Self {
                cursor,
                end_state: cursor == 0,
                ..*self
            }
        } else {
            let cursor = (self.cursor + advance_by).min(self.total_steps);
            Self {
                cursor,
                end_state: cursor >= self.total_steps,
                ..*self
            }
        }
    }

    /// Turns the state reached after a failed forward step into a
    /// compensating state positioned just below that step.
    ///
    /// The failed step is not compensated. Calling this on a state that is
    /// already compensating returns it unchanged.
    pub fn start_compensating(&self) -> Self {
        if self.compensating {
            return *self;
        }
        let cursor = self.cursor.saturating_sub(1);
        Self {
            cursor,
            total_steps: self.total_steps,
            compensating: true,
            end_state: cursor == 0,
        }
    }
}
