//! The result of executing one saga step.

use crate::execution_state::SagaExecutionState;
use crate::step::CommandWithDestination;

/// Everything the orchestrator needs to act on after a step ran.
#[derive(Debug)]
pub struct SagaActions<D> {
    /// Commands to send; empty for local steps and for the end of a saga.
    pub commands: Vec<CommandWithDestination>,
    pub updated_data: D,
    pub updated_state: SagaExecutionState,
    pub is_end_state: bool,
    /// Direction the step ran in.
    pub is_compensating: bool,
    /// True when a local step ran.
    pub is_local: bool,
    /// Index of the step that ran, if any step ran.
    pub step_index: Option<usize>,
    /// Set when a forward step failed locally; the orchestrator should
    /// switch to compensation.
    pub local_failure: Option<String>,
}

impl<D> SagaActions<D> {
    /// Returns true if the saga must wait for replies before advancing.
    pub fn awaits_replies(&self) -> bool {
        !self.commands.is_empty()
    }
}
