//! Saga instances tracked by the manager.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::SagaId;

use crate::execution_state::SagaExecutionState;
use crate::state::SagaState;

/// One running (or finished) saga.
#[derive(Debug, Clone)]
pub struct SagaInstance<D> {
    pub(crate) id: SagaId,
    pub(crate) saga_type: String,
    pub(crate) data: D,
    pub(crate) execution: SagaExecutionState,
    pub(crate) state: SagaState,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) failure_reason: Option<String>,
    pub(crate) pending: Option<PendingStep>,
    /// `reply_to_message_id` of every command answered so far.
    pub(crate) answered: HashSet<String>,
}

/// A remote step waiting for replies.
#[derive(Debug, Clone)]
pub(crate) struct PendingStep {
    pub(crate) step_index: usize,
    /// Ids of the step's commands that have not been answered yet.
    pub(crate) awaiting: HashSet<String>,
    /// First failure seen among the replies.
    pub(crate) failure: Option<String>,
}

impl PendingStep {
    pub(crate) fn new(step_index: usize) -> Self {
        Self {
            step_index,
            awaiting: HashSet::new(),
            failure: None,
        }
    }

    /// Marks the command `id` as answered; false if it is not one of ours.
    pub(crate) fn resolve(&mut self, id: &str) -> bool {
        self.awaiting.remove(id)
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.awaiting.is_empty()
    }
}

impl<D> SagaInstance<D> {
    pub(crate) fn new(saga_type: impl Into<String>, data: D, execution: SagaExecutionState) -> Self {
        let now = Utc::now();
        Self {
            id: SagaId::new(),
            saga_type: saga_type.into(),
            data,
            execution,
            state: SagaState::Running,
            started_at: now,
            updated_at: now,
            failure_reason: None,
            pending: None,
            answered: HashSet::new(),
        }
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn execution_state(&self) -> SagaExecutionState {
        self.execution
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Why the saga left the forward path, if it did.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Number of commands of the current step still waiting for a reply.
    pub fn awaiting_replies(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.awaiting.len())
    }

    pub(crate) fn transition(&mut self, state: SagaState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Switches to compensation after the step that just ran failed.
    pub(crate) fn start_compensating(&mut self, reason: impl Into<String>) {
        self.execution = self.execution.start_compensating();
        self.failure_reason = Some(reason.into());
        self.transition(SagaState::Compensating);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_is_running() {
        let instance = SagaInstance::new("Order", 5u32, SagaExecutionState::initial(3));
        assert_eq!(instance.saga_type(), "Order");
        assert_eq!(*instance.data(), 5);
        assert_eq!(instance.state(), SagaState::Running);
        assert_eq!(instance.awaiting_replies(), 0);
        assert!(instance.failure_reason().is_none());
    }

    #[test]
    fn start_compensating_moves_below_failed_step() {
        let mut instance = SagaInstance::new("Order", (), SagaExecutionState::initial(3));
        instance.execution = instance.execution.next_state(2);

        instance.start_compensating("credit limit exceeded");

        assert_eq!(instance.state(), SagaState::Compensating);
        assert_eq!(instance.execution_state().cursor(), 1);
        assert!(instance.execution_state().is_compensating());
        assert_eq!(instance.failure_reason(), Some("credit limit exceeded"));
    }

    #[test]
    fn pending_step_resolves_only_its_own_commands() {
        let mut pending = PendingStep::new(1);
        pending.awaiting.extend(["m-1".to_string(), "m-2".to_string()]);

        assert!(!pending.resolve("m-9"));
        assert!(pending.resolve("m-1"));
        assert!(!pending.resolve("m-1"));
        assert!(!pending.is_resolved());
        assert!(pending.resolve("m-2"));
        assert!(pending.is_resolved());
    }
}
