//! Execution of the next applicable step.

use crate::actions::SagaActions;
use crate::error::{Result, SagaError};
use crate::execution_state::SagaExecutionState;
use crate::step::{SagaStep, StepOutcome};

/// The next step to run, plus how many non-applicable steps were skipped to
/// reach it.
///
/// Produced by [`SagaDefinition::next_step_to_execute`](crate::SagaDefinition::next_step_to_execute).
/// An empty `StepToExecute` means no applicable step remains in the current
/// direction; executing it moves the cursor to the boundary and ends the saga.
pub struct StepToExecute<'a, D> {
    step: Option<(usize, &'a dyn SagaStep<D>)>,
    skipped: usize,
    compensating: bool,
}

impl<'a, D> StepToExecute<'a, D>
where
    D: Send + Sync + 'static,
{
    pub(crate) fn new(
        step: Option<(usize, &'a dyn SagaStep<D>)>,
        skipped: usize,
        compensating: bool,
    ) -> Self {
        Self {
            step,
            skipped,
            compensating,
        }
    }

    /// Number of positions the cursor moves when this step is executed.
    pub fn size(&self) -> usize {
        self.skipped + usize::from(self.step.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.step.is_none()
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    pub fn step_index(&self) -> Option<usize> {
        self.step.map(|(index, _)| index)
    }

    /// Runs the step against `data` and computes the state that follows
    /// `current_state`.
    ///
    /// A forward step that fails is reported through
    /// [`SagaActions::local_failure`]; a failing compensation is an error,
    /// since there is nothing left to fall back to.
    pub async fn execute_step(
        &self,
        data: D,
        current_state: SagaExecutionState,
    ) -> Result<SagaActions<D>> {
        let updated_state = current_state.next_state(self.size());
        let mut actions = SagaActions {
            commands: Vec::new(),
            updated_data: data,
            updated_state,
            is_end_state: updated_state.is_end_state(),
            is_compensating: current_state.is_compensating(),
            is_local: false,
            step_index: self.step_index(),
            local_failure: None,
        };

        let Some((index, step)) = self.step else {
            return Ok(actions);
        };

        match step
            .create_step_outcome(&actions.updated_data, self.compensating)
            .await
        {
            Ok(StepOutcome::Local(data)) => {
                actions.updated_data = data;
                actions.is_local = true;
            }
            Ok(StepOutcome::Remote(commands)) => actions.commands = commands,
            Err(e) if self.compensating => {
                return Err(SagaError::CompensationFailed {
                    step: step.name().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(step = step.name(), index, error = %e, "saga step failed");
                actions.is_local = true;
                actions.local_failure = Some(e.to_string());
            }
        }

        Ok(actions)
    }
}

impl<D> std::fmt::Debug for StepToExecute<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepToExecute")
            .field("step", &self.step.map(|(index, step)| (index, step.name())))
            .field("skipped", &self.skipped)
            .field("compensating", &self.compensating)
            .finish()
    }
}
