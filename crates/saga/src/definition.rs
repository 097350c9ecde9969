//! Saga definitions: the ordered step list of one saga type.

use crate::execution_state::SagaExecutionState;
use crate::executor::StepToExecute;
use crate::step::SagaStep;

/// An ordered list of steps shared by every instance of a saga type.
pub struct SagaDefinition<D> {
    saga_type: String,
    steps: Vec<Box<dyn SagaStep<D>>>,
}

impl<D> SagaDefinition<D>
where
    D: Send + Sync + 'static,
{
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step, builder style.
    pub fn step(mut self, step: impl SagaStep<D> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_at(&self, index: usize) -> Option<&dyn SagaStep<D>> {
        self.steps.get(index).map(|step| step.as_ref())
    }

    /// The state a new instance starts in.
    pub fn initial_state(&self) -> SagaExecutionState {
        SagaExecutionState::initial(self.steps.len())
    }

    /// Finds the next step applicable in the direction of `state`.
    ///
    /// Going forward that is the first step at or after the cursor with an
    /// action. While compensating it is the nearest step below the cursor with
    /// a compensation.
    pub fn next_step_to_execute(&self, state: &SagaExecutionState) -> StepToExecute<'_, D> {
        let compensating = state.is_compensating();
        if state.is_end_state() {
            return StepToExecute::new(None, 0, compensating);
        }

        let cursor = state.cursor().min(self.steps.len());
        if compensating {
            match (0..cursor).rev().find(|&i| self.steps[i].has_compensation()) {
                Some(i) => {
                    StepToExecute::new(Some((i, self.steps[i].as_ref())), cursor - 1 - i, true)
                }
                None => StepToExecute::new(None, cursor, true),
            }
        } else {
            match (cursor..self.steps.len()).find(|&i| self.steps[i].has_action()) {
                Some(i) => {
                    StepToExecute::new(Some((i, self.steps[i].as_ref())), i - cursor, false)
                }
                None => StepToExecute::new(None, self.steps.len() - cursor, false),
            }
        }
    }
}

impl<D> std::fmt::Debug for SagaDefinition<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("saga_type", &self.saga_type)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
