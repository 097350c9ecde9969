//! Saga orchestration core.
//!
//! A saga is an ordered list of steps. Each step may run a forward action and
//! a compensating action, either locally (mutating the saga data) or remotely
//! (sending commands to other services and waiting for their replies).
//!
//! - [`SagaExecutionState`] tracks the step cursor and direction
//! - [`SagaDefinition::next_step_to_execute`] and [`StepToExecute`] run the
//!   next applicable step and return [`SagaActions`]
//! - [`SagaManager`] drives instances end to end: it sends step commands,
//!   consumes replies, discards duplicates and compensates in reverse order
//!   when a step fails

pub mod actions;
pub mod config;
pub mod definition;
pub mod error;
pub mod execution_state;
pub mod executor;
pub mod headers;
pub mod instance;
pub mod manager;
pub mod state;
pub mod step;

pub use actions::SagaActions;
pub use config::SagaConfig;
pub use definition::SagaDefinition;
pub use error::SagaError;
pub use execution_state::SagaExecutionState;
pub use executor::StepToExecute;
pub use headers::{SagaCommandHeaders, SagaReplyHeaders};
pub use instance::SagaInstance;
pub use manager::SagaManager;
pub use state::SagaState;
pub use step::{CommandWithDestination, LocalStep, RemoteStep, SagaStep, StepOutcome};
