//! Shared types for the saga orchestration crates.

pub mod types;

pub use types::SagaId;
