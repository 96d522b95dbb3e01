//! Typed error hierarchy for anvil.
//!
//! Four top-level enums cover the subsystems:
//! - `PlanError` — plan store lookups and plan lifecycle transitions
//! - `MemoryError` — memory store lookups and persistence
//! - `PhaseError` — failures captured while running a single phase
//! - `WorkflowError` — invalid workflow control operations

use thiserror::Error;

/// Errors from the plan store and plan lifecycle.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan {id} not found")]
    NotFound { id: String },

    #[error("Phase {phase} not found in plan {plan_id}")]
    PhaseNotFound { plan_id: String, phase: u32 },

    #[error("Plan {id} is not active (status: {status})")]
    NotActive { id: String, status: String },

    #[error("Plan {id} phases must be numbered 1 to {expected} without gaps (found {found})")]
    PhaseNumbering {
        id: String,
        expected: usize,
        found: String,
    },

    #[error("Invalid plan transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to persist plan: {0}")]
    Persist(#[source] anyhow::Error),
}

/// Errors from the memory store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory {id} not found")]
    NotFound { id: String },

    #[error("Memory store lock poisoned")]
    LockPoisoned,

    #[error("Failed to persist memory store: {0}")]
    Persist(#[source] anyhow::Error),
}

/// Errors captured while executing a phase. These never escape the phase
/// executor; they are rendered into the phase result.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Generation returned no content")]
    NoContent { task_id: String },

    #[error("Generation session error: {0}")]
    Session(#[source] anyhow::Error),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Cancelled before task {task_id}")]
    Cancelled { task_id: String },
}

/// Errors from workflow control operations (start/abort/retry/skip).
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Cannot {operation} workflow in state {state}")]
    InvalidState { operation: String, state: String },

    #[error("Task {task_id} exhausted its retry budget after {attempts} attempts")]
    RetryBudgetExhausted { task_id: String, attempts: u32 },

    #[error("Nothing to retry: no failed step recorded")]
    NothingToRetry,

    #[error(transparent)]
    Plan(#[from] PlanError),
}
