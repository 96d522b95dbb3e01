//! Phase and plan execution.
//!
//! - [`phase`] — `PhaseExecutor`, one phase against one generation session
//! - [`plan`] — `PlanExecutor`, phases in order with halt-on-failure
//! - [`prompt`] — task prompt assembly
//! - [`retry`] — the attempt budget for operator-driven retries
//! - [`state`] — task/phase/plan result records

pub mod phase;
pub mod plan;
pub mod prompt;
pub mod retry;
pub mod state;

pub use phase::PhaseExecutor;
pub use plan::PlanExecutor;
pub use retry::RetryPolicy;
pub use state::{PhaseResult, PlanResult, TaskResult};
