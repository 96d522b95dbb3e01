//! Workflow state machine on top of plan execution.
//!
//! - [`stage`] — `WorkflowState`, stage reports and stage hooks
//! - [`engine`] — `WorkflowOrchestrator` and its builder

pub mod engine;
pub mod stage;

pub use engine::{WorkflowBuilder, WorkflowOrchestrator, WorkflowOutcome};
pub use stage::{CommandStageHook, StageHook, StageReport, WorkflowState};
