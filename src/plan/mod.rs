//! Plan store: implementation plans, their phases and tasks.
//!
//! - [`types`] — `ImplementationPlan`, `Phase`, `Task` and their status enums
//! - [`draft`] — `PlanDraft`, materialized into numbered plans
//! - [`check`] — structural checks and the post-run coverage report
//! - [`store`] — `PlanStore`, JSON-backed with a current-plan pointer

pub mod check;
pub mod draft;
pub mod store;
pub mod types;

pub use check::{PlanCheck, check_structure, coverage_report};
pub use draft::{PhaseDraft, PlanDraft, TaskDraft};
pub use store::PlanStore;
pub use types::{ImplementationPlan, Phase, PhaseStatus, PlanStatus, Task, TaskStatus};
