//! Runs a full plan phase by phase, halting on the first failure.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::phase::PhaseExecutor;
use super::state::PlanResult;
use crate::agents::AgentConfig;
use crate::errors::PlanError;
use crate::events::WorkflowEvent;
use crate::plan::{ImplementationPlan, PlanStatus, PlanStore};

pub struct PlanExecutor {
    phases: PhaseExecutor,
    store: Option<Arc<PlanStore>>,
}

impl PlanExecutor {
    pub fn new(phases: PhaseExecutor) -> Self {
        Self {
            phases,
            store: None,
        }
    }

    /// Checkpoint the plan into `store` after every phase.
    pub fn with_store(mut self, store: Arc<PlanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn phase_executor(&self) -> &PhaseExecutor {
        &self.phases
    }

    pub async fn execute_plan(
        &self,
        plan: &mut ImplementationPlan,
        agent: &AgentConfig,
    ) -> PlanResult {
        let start = Instant::now();
        let mut result = PlanResult {
            plan_id: plan.id.clone(),
            success: false,
            status: plan.status,
            phase_results: Vec::new(),
            failed_phase: None,
            error: None,
            cancelled: false,
            duration: std::time::Duration::ZERO,
        };

        if plan.status != PlanStatus::Active {
            let error = PlanError::NotActive {
                id: plan.id.clone(),
                status: plan.status.to_string(),
            };
            warn!("{}", error);
            result.error = Some(error.to_string());
            return result;
        }

        if !plan.has_contiguous_numbering() {
            let found: Vec<String> = plan.phase_numbers().iter().map(u32::to_string).collect();
            let error = PlanError::PhaseNumbering {
                id: plan.id.clone(),
                expected: plan.total_phases(),
                found: found.join(", "),
            };
            warn!("{}", error);
            result.error = Some(error.to_string());
            return result;
        }

        let events = self.phases.events();
        let cancel = self.phases.cancellation();
        info!(
            "Executing plan {} ({} phases)",
            plan.id,
            plan.total_phases()
        );

        for number in plan.phase_numbers() {
            if plan.phase(number).is_some_and(|p| p.status.is_done()) {
                continue;
            }

            if cancel.is_cancelled() {
                info!("Plan {} cancelled before phase {}", plan.id, number);
                self.cancel_plan(plan, &mut result, &format!("Cancelled before phase {}", number));
                result.duration = start.elapsed();
                return result;
            }

            let phase_result = self.phases.execute_phase(plan, number, agent).await;
            let success = phase_result.success;
            let cancelled = phase_result.cancelled;
            let error = phase_result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            result.phase_results.push(phase_result);

            if cancelled {
                self.cancel_plan(plan, &mut result, &error);
                result.failed_phase = Some(number);
                result.duration = start.elapsed();
                return result;
            }

            if !success {
                let name = plan.phase(number).map(|p| p.name.clone()).unwrap_or_default();
                let reason = format!("Phase {} ({}) failed: {}", number, name, error);
                plan.current_phase = number;
                plan.mark_failed(&reason);
                self.checkpoint(plan);

                warn!("Plan {} failed: {}", plan.id, reason);
                events.emit(WorkflowEvent::PlanFailed {
                    plan_id: plan.id.clone(),
                    phase: number,
                    reason: reason.clone(),
                });
                result.status = plan.status;
                result.failed_phase = Some(number);
                result.error = Some(reason);
                result.duration = start.elapsed();
                return result;
            }

            plan.advance_past(number);
            self.checkpoint(plan);
        }

        plan.current_phase = plan.total_phases() as u32 + 1;
        plan.mark_completed();
        self.checkpoint(plan);
        info!("Plan {} completed", plan.id);
        events.emit(WorkflowEvent::PlanCompleted {
            plan_id: plan.id.clone(),
        });

        result.success = true;
        result.status = plan.status;
        result.duration = start.elapsed();
        result
    }

    fn cancel_plan(&self, plan: &mut ImplementationPlan, result: &mut PlanResult, reason: &str) {
        if let Err(e) = plan.cancel() {
            warn!("Could not mark plan {} cancelled: {}", plan.id, e);
        }
        plan.failure_reason = Some(reason.to_string());
        self.checkpoint(plan);
        self.phases.events().emit(WorkflowEvent::PlanCancelled {
            plan_id: plan.id.clone(),
        });
        result.cancelled = true;
        result.status = plan.status;
        result.error = Some(reason.to_string());
    }

    /// Persistence failures are logged; the in-memory plan stays authoritative.
    fn checkpoint(&self, plan: &ImplementationPlan) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(plan)
        {
            warn!("Failed to checkpoint plan {}: {}", plan.id, e);
        }
    }
}
