//! Structural checks run during the planning stage, and the coverage report
//! produced during validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::ImplementationPlan;

/// Errors block execution; warnings are reported and execution proceeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PlanCheck {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a plan's structure before execution.
pub fn check_structure(plan: &ImplementationPlan) -> PlanCheck {
    let mut check = PlanCheck::default();

    if plan.phases.is_empty() {
        check.errors.push("Plan has no phases".to_string());
        return check;
    }

    let mut seen = HashSet::new();
    for phase in &plan.phases {
        if phase.number == 0 {
            check
                .errors
                .push(format!("Phase '{}' has number 0; numbers are 1-indexed", phase.name));
        }
        if !seen.insert(phase.number) {
            check
                .errors
                .push(format!("Duplicate phase number {}", phase.number));
        }
    }

    if check.errors.is_empty() && !plan.has_contiguous_numbering() {
        let found: Vec<String> = plan.phase_numbers().iter().map(u32::to_string).collect();
        check.errors.push(format!(
            "Phase numbers must run 1 to {} without gaps (found {})",
            plan.total_phases(),
            found.join(", ")
        ));
    }

    let numbers: HashSet<u32> = plan.phases.iter().map(|p| p.number).collect();
    for phase in &plan.phases {
        for dep in &phase.depends_on {
            if !numbers.contains(dep) {
                check.errors.push(format!(
                    "Phase {} depends on unknown phase {}",
                    phase.number, dep
                ));
            } else if *dep >= phase.number {
                check.warnings.push(format!(
                    "Phase {} depends on phase {}, which runs later; phases execute in numeric order",
                    phase.number, dep
                ));
            }
        }

        let mut task_ids = HashSet::new();
        for task in &phase.tasks {
            if task.description.trim().is_empty() {
                check
                    .errors
                    .push(format!("Task {} has an empty description", task.id));
            }
            if !task_ids.insert(task.id.as_str()) {
                check
                    .errors
                    .push(format!("Duplicate task id {} in phase {}", task.id, phase.number));
            }
        }

        if phase.acceptance_criteria.is_empty() {
            check.warnings.push(format!(
                "Phase {} ({}) has no acceptance criteria",
                phase.number, phase.name
            ));
        }
        if phase.tasks.is_empty() {
            check
                .warnings
                .push(format!("Phase {} ({}) has no tasks", phase.number, phase.name));
        }
    }

    check
}

/// Report phases and tasks that did not reach a done state.
pub fn coverage_report(plan: &ImplementationPlan) -> Vec<String> {
    let mut warnings = Vec::new();
    for phase in &plan.phases {
        if !phase.status.is_done() {
            warnings.push(format!(
                "Phase {} ({}) ended as {}",
                phase.number, phase.name, phase.status
            ));
        }
        for task in &phase.tasks {
            if !task.status.is_done() {
                warnings.push(format!("Task {} ended as {}", task.id, task.status));
            }
        }
        let skipped = phase
            .tasks
            .iter()
            .filter(|t| t.status == super::types::TaskStatus::Skipped)
            .count();
        if skipped > 0 {
            warnings.push(format!(
                "Phase {} skipped {} of {} task(s)",
                phase.number,
                skipped,
                phase.tasks.len()
            ));
        }
    }
    warnings
}
