use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;
use crate::plan::{Phase, TaskStatus};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Attempt budget consulted before an operator-requested retry. The
/// executors never retry on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Every failed task in the phase must have budget left.
    pub fn check_phase(&self, phase: &Phase) -> Result<(), WorkflowError> {
        for task in &phase.tasks {
            if task.status == TaskStatus::Failed && !self.allows(task.attempts) {
                return Err(WorkflowError::RetryBudgetExhausted {
                    task_id: task.id.clone(),
                    attempts: task.attempts,
                });
            }
        }
        Ok(())
    }
}
