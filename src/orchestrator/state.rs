//! Result records returned by the phase and plan executors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::plan::PlanStatus;

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    /// Attempt count after this attempt
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ids of memories included in the prompt
    #[serde(default)]
    pub memories_used: Vec<String>,
}

/// Result of executing a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_number: u32,
    pub success: bool,
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
    /// Id of the task that failed, if a task failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl PhaseResult {
    /// Failure result that touched no plan state.
    pub fn rejected(phase_number: u32, error: &str) -> Self {
        Self {
            phase_number,
            success: false,
            task_results: Vec::new(),
            failed_task: None,
            error: Some(error.to_string()),
            commit_sha: None,
            cancelled: false,
            duration: Duration::ZERO,
        }
    }
}

/// Result of executing a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub plan_id: String,
    pub success: bool,
    pub status: PlanStatus,
    #[serde(default)]
    pub phase_results: Vec<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl PlanResult {
    pub fn completed_phases(&self) -> usize {
        self.phase_results.iter().filter(|r| r.success).count()
    }
}

/// Serde helpers for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
