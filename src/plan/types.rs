//! Plan, phase and task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agents::AgentRole;
use crate::errors::PlanError;

/// Lifecycle of an implementation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No phase executes once a plan reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Blocked,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Completed or skipped phases are not executed again.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    InReview,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Retrying => "retrying",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Smallest unit of generation-session interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Hierarchical id, e.g. "2.3" for the third task of phase 2
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub target_files: Vec<String>,
    #[serde(default)]
    pub integration_points: Vec<String>,
    #[serde(default)]
    pub role: AgentRole,
    /// Free-text complexity tag ("low", "high", "needs research", ...)
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Execution attempts. Never reset.
    #[serde(default)]
    pub attempts: u32,
    /// Context carried into the next attempt, e.g. prior failure feedback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            target_files: Vec::new(),
            integration_points: Vec::new(),
            role: AgentRole::default(),
            complexity: String::new(),
            status: TaskStatus::NotStarted,
            attempts: 0,
            context: None,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.attempts += 1;
    }

    pub(crate) fn complete(&mut self, output: String) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }
}

/// Checkpointed unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-indexed, unique within a plan
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Declared dependencies. Execution order is by phase number only.
    #[serde(default)]
    pub depends_on: Vec<u32>,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Phase {
    pub fn new(number: u32, name: &str, tasks: Vec<Task>) -> Self {
        Self {
            number,
            name: name.to_string(),
            description: String::new(),
            tasks,
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            status: PhaseStatus::NotStarted,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// First task in Failed state, if any.
    pub fn failed_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Failed)
    }
}

/// Ordered set of phases implementing a feature or app request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub id: String,
    /// Owning app/feature identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub repository_path: PathBuf,
    pub phases: Vec<Phase>,
    /// 1-indexed; never exceeds `phases.len() + 1`
    pub current_phase: u32,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImplementationPlan {
    pub fn new(title: &str, repository_path: PathBuf, phases: Vec<Phase>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            feature_id: None,
            title: title.to_string(),
            repository_path,
            phases,
            current_phase: 1,
            status: PlanStatus::Active,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn total_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn phase(&self, number: u32) -> Option<&Phase> {
        self.phases.iter().find(|p| p.number == number)
    }

    pub fn phase_mut(&mut self, number: u32) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.number == number)
    }

    /// Phase numbers in ascending order.
    pub fn phase_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.phases.iter().map(|p| p.number).collect();
        numbers.sort_unstable();
        numbers
    }

    /// Phase numbers are exactly `1..=total_phases`, in any stored order.
    pub fn has_contiguous_numbering(&self) -> bool {
        self.phase_numbers()
            .into_iter()
            .eq(1..=self.total_phases() as u32)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Advance past `phase_number`, clamped to `total_phases + 1`.
    pub(crate) fn advance_past(&mut self, phase_number: u32) {
        let ceiling = self.total_phases() as u32 + 1;
        self.current_phase = (phase_number + 1).min(ceiling);
        self.touch();
    }

    pub(crate) fn mark_failed(&mut self, reason: &str) {
        self.status = PlanStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.touch();
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = PlanStatus::Completed;
        self.failure_reason = None;
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    pub fn pause(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Active, PlanStatus::Paused)
    }

    pub fn resume(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Paused, PlanStatus::Active)
    }

    pub fn cancel(&mut self) -> Result<(), PlanError> {
        if self.status.is_terminal() {
            return Err(PlanError::InvalidTransition {
                from: self.status.to_string(),
                to: PlanStatus::Cancelled.to_string(),
            });
        }
        self.status = PlanStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Explicitly bring a failed or cancelled plan back to Active so an
    /// operator-driven retry or skip can resume execution.
    pub fn reactivate(&mut self) -> Result<(), PlanError> {
        match self.status {
            PlanStatus::Failed | PlanStatus::Cancelled | PlanStatus::Paused => {
                self.status = PlanStatus::Active;
                self.failure_reason = None;
                self.touch();
                Ok(())
            }
            PlanStatus::Active => Ok(()),
            PlanStatus::Completed => Err(PlanError::InvalidTransition {
                from: self.status.to_string(),
                to: PlanStatus::Active.to_string(),
            }),
        }
    }

    fn transition(&mut self, from: PlanStatus, to: PlanStatus) -> Result<(), PlanError> {
        if self.status != from {
            return Err(PlanError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }
}
