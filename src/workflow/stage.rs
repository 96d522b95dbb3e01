//! Workflow stages and the hooks that can run for them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::plan::ImplementationPlan;

/// Coarse-grained workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Pending,
    Planning,
    Design,
    Implementation,
    Testing,
    Validation,
    Review,
    Complete,
    Failed,
    Aborted,
}

impl WorkflowState {
    /// Stages that do work, in execution order.
    pub const STAGES: [WorkflowState; 6] = [
        WorkflowState::Planning,
        WorkflowState::Design,
        WorkflowState::Implementation,
        WorkflowState::Testing,
        WorkflowState::Validation,
        WorkflowState::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Validation => "validation",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Complete and Aborted accept no further control. Failed can still be
    /// retried, skipped or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }

    pub fn is_stage(&self) -> bool {
        Self::STAGES.contains(self)
    }

    /// Stage that follows this one, or `None` after Review.
    pub fn next_stage(&self) -> Option<WorkflowState> {
        let idx = Self::STAGES.iter().position(|s| s == self)?;
        Self::STAGES.get(idx + 1).copied()
    }

    /// Stages served by an optional `StageHook`.
    pub fn is_hooked(&self) -> bool {
        matches!(self, Self::Design | Self::Testing | Self::Review)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a stage reported back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: WorkflowState,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub skipped: bool,
}

impl StageReport {
    pub fn passed(stage: WorkflowState) -> Self {
        Self {
            stage,
            success: true,
            message: None,
            warnings: Vec::new(),
            skipped: false,
        }
    }

    pub fn failed(stage: WorkflowState, message: impl Into<String>) -> Self {
        Self {
            stage,
            success: false,
            message: Some(message.into()),
            warnings: Vec::new(),
            skipped: false,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Work attached to the design, testing or review stage.
#[async_trait]
pub trait StageHook: Send + Sync {
    async fn run(&self, stage: WorkflowState, plan: &ImplementationPlan) -> Result<StageReport>;
}

/// Runs a shell command in the plan's repository. Exit code 0 passes.
pub struct CommandStageHook {
    command: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandStageHook {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            working_dir: None,
            timeout,
        }
    }

    /// Run somewhere other than the plan's repository.
    pub fn in_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

/// Last few lines of command output for failure messages.
fn tail(output: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl StageHook for CommandStageHook {
    async fn run(&self, stage: WorkflowState, plan: &ImplementationPlan) -> Result<StageReport> {
        let dir = self
            .working_dir
            .clone()
            .unwrap_or_else(|| plan.repository_path.clone());
        info!("Running {} command: {}", stage, self.command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("ANVIL_STAGE", stage.as_str())
            .env("ANVIL_PLAN_ID", &plan.id)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {} command: {}", stage, self.command))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.with_context(|| format!("Failed to wait for {} command", stage))?,
            Err(_) => {
                return Ok(StageReport::failed(
                    stage,
                    format!("{} command timed out after {}s", stage, self.timeout.as_secs()),
                ));
            }
        };

        let code = output.status.code().unwrap_or(-1);
        debug!("{} command exited with {}", stage, code);
        if output.status.success() {
            Ok(StageReport::passed(stage))
        } else {
            let mut message = format!("{} command exited with {}", stage, code);
            let stderr = tail(&output.stderr, 5);
            if !stderr.is_empty() {
                message.push_str(&format!(": {}", stderr));
            }
            Ok(StageReport::failed(stage, message))
        }
    }
}
