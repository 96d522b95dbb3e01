//! Runs one phase: tasks in stored order against a single generation
//! session, then a checkpoint commit.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompt::build_task_prompt;
use super::state::{PhaseResult, TaskResult};
use crate::agents::AgentConfig;
use crate::anvil_config::DEFAULT_SEARCH_LIMIT;
use crate::errors::{PhaseError, PlanError};
use crate::events::{EventBus, WorkflowEvent};
use crate::memory::{Memory, MemorySearch};
use crate::plan::{ImplementationPlan, PhaseStatus};
use crate::session::{GenerationClient, SessionConfig, SessionId};
use crate::tracker::VersionControl;

pub const DEFAULT_COMMIT_PREFIX: &str = "[anvil]";

/// A task that stopped the phase.
struct TaskFailure {
    task_id: String,
    error: PhaseError,
}

pub struct PhaseExecutor {
    generation: Arc<dyn GenerationClient>,
    vcs: Arc<dyn VersionControl>,
    memory: Option<Arc<dyn MemorySearch>>,
    events: EventBus,
    cancel: CancellationToken,
    search_limit: usize,
    commit_prefix: String,
}

impl PhaseExecutor {
    pub fn new(generation: Arc<dyn GenerationClient>, vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            generation,
            vcs,
            memory: None,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            commit_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemorySearch>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_commit_prefix(mut self, prefix: &str) -> Self {
        self.commit_prefix = prefix.to_string();
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute one phase of `plan`. Collaborator failures are captured in the
    /// result; this never returns an error.
    pub async fn execute_phase(
        &self,
        plan: &mut ImplementationPlan,
        phase_number: u32,
        agent: &AgentConfig,
    ) -> PhaseResult {
        let Some(idx) = plan.phases.iter().position(|p| p.number == phase_number) else {
            let error = PlanError::PhaseNotFound {
                plan_id: plan.id.clone(),
                phase: phase_number,
            };
            warn!("{}", error);
            return PhaseResult::rejected(phase_number, &error.to_string());
        };

        let start = Instant::now();
        let plan_id = plan.id.clone();
        let repo = plan.repository_path.clone();
        let phase_name = plan.phases[idx].name.clone();
        {
            let phase = &mut plan.phases[idx];
            phase.status = PhaseStatus::InProgress;
            phase.started_at = Some(Utc::now());
            phase.completed_at = None;
        }
        plan.touch();
        info!("Phase {} ({}) started", phase_number, phase_name);
        self.events.emit(WorkflowEvent::PhaseStarted {
            plan_id: plan_id.clone(),
            phase: phase_number,
            name: phase_name.clone(),
        });

        let mut result = PhaseResult {
            phase_number,
            success: false,
            task_results: Vec::new(),
            failed_task: None,
            error: None,
            commit_sha: None,
            cancelled: false,
            duration: std::time::Duration::ZERO,
        };

        let session = match self
            .generation
            .create_session(SessionConfig {
                working_directory: repo.clone(),
                model: agent.model.clone(),
                system_prompt: Some(agent.system_prompt()),
            })
            .await
        {
            Ok(session) => session,
            Err(e) => {
                let error = PhaseError::Session(e);
                self.finish_failed(plan, idx, &mut result, &error.to_string());
                result.duration = start.elapsed();
                return result;
            }
        };

        let outcome = self
            .run_tasks(plan, idx, &session, agent, &mut result.task_results)
            .await;

        if let Err(e) = self.generation.close(&session).await {
            warn!("Failed to close generation session {}: {:#}", session, e);
        }

        match outcome {
            Ok(()) => {
                let message = format!(
                    "{} phase {}: {}",
                    self.commit_prefix, phase_number, phase_name
                );
                match self.checkpoint(&repo, &message).await {
                    Ok(sha) => {
                        let phase = &mut plan.phases[idx];
                        phase.status = PhaseStatus::Completed;
                        phase.completed_at = Some(Utc::now());
                        plan.touch();
                        result.success = true;
                        result.commit_sha = sha.clone();
                        info!("Phase {} ({}) completed", phase_number, phase_name);
                        self.events.emit(WorkflowEvent::PhaseCompleted {
                            plan_id,
                            phase: phase_number,
                            commit_sha: sha,
                        });
                    }
                    Err(e) => self.finish_failed(plan, idx, &mut result, &e.to_string()),
                }
            }
            Err(failure) => {
                let cancelled = matches!(failure.error, PhaseError::Cancelled { .. });
                let suffix = if cancelled {
                    format!("cancelled before task {}", failure.task_id)
                } else {
                    format!("failed at task {}", failure.task_id)
                };
                let message = format!(
                    "{} phase {}: {} ({})",
                    self.commit_prefix, phase_number, phase_name, suffix
                );
                match self.checkpoint(&repo, &message).await {
                    Ok(sha) => result.commit_sha = sha,
                    Err(e) => warn!("Checkpoint commit for phase {} failed: {}", phase_number, e),
                }

                result.cancelled = cancelled;
                if !cancelled {
                    result.failed_task = Some(failure.task_id);
                }
                self.finish_failed(plan, idx, &mut result, &failure.error.to_string());
            }
        }

        result.duration = start.elapsed();
        result
    }

    async fn run_tasks(
        &self,
        plan: &mut ImplementationPlan,
        idx: usize,
        session: &SessionId,
        agent: &AgentConfig,
        task_results: &mut Vec<TaskResult>,
    ) -> Result<(), TaskFailure> {
        let phase_number = plan.phases[idx].number;

        for t in 0..plan.phases[idx].tasks.len() {
            let task = &plan.phases[idx].tasks[t];
            if task.status.is_done() {
                debug!("Task {} already {}, not re-running", task.id, task.status);
                continue;
            }
            let task_id = task.id.clone();

            if self.cancel.is_cancelled() {
                info!("Cancellation requested before task {}", task_id);
                return Err(TaskFailure {
                    error: PhaseError::Cancelled {
                        task_id: task_id.clone(),
                    },
                    task_id,
                });
            }

            let task = &mut plan.phases[idx].tasks[t];
            task.begin_attempt();
            let attempt = task.attempts;
            let description = task.description.clone();
            debug!("Task {} attempt {}", task_id, attempt);
            self.events.emit(WorkflowEvent::TaskStarted {
                plan_id: plan.id.clone(),
                phase: phase_number,
                task_id: task_id.clone(),
                attempt,
            });

            let memories = self
                .relevant_memories(&plan.repository_path, &description)
                .await;
            let phase = &plan.phases[idx];
            let prompt = build_task_prompt(agent, phase, &phase.tasks[t], &memories);
            let memories_used: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();

            let sent = self.generation.send(session, &prompt).await;
            if sent.is_ok() {
                self.note_memory_use(&memories_used).await;
            }

            let task = &mut plan.phases[idx].tasks[t];
            let error = match sent {
                Ok(response) if !response.is_empty() => {
                    task.complete(response.content.clone());
                    task_results.push(TaskResult {
                        task_id: task_id.clone(),
                        success: true,
                        attempts: attempt,
                        output: Some(response.content),
                        error: None,
                        memories_used,
                    });
                    self.events.emit(WorkflowEvent::TaskCompleted {
                        plan_id: plan.id.clone(),
                        phase: phase_number,
                        task_id,
                    });
                    continue;
                }
                Ok(_) => PhaseError::NoContent {
                    task_id: task_id.clone(),
                },
                Err(e) => PhaseError::Session(e),
            };

            let message = error.to_string();
            task.fail(&message);
            warn!("Task {} failed: {}", task_id, message);
            task_results.push(TaskResult {
                task_id: task_id.clone(),
                success: false,
                attempts: attempt,
                output: None,
                error: Some(message.clone()),
                memories_used,
            });
            self.events.emit(WorkflowEvent::TaskFailed {
                plan_id: plan.id.clone(),
                phase: phase_number,
                task_id: task_id.clone(),
                error: message,
            });
            return Err(TaskFailure { task_id, error });
        }
        Ok(())
    }

    /// Search failures count as no memories.
    async fn relevant_memories(&self, repo: &Path, query: &str) -> Vec<Memory> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        match memory.search(repo, query, self.search_limit).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!("Memory search failed, continuing without memories: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn note_memory_use(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Some(memory) = &self.memory
            && let Err(e) = memory.record_use(ids).await
        {
            warn!("Failed to record memory use: {:#}", e);
        }
    }

    /// Stage and commit. Nothing staged means no commit and no error.
    async fn checkpoint(&self, repo: &Path, message: &str) -> Result<Option<String>, PhaseError> {
        let commit_error = |e: anyhow::Error| PhaseError::Commit(format!("{:#}", e));

        self.vcs.stage_all(repo).await.map_err(commit_error)?;
        let status = self.vcs.status(repo).await.map_err(commit_error)?;
        if status.staged_count == 0 {
            debug!("Nothing staged, skipping commit '{}'", message);
            return Ok(None);
        }

        let outcome = self
            .vcs
            .commit(repo, message, None)
            .await
            .map_err(commit_error)?;
        if outcome.success {
            info!(
                "Committed {}: {}",
                outcome.sha.as_deref().unwrap_or("-"),
                message
            );
            Ok(outcome.sha)
        } else {
            Err(PhaseError::Commit(
                outcome
                    .error
                    .unwrap_or_else(|| "commit was rejected".to_string()),
            ))
        }
    }

    fn finish_failed(
        &self,
        plan: &mut ImplementationPlan,
        idx: usize,
        result: &mut PhaseResult,
        error: &str,
    ) {
        let phase = &mut plan.phases[idx];
        phase.status = PhaseStatus::Failed;
        phase.completed_at = Some(Utc::now());
        let phase_number = phase.number;
        plan.touch();

        warn!("Phase {} failed: {}", phase_number, error);
        result.success = false;
        result.error = Some(error.to_string());
        self.events.emit(WorkflowEvent::PhaseFailed {
            plan_id: plan.id.clone(),
            phase: phase_number,
            error: error.to_string(),
            cancelled: result.cancelled,
        });
    }
}
