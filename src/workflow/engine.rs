//! Workflow orchestrator: drives a plan through
//! Planning → Design → Implementation → Testing → Validation → Review.
//!
//! Control calls (`start`, `retry_current_step`, `skip_current_step`) perform
//! the state transition synchronously and then spawn the remaining stages,
//! returning the `JoinHandle` for the run's `WorkflowOutcome`. `abort` flips
//! the state to Aborted and cancels the shared token; the running stage
//! notices at its next checkpoint.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::stage::{StageHook, StageReport, WorkflowState};
use crate::agents::AgentConfig;
use crate::errors::WorkflowError;
use crate::events::{DEFAULT_EVENT_CAPACITY, EventBus, WorkflowEvent};
use crate::memory::MemorySearch;
use crate::orchestrator::{PhaseExecutor, PlanExecutor, PlanResult, RetryPolicy};
use crate::plan::{
    ImplementationPlan, PhaseStatus, PlanStore, TaskStatus, check_structure, coverage_report,
};
use crate::session::GenerationClient;
use crate::tracker::VersionControl;

/// Final (or current) view of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub workflow_id: String,
    pub plan_id: String,
    pub state: WorkflowState,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub stage_reports: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_result: Option<PlanResult>,
}

#[derive(Debug, Default)]
struct Progress {
    state: WorkflowState,
    failed_stage: Option<WorkflowState>,
    error: Option<String>,
    warnings: Vec<String>,
    reports: Vec<StageReport>,
    plan_result: Option<PlanResult>,
}

struct Inner {
    id: String,
    plan_id: String,
    plan: tokio::sync::Mutex<ImplementationPlan>,
    agent: AgentConfig,
    executor: PlanExecutor,
    store: Option<Arc<PlanStore>>,
    hooks: HashMap<WorkflowState, Arc<dyn StageHook>>,
    retry: RetryPolicy,
    progress: Mutex<Progress>,
    control: tokio::sync::Mutex<()>,
    events: EventBus,
    cancel: CancellationToken,
}

pub struct WorkflowBuilder {
    plan: ImplementationPlan,
    generation: Arc<dyn GenerationClient>,
    vcs: Arc<dyn VersionControl>,
    agent: AgentConfig,
    memory: Option<Arc<dyn MemorySearch>>,
    store: Option<Arc<PlanStore>>,
    hooks: HashMap<WorkflowState, Arc<dyn StageHook>>,
    retry: RetryPolicy,
    search_limit: Option<usize>,
    commit_prefix: Option<String>,
    event_capacity: usize,
}

impl WorkflowBuilder {
    pub fn agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemorySearch>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn plan_store(mut self, store: Arc<PlanStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a hook to the design, testing or review stage. Other stages
    /// ignore hooks.
    pub fn stage_hook(mut self, stage: WorkflowState, hook: Arc<dyn StageHook>) -> Self {
        if stage.is_hooked() {
            self.hooks.insert(stage, hook);
        } else {
            warn!("Ignoring hook for {} stage; only design, testing and review take hooks", stage);
        }
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn search_limit(mut self, limit: usize) -> Self {
        self.search_limit = Some(limit);
        self
    }

    pub fn commit_prefix(mut self, prefix: &str) -> Self {
        self.commit_prefix = Some(prefix.to_string());
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> WorkflowOrchestrator {
        let events = EventBus::new(self.event_capacity);
        let cancel = CancellationToken::new();

        let mut phases = PhaseExecutor::new(self.generation, self.vcs)
            .with_events(events.clone())
            .with_cancellation(cancel.clone());
        if let Some(memory) = self.memory {
            phases = phases.with_memory(memory);
        }
        if let Some(limit) = self.search_limit {
            phases = phases.with_search_limit(limit);
        }
        if let Some(prefix) = &self.commit_prefix {
            phases = phases.with_commit_prefix(prefix);
        }
        let mut executor = PlanExecutor::new(phases);
        if let Some(store) = &self.store {
            executor = executor.with_store(store.clone());
        }

        WorkflowOrchestrator {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                plan_id: self.plan.id.clone(),
                plan: tokio::sync::Mutex::new(self.plan),
                agent: self.agent,
                executor,
                store: self.store,
                hooks: self.hooks,
                retry: self.retry,
                progress: Mutex::new(Progress::default()),
                control: tokio::sync::Mutex::new(()),
                events,
                cancel,
            }),
        }
    }
}

/// Cloneable handle onto one workflow.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl WorkflowOrchestrator {
    pub fn builder(
        plan: ImplementationPlan,
        generation: Arc<dyn GenerationClient>,
        vcs: Arc<dyn VersionControl>,
    ) -> WorkflowBuilder {
        WorkflowBuilder {
            plan,
            generation,
            vcs,
            agent: AgentConfig::default(),
            memory: None,
            store: None,
            hooks: HashMap::new(),
            retry: RetryPolicy::default(),
            search_limit: None,
            commit_prefix: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.progress().state
    }

    pub fn outcome(&self) -> WorkflowOutcome {
        self.inner.snapshot()
    }

    /// Copy of the plan as of the last completed stage.
    pub async fn plan(&self) -> ImplementationPlan {
        self.inner.plan.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.inner.events.subscribe()
    }

    /// Begin execution. Valid only from Pending.
    pub fn start(&self) -> Result<JoinHandle<WorkflowOutcome>, WorkflowError> {
        {
            let mut progress = self.inner.progress();
            if progress.state != WorkflowState::Pending {
                return Err(invalid_state("start", progress.state));
            }
            progress.state = WorkflowState::Planning;
        }
        info!("Workflow {} started for plan {}", self.inner.id, self.inner.plan_id);
        self.inner
            .emit_stage_change(WorkflowState::Pending, WorkflowState::Planning);
        Ok(self.spawn(WorkflowState::Planning))
    }

    /// Request cancellation and move to Aborted. Valid in any non-terminal
    /// state.
    pub fn abort(&self) -> Result<(), WorkflowError> {
        let from = {
            let mut progress = self.inner.progress();
            if progress.state.is_terminal() {
                return Err(invalid_state("abort", progress.state));
            }
            let from = progress.state;
            progress.state = WorkflowState::Aborted;
            progress.error = Some("Aborted by request".to_string());
            from
        };
        self.inner.cancel.cancel();
        info!("Workflow {} aborted during {}", self.inner.id, from);
        self.inner.emit_stage_change(from, WorkflowState::Aborted);
        self.inner.events.emit(WorkflowEvent::WorkflowFinished {
            workflow_id: self.inner.id.clone(),
            state: WorkflowState::Aborted,
            error: Some("Aborted by request".to_string()),
        });
        Ok(())
    }

    /// Re-run the failed step. For Implementation, failed tasks carry their
    /// last error into the next attempt and the attempt budget is enforced.
    pub async fn retry_current_step(&self) -> Result<JoinHandle<WorkflowOutcome>, WorkflowError> {
        let _control = self.inner.control.lock().await;
        let stage = self.inner.failed_stage("retry")?;

        let mut phase = None;
        if stage == WorkflowState::Implementation {
            let mut plan = self.inner.plan.lock().await;
            let number = failed_phase(&plan).ok_or(WorkflowError::NothingToRetry)?;
            if let Some(failed) = plan.phase(number) {
                self.inner.retry.check_phase(failed)?;
            }
            if let Some(failed) = plan.phase_mut(number) {
                for task in &mut failed.tasks {
                    match task.status {
                        TaskStatus::Failed => {
                            let error = task.error.clone().unwrap_or_else(|| "unknown error".into());
                            task.status = TaskStatus::Retrying;
                            task.context = Some(format!("Previous attempt failed: {}", error));
                        }
                        TaskStatus::InProgress => task.status = TaskStatus::NotStarted,
                        _ => {}
                    }
                }
                failed.status = PhaseStatus::NotStarted;
                failed.started_at = None;
                failed.completed_at = None;
            }
            plan.current_phase = number;
            plan.reactivate()?;
            self.inner.save(&plan);
            phase = Some(number);
        }

        self.inner.resume_from_failed(stage)?;
        info!("Workflow {} retrying {}", self.inner.id, stage);
        self.inner.events.emit(WorkflowEvent::StepRetried {
            workflow_id: self.inner.id.clone(),
            stage,
            phase,
        });
        self.inner.emit_stage_change(WorkflowState::Failed, stage);
        Ok(self.spawn(stage))
    }

    /// Skip the failed step and continue. For Implementation, the failed
    /// phase and its unfinished tasks are marked Skipped.
    pub async fn skip_current_step(&self) -> Result<JoinHandle<WorkflowOutcome>, WorkflowError> {
        let _control = self.inner.control.lock().await;
        let stage = self.inner.failed_stage("skip")?;

        let (next, phase) = if stage == WorkflowState::Implementation {
            let mut plan = self.inner.plan.lock().await;
            let number = failed_phase(&plan).ok_or(WorkflowError::NothingToRetry)?;
            if let Some(failed) = plan.phase_mut(number) {
                for task in &mut failed.tasks {
                    if task.status != TaskStatus::Completed {
                        task.status = TaskStatus::Skipped;
                    }
                }
                failed.status = PhaseStatus::Skipped;
                failed.completed_at = Some(Utc::now());
            }
            plan.advance_past(number);
            plan.reactivate()?;
            self.inner.save(&plan);
            (Some(WorkflowState::Implementation), Some(number))
        } else {
            let mut report = StageReport::passed(stage);
            report.skipped = true;
            report.message = Some("Skipped by request".to_string());
            self.inner.progress().reports.push(report);
            (stage.next_stage(), None)
        };

        self.inner.events.emit(WorkflowEvent::StepSkipped {
            workflow_id: self.inner.id.clone(),
            stage,
            phase,
        });
        info!("Workflow {} skipped {}", self.inner.id, stage);

        match next {
            Some(next) => {
                self.inner.resume_from_failed(next)?;
                self.inner.emit_stage_change(WorkflowState::Failed, next);
                Ok(self.spawn(next))
            }
            None => {
                self.inner.resume_from_failed(WorkflowState::Failed)?;
                let inner = self.inner.clone();
                Ok(tokio::spawn(async move { inner.finish() }))
            }
        }
    }

    fn spawn(&self, first: WorkflowState) -> JoinHandle<WorkflowOutcome> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_from(first).await })
    }
}

fn invalid_state(operation: &str, state: WorkflowState) -> WorkflowError {
    WorkflowError::InvalidState {
        operation: operation.to_string(),
        state: state.to_string(),
    }
}

/// The first Failed phase in numeric order.
fn failed_phase(plan: &ImplementationPlan) -> Option<u32> {
    plan.phase_numbers()
        .into_iter()
        .find(|n| plan.phase(*n).is_some_and(|p| p.status == PhaseStatus::Failed))
}

impl Inner {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> WorkflowOutcome {
        let progress = self.progress();
        WorkflowOutcome {
            workflow_id: self.id.clone(),
            plan_id: self.plan_id.clone(),
            state: progress.state,
            success: progress.state == WorkflowState::Complete,
            failed_stage: progress.failed_stage,
            error: progress.error.clone(),
            warnings: progress.warnings.clone(),
            stage_reports: progress.reports.clone(),
            plan_result: progress.plan_result.clone(),
        }
    }

    fn emit_stage_change(&self, from: WorkflowState, to: WorkflowState) {
        self.events.emit(WorkflowEvent::StageChanged {
            workflow_id: self.id.clone(),
            from,
            to,
        });
    }

    fn save(&self, plan: &ImplementationPlan) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(plan)
        {
            warn!("Failed to save plan {}: {}", plan.id, e);
        }
    }

    fn failed_stage(&self, operation: &str) -> Result<WorkflowState, WorkflowError> {
        let progress = self.progress();
        if progress.state != WorkflowState::Failed {
            return Err(invalid_state(operation, progress.state));
        }
        progress.failed_stage.ok_or(WorkflowError::NothingToRetry)
    }

    /// Leave Failed for `to`, clearing the recorded failure.
    fn resume_from_failed(&self, to: WorkflowState) -> Result<(), WorkflowError> {
        let mut progress = self.progress();
        if progress.state != WorkflowState::Failed {
            return Err(invalid_state("resume", progress.state));
        }
        progress.state = to;
        progress.failed_stage = None;
        progress.error = None;
        Ok(())
    }

    /// Move into the next stage unless the workflow was aborted.
    fn enter(&self, stage: WorkflowState) -> bool {
        let from = {
            let mut progress = self.progress();
            if progress.state == WorkflowState::Aborted {
                return false;
            }
            let from = progress.state;
            progress.state = stage;
            from
        };
        info!("Workflow {}: {} -> {}", self.id, from, stage);
        self.emit_stage_change(from, stage);
        true
    }

    async fn run_from(&self, first: WorkflowState) -> WorkflowOutcome {
        let mut current = first;
        loop {
            let report = self.run_stage(current).await;
            for warning in &report.warnings {
                self.events.emit(WorkflowEvent::StageWarning {
                    workflow_id: self.id.clone(),
                    stage: current,
                    message: warning.clone(),
                });
            }
            let success = report.success;
            let message = report.message.clone();
            {
                let mut progress = self.progress();
                progress.warnings.extend(report.warnings.iter().cloned());
                progress.reports.push(report);
            }

            if !success {
                let message = message.unwrap_or_else(|| format!("{} stage failed", current));
                self.fail(current, &message);
                return self.snapshot();
            }

            match current.next_stage() {
                Some(next) => {
                    if !self.enter(next) {
                        return self.snapshot();
                    }
                    current = next;
                }
                None => break,
            }
        }
        self.finish()
    }

    async fn run_stage(&self, stage: WorkflowState) -> StageReport {
        match stage {
            WorkflowState::Planning => {
                let plan = self.plan.lock().await;
                let check = check_structure(&plan);
                if check.is_ok() {
                    StageReport::passed(stage).with_warnings(check.warnings)
                } else {
                    StageReport::failed(stage, check.errors.join("; ")).with_warnings(check.warnings)
                }
            }
            WorkflowState::Implementation => {
                let mut plan = self.plan.lock().await.clone();
                let result = self.executor.execute_plan(&mut plan, &self.agent).await;
                *self.plan.lock().await = plan;

                let report = if result.success {
                    StageReport::passed(stage)
                } else {
                    StageReport::failed(
                        stage,
                        result
                            .error
                            .clone()
                            .unwrap_or_else(|| "Plan execution failed".to_string()),
                    )
                };
                self.progress().plan_result = Some(result);
                report
            }
            WorkflowState::Validation => {
                let plan = self.plan.lock().await;
                StageReport::passed(stage).with_warnings(coverage_report(&plan))
            }
            WorkflowState::Design | WorkflowState::Testing | WorkflowState::Review => {
                let Some(hook) = self.hooks.get(&stage) else {
                    return StageReport::passed(stage);
                };
                let plan = self.plan.lock().await.clone();
                match hook.run(stage, &plan).await {
                    Ok(report) => report,
                    Err(e) => StageReport::failed(stage, format!("{:#}", e)),
                }
            }
            WorkflowState::Pending
            | WorkflowState::Complete
            | WorkflowState::Failed
            | WorkflowState::Aborted => StageReport::passed(stage),
        }
    }

    fn fail(&self, stage: WorkflowState, message: &str) {
        {
            let mut progress = self.progress();
            if progress.state == WorkflowState::Aborted {
                return;
            }
            progress.state = WorkflowState::Failed;
            progress.failed_stage = Some(stage);
            progress.error = Some(message.to_string());
        }
        warn!("Workflow {} failed at {}: {}", self.id, stage, message);
        self.emit_stage_change(stage, WorkflowState::Failed);
        self.events.emit(WorkflowEvent::WorkflowFinished {
            workflow_id: self.id.clone(),
            state: WorkflowState::Failed,
            error: Some(message.to_string()),
        });
    }

    fn finish(&self) -> WorkflowOutcome {
        let from = {
            let mut progress = self.progress();
            if progress.state == WorkflowState::Aborted {
                None
            } else {
                let from = progress.state;
                progress.state = WorkflowState::Complete;
                Some(from)
            }
        };
        if let Some(from) = from {
            info!("Workflow {} complete", self.id);
            self.emit_stage_change(from, WorkflowState::Complete);
            self.events.emit(WorkflowEvent::WorkflowFinished {
                workflow_id: self.id.clone(),
                state: WorkflowState::Complete,
                error: None,
            });
        }
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Phase, Task};
    use crate::testing::{RecordingVcs, ScriptedGeneration};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn plan(tasks_per_phase: &[usize]) -> ImplementationPlan {
        let phases = tasks_per_phase
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let number = i as u32 + 1;
                let tasks = (1..=*n)
                    .map(|t| Task::new(&format!("{}.{}", number, t), "implement"))
                    .collect();
                let mut phase = Phase::new(number, &format!("Phase {}", number), tasks);
                phase.acceptance_criteria = vec!["it works".into()];
                phase
            })
            .collect();
        ImplementationPlan::new("feature", PathBuf::from("/repo"), phases)
    }

    fn workflow(plan: ImplementationPlan, generation: Arc<ScriptedGeneration>) -> WorkflowBuilder {
        WorkflowOrchestrator::builder(plan, generation, Arc::new(RecordingVcs::new()))
    }

    /// Fails the first `failures` runs, then passes.
    struct FlakyHook {
        failures: usize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl StageHook for FlakyHook {
        async fn run(&self, stage: WorkflowState, _plan: &ImplementationPlan) -> Result<StageReport> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                Ok(StageReport::failed(stage, "suite red"))
            } else {
                Ok(StageReport::passed(stage))
            }
        }
    }

    /// Blocks until released.
    struct GateHook {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl StageHook for GateHook {
        async fn run(&self, stage: WorkflowState, _plan: &ImplementationPlan) -> Result<StageReport> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(StageReport::passed(stage))
        }
    }

    #[tokio::test]
    async fn test_happy_path_runs_every_stage() {
        let generation = Arc::new(ScriptedGeneration::new());
        let wf = workflow(plan(&[1, 2]), generation.clone()).build();
        let mut rx = wf.subscribe();

        let outcome = wf.start().unwrap().await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Complete);
        assert!(outcome.success);
        assert!(outcome.warnings.is_empty());
        assert_eq!(generation.prompts().len(), 3);

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::StageChanged { to, .. } = event {
                stages.push(to);
            }
        }
        assert_eq!(
            stages,
            vec![
                WorkflowState::Planning,
                WorkflowState::Design,
                WorkflowState::Implementation,
                WorkflowState::Testing,
                WorkflowState::Validation,
                WorkflowState::Review,
                WorkflowState::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_planning_rejects_empty_plan() {
        let generation = Arc::new(ScriptedGeneration::new());
        let wf = workflow(plan(&[]), generation.clone()).build();
        let outcome = wf.start().unwrap().await.unwrap();

        assert_eq!(outcome.state, WorkflowState::Failed);
        assert_eq!(outcome.failed_stage, Some(WorkflowState::Planning));
        assert!(outcome.error.unwrap().contains("no phases"));
        assert_eq!(generation.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let wf = workflow(plan(&[1]), Arc::new(ScriptedGeneration::new())).build();
        let handle = wf.start().unwrap();
        assert!(matches!(wf.start(), Err(WorkflowError::InvalidState { .. })));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_requires_failed_state() {
        let wf = workflow(plan(&[1]), Arc::new(ScriptedGeneration::new())).build();
        assert!(matches!(
            wf.retry_current_step().await,
            Err(WorkflowError::InvalidState { .. })
        ));
        assert!(matches!(
            wf.skip_current_step().await,
            Err(WorkflowError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_implementation_carries_failure_context() {
        let generation = Arc::new(ScriptedGeneration::new().reply("a").empty());
        let wf = workflow(plan(&[1, 1]), generation.clone()).build();

        let failed = wf.start().unwrap().await.unwrap();
        assert_eq!(failed.state, WorkflowState::Failed);
        assert_eq!(failed.failed_stage, Some(WorkflowState::Implementation));

        let handle = wf.retry_current_step().await.unwrap();
        assert_eq!(wf.state(), WorkflowState::Implementation);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Complete);

        let plan = wf.plan().await;
        let retried = &plan.phases[1].tasks[0];
        assert_eq!(retried.attempts, 2);
        assert_eq!(
            retried.context.as_deref(),
            Some("Previous attempt failed: Generation returned no content")
        );
        assert_eq!(plan.phases[0].tasks[0].attempts, 1);
        assert!(generation.prompts()[2].contains("Previous attempt failed"));
    }

    #[tokio::test]
    async fn test_retry_budget_is_enforced() {
        let generation = Arc::new(ScriptedGeneration::new().empty());
        let wf = workflow(plan(&[1]), generation)
            .retry_policy(RetryPolicy::new(1))
            .build();
        wf.start().unwrap().await.unwrap();

        match wf.retry_current_step().await {
            Err(WorkflowError::RetryBudgetExhausted { task_id, attempts }) => {
                assert_eq!(task_id, "1.1");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected exhausted budget, got {:?}", other.map(|_| ())),
        }
        assert_eq!(wf.state(), WorkflowState::Failed);
    }

    #[tokio::test]
    async fn test_skip_failed_phase_continues() {
        let generation = Arc::new(ScriptedGeneration::new().empty());
        let wf = workflow(plan(&[2, 1]), generation).build();
        wf.start().unwrap().await.unwrap();

        let outcome = wf.skip_current_step().await.unwrap().await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Complete);
        assert!(outcome.warnings.iter().any(|w| w.contains("Phase 1 skipped 2 of 2")));

        let plan = wf.plan().await;
        assert_eq!(plan.phases[0].status, PhaseStatus::Skipped);
        assert!(plan.phases[0].tasks.iter().all(|t| t.status == TaskStatus::Skipped));
        assert_eq!(plan.phases[1].status, PhaseStatus::Completed);
        assert_eq!(plan.current_phase, 3);
    }

    #[tokio::test]
    async fn test_failing_hook_then_retry_stage() {
        let hook = Arc::new(FlakyHook {
            failures: 1,
            runs: AtomicUsize::new(0),
        });
        let generation = Arc::new(ScriptedGeneration::new());
        let wf = workflow(plan(&[1]), generation.clone())
            .stage_hook(WorkflowState::Testing, hook.clone())
            .build();

        let failed = wf.start().unwrap().await.unwrap();
        assert_eq!(failed.failed_stage, Some(WorkflowState::Testing));
        assert_eq!(failed.error.as_deref(), Some("suite red"));

        let outcome = wf.retry_current_step().await.unwrap().await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Complete);
        assert_eq!(hook.runs.load(Ordering::SeqCst), 2);
        // Implementation is not re-run when retrying a later stage
        assert_eq!(generation.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_failing_stage_advances() {
        let hook = Arc::new(FlakyHook {
            failures: usize::MAX,
            runs: AtomicUsize::new(0),
        });
        let wf = workflow(plan(&[1]), Arc::new(ScriptedGeneration::new()))
            .stage_hook(WorkflowState::Review, hook)
            .build();
        wf.start().unwrap().await.unwrap();
        assert_eq!(wf.outcome().failed_stage, Some(WorkflowState::Review));

        let outcome = wf.skip_current_step().await.unwrap().await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Complete);
        assert!(outcome.stage_reports.iter().any(|r| r.skipped && r.stage == WorkflowState::Review));
    }

    #[tokio::test]
    async fn test_abort_during_design_stops_before_implementation() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let generation = Arc::new(ScriptedGeneration::new());
        let wf = workflow(plan(&[1]), generation.clone())
            .stage_hook(
                WorkflowState::Design,
                Arc::new(GateHook {
                    entered: entered.clone(),
                    release: release.clone(),
                }),
            )
            .build();

        let handle = wf.start().unwrap();
        entered.notified().await;
        wf.abort().unwrap();
        release.notify_one();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Aborted);
        assert_eq!(generation.sessions_created(), 0);
        assert!(matches!(wf.abort(), Err(WorkflowError::InvalidState { .. })));
        assert!(matches!(
            wf.retry_current_step().await,
            Err(WorkflowError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_abort_from_failed_state() {
        let wf = workflow(plan(&[1]), Arc::new(ScriptedGeneration::new().empty())).build();
        wf.start().unwrap().await.unwrap();
        wf.abort().unwrap();
        assert_eq!(wf.state(), WorkflowState::Aborted);
    }

    #[tokio::test]
    async fn test_planning_warnings_are_reported() {
        let mut p = plan(&[1]);
        p.phases[0].acceptance_criteria.clear();
        let wf = workflow(p, Arc::new(ScriptedGeneration::new())).build();
        let mut rx = wf.subscribe();
        let outcome = wf.start().unwrap().await.unwrap();

        assert!(outcome.success);
        assert!(outcome.warnings.iter().any(|w| w.contains("no acceptance criteria")));
        let mut saw_warning = false;
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::StageWarning { stage, .. } = event {
                assert_eq!(stage, WorkflowState::Planning);
                saw_warning = true;
            }
        }
        assert!(saw_warning);
    }
}
