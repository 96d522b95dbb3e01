//! End-to-end execution scenarios across the memory store, the executors and
//! the workflow orchestrator, using the scripted doubles.

use anvil::agents::{AgentConfig, ProjectType};
use anvil::memory::{
    CitationInput, CreatedBy, ManualClock, MemoryStatus, MemoryStore, Provenance,
    RecommendedAction,
};
use anvil::orchestrator::prompt::KNOWLEDGE_HEADING;
use anvil::orchestrator::{PhaseExecutor, PlanExecutor};
use anvil::plan::{ImplementationPlan, Phase, PhaseStatus, PlanStatus, PlanStore, Task, TaskStatus};
use anvil::testing::{InMemoryFileSystem, RecordingVcs, ScriptedGeneration};
use anvil::workflow::{WorkflowOrchestrator, WorkflowState};
use chrono::{Duration, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPO: &str = "/repos/shop";

fn phase(number: u32, descriptions: &[&str]) -> Phase {
    let tasks = descriptions
        .iter()
        .enumerate()
        .map(|(i, d)| Task::new(&format!("{}.{}", number, i + 1), d))
        .collect();
    let mut phase = Phase::new(number, &format!("Phase {}", number), tasks);
    phase.acceptance_criteria = vec!["done".into()];
    phase
}

fn plan(phases: Vec<Phase>) -> ImplementationPlan {
    ImplementationPlan::new("checkout", PathBuf::from(REPO), phases)
}

fn provenance() -> Provenance {
    Provenance {
        owner: "acme".into(),
        name: "shop".into(),
        repository_path: PathBuf::from(REPO),
        created_by: CreatedBy::User { name: "dev".into() },
    }
}

struct MemoryFixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    fs: Arc<InMemoryFileSystem>,
}

fn memory_fixture() -> MemoryFixture {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
    let fs = Arc::new(InMemoryFileSystem::new());
    let store = Arc::new(
        MemoryStore::in_memory()
            .with_ttl_days(28)
            .with_clock(clock.clone())
            .with_file_system(fs.clone()),
    );
    MemoryFixture { store, clock, fs }
}

mod plan_execution {
    use super::*;

    #[tokio::test]
    async fn test_second_phase_failure_scenario() {
        let generation = ScriptedGeneration::new().reply("ok").reply("ok").empty();
        let vcs = Arc::new(RecordingVcs::new());
        let executor = PlanExecutor::new(PhaseExecutor::new(Arc::new(generation), vcs.clone()));
        let mut plan = plan(vec![
            phase(1, &["create cart table", "add cart model"]),
            phase(2, &["add checkout endpoint"]),
        ]);

        let result = executor.execute_plan(&mut plan, &AgentConfig::default()).await;

        assert!(!result.success);
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.current_phase, 2);
        assert_eq!(plan.phases[0].status, PhaseStatus::Completed);
        assert_eq!(plan.phases[1].status, PhaseStatus::Failed);
        assert_eq!(plan.phases[1].tasks[0].attempts, 1);
        assert_eq!(result.completed_phases(), 1);
        // Checkpoint for P1 plus the failure checkpoint for P2
        assert_eq!(vcs.commits().len(), 2);
        assert!(vcs.commits()[1].contains("failed at task 2.1"));
    }

    #[tokio::test]
    async fn test_current_phase_after_success_is_past_the_end() {
        let executor = PlanExecutor::new(PhaseExecutor::new(
            Arc::new(ScriptedGeneration::new()),
            Arc::new(RecordingVcs::new()),
        ));
        let mut plan = plan(vec![phase(1, &["a"]), phase(2, &["b"]), phase(3, &["c"])]);
        let result = executor.execute_plan(&mut plan, &AgentConfig::default()).await;

        assert!(result.success);
        assert_eq!(plan.current_phase, 4);
        assert!(plan.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_phase_succeeds_without_commit_when_clean() {
        let vcs = Arc::new(RecordingVcs::clean());
        let generation = Arc::new(ScriptedGeneration::new());
        let executor = PhaseExecutor::new(generation.clone(), vcs.clone());
        let mut plan = plan(vec![phase(1, &[])]);

        let result = executor
            .execute_phase(&mut plan, 1, &AgentConfig::default())
            .await;

        assert!(result.success);
        assert!(result.commit_sha.is_none());
        assert_eq!(vcs.stage_calls(), 1);
        assert!(vcs.commits().is_empty());
        assert!(generation.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_attempts_never_decrease_across_runs() {
        let generation = Arc::new(ScriptedGeneration::new().empty().empty());
        let executor = PhaseExecutor::new(generation, Arc::new(RecordingVcs::new()));
        let agent = AgentConfig::default();
        let mut plan = plan(vec![phase(1, &["flaky"])]);

        let mut previous = 0;
        for _ in 0..3 {
            executor.execute_phase(&mut plan, 1, &agent).await;
            let attempts = plan.phases[0].tasks[0].attempts;
            assert!(attempts > previous);
            previous = attempts;
        }
        assert_eq!(previous, 3);
        assert_eq!(plan.phases[0].tasks[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_plan_checkpoints_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PlanStore::open(dir.path()).unwrap());
        let mut plan = plan(vec![phase(1, &["a"]), phase(2, &["b"])]);
        store.save(&plan).unwrap();

        let generation = ScriptedGeneration::new().reply("ok").empty();
        PlanExecutor::new(PhaseExecutor::new(
            Arc::new(generation),
            Arc::new(RecordingVcs::new()),
        ))
        .with_store(store)
        .execute_plan(&mut plan, &AgentConfig::default())
        .await;

        let reopened = PlanStore::open(dir.path()).unwrap();
        let saved = reopened.get(&plan.id).unwrap();
        assert_eq!(saved.status, PlanStatus::Failed);
        assert_eq!(saved.current_phase, 2);
        assert!(saved.failure_reason.unwrap().contains("Phase 2"));
    }
}

mod memory_lifecycle {
    use super::*;
    use anvil::memory::Clock;

    #[test]
    fn test_ttl_scenario() {
        let f = memory_fixture();
        let memory = f.store.store("fact", vec![], "subject", "", provenance()).unwrap();
        let t0 = memory.created_at;
        assert_eq!(f.store.expires_at(&memory), t0 + Duration::days(28));

        f.clock.set(t0 + Duration::days(27));
        assert!(!f.store.is_expired(&memory));
        f.clock.set(t0 + Duration::days(29));
        assert!(f.store.is_expired(&memory));
    }

    #[tokio::test]
    async fn test_validation_moves_expiry_window() {
        let f = memory_fixture();
        f.fs.insert(PathBuf::from(REPO).join("src/cart.rs"), "pub struct Cart;\n");
        let memory = f
            .store
            .store(
                "Cart is a unit struct",
                vec![CitationInput::new("src/cart.rs").at_line(1)],
                "cart model",
                "",
                provenance(),
            )
            .unwrap();

        f.clock.advance(Duration::days(20));
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.recommended_action, RecommendedAction::Keep);

        let validated = f.store.get(&memory.id).unwrap();
        assert_eq!(validated.last_validated_at, Some(f.clock.now()));
        assert_eq!(f.store.expires_at(&validated), f.clock.now() + Duration::days(28));
    }

    #[tokio::test]
    async fn test_missing_evidence_never_kept() {
        let f = memory_fixture();
        let memory = f
            .store
            .store(
                "Prices are cents",
                vec![CitationInput::new("src/price.rs").with_snippet("cents: u64")],
                "pricing",
                "",
                provenance(),
            )
            .unwrap();

        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 0.0);
        assert_ne!(result.recommended_action, RecommendedAction::Keep);
        assert_eq!(result.status, MemoryStatus::Invalid);
        assert!(f.store.search(Path::new(REPO), "pricing", 5).unwrap().is_empty());
    }

    #[test]
    fn test_prune_twice_removes_nothing_the_second_time() {
        let f = memory_fixture();
        f.store.store("old", vec![], "a", "", provenance()).unwrap();
        f.store.store("old too", vec![], "b", "", provenance()).unwrap();
        f.clock.advance(Duration::days(30));
        f.store.store("fresh", vec![], "c", "", provenance()).unwrap();

        assert_eq!(f.store.prune_expired(None, None).unwrap(), 2);
        assert_eq!(f.store.prune_expired(None, None).unwrap(), 0);
        assert_eq!(f.store.list(None, None).unwrap().len(), 1);
    }
}

mod memory_in_prompts {
    use super::*;

    #[tokio::test]
    async fn test_empty_repository_prompt_has_no_knowledge_section() {
        let f = memory_fixture();
        let generation = Arc::new(ScriptedGeneration::new());
        let executor = PhaseExecutor::new(generation.clone(), Arc::new(RecordingVcs::new()))
            .with_memory(f.store.clone());
        let mut plan = plan(vec![phase(1, &["add checkout endpoint"])]);

        let result = executor
            .execute_phase(&mut plan, 1, &AgentConfig::default())
            .await;

        assert!(result.success);
        assert!(!generation.prompts()[0].contains(KNOWLEDGE_HEADING));
        assert!(result.task_results[0].memories_used.is_empty());
    }

    #[tokio::test]
    async fn test_relevant_memories_are_cited_and_counted() {
        let f = memory_fixture();
        let memory = f
            .store
            .store(
                "Checkout totals are computed server side",
                vec![CitationInput::new("src/checkout.rs").at_line(40)],
                "checkout totals",
                "",
                provenance(),
            )
            .unwrap();
        f.store.store("Logs go to stdout", vec![], "logging", "", provenance()).unwrap();

        let generation = Arc::new(ScriptedGeneration::new());
        let executor = PhaseExecutor::new(generation.clone(), Arc::new(RecordingVcs::new()))
            .with_memory(f.store.clone());
        let mut plan = plan(vec![phase(1, &["add checkout endpoint"])]);
        let result = executor
            .execute_phase(&mut plan, 1, &AgentConfig::default())
            .await;

        let prompt = &generation.prompts()[0];
        assert!(prompt.contains(KNOWLEDGE_HEADING));
        assert!(prompt.contains("**checkout totals**"));
        assert!(prompt.contains("src/checkout.rs:40"));
        assert!(!prompt.contains("Logs go to stdout"));
        assert_eq!(result.task_results[0].memories_used, vec![memory.id.clone()]);
        assert_eq!(f.store.get(&memory.id).unwrap().use_count, 1);
    }
}

mod workflow_runs {
    use super::*;

    #[tokio::test]
    async fn test_retry_after_failure_completes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PlanStore::open(dir.path()).unwrap());
        let plan = plan(vec![phase(1, &["a", "b"]), phase(2, &["c"])]);
        store.save(&plan).unwrap();
        let plan_id = plan.id.clone();

        let generation = Arc::new(ScriptedGeneration::new().reply("ok").reply("ok").empty());
        let vcs = Arc::new(RecordingVcs::new());
        let workflow = WorkflowOrchestrator::builder(plan, generation.clone(), vcs.clone())
            .agent_config(AgentConfig::for_project_type(ProjectType::Rust))
            .plan_store(store.clone())
            .commit_prefix("[shop]")
            .build();

        let failed = workflow.start().unwrap().await.unwrap();
        assert_eq!(failed.state, WorkflowState::Failed);
        assert_eq!(failed.failed_stage, Some(WorkflowState::Implementation));
        assert_eq!(store.get(&plan_id).unwrap().status, PlanStatus::Failed);

        let outcome = workflow.retry_current_step().await.unwrap().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.plan_result.unwrap().phase_results.len(), 1);

        let saved = store.get(&plan_id).unwrap();
        assert_eq!(saved.status, PlanStatus::Completed);
        assert_eq!(saved.phases[1].tasks[0].attempts, 2);
        assert!(vcs.commits().iter().all(|m| m.starts_with("[shop] phase")));
        assert_eq!(generation.prompts().len(), 4);
    }

    #[tokio::test]
    async fn test_abort_before_start() {
        let workflow = WorkflowOrchestrator::builder(
            plan(vec![phase(1, &["a"])]),
            Arc::new(ScriptedGeneration::new()),
            Arc::new(RecordingVcs::new()),
        )
        .build();

        workflow.abort().unwrap();
        assert_eq!(workflow.state(), WorkflowState::Aborted);
        assert!(workflow.start().is_err());
    }
}
