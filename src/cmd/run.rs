//! Workflow execution: `anvil run`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use anvil::config::Config;
use anvil::memory::MemoryStore;
use anvil::orchestrator::RetryPolicy;
use anvil::plan::{ImplementationPlan, PlanStatus, PlanStore};
use anvil::session::CliGenerationClient;
use anvil::tracker::GitVcs;
use anvil::ui::{EventPrinter, UiMode};
use anvil::workflow::{CommandStageHook, WorkflowOrchestrator, WorkflowOutcome, WorkflowState};

use super::plan::{open_store, resolve_plan};

pub struct RunOptions {
    pub plan_id: Option<String>,
    pub ui: UiMode,
    pub skip_failed: bool,
    pub retries: u32,
}

pub async fn cmd_run(project_dir: &Path, options: RunOptions, verbose: bool) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), verbose)?;
    config.ensure_directories()?;

    let store = Arc::new(open_store(&config)?);
    let plan = prepare_plan(&store, &config, options.plan_id.as_deref())?;

    let toml = config.toml();
    let generation = Arc::new(CliGenerationClient::new(
        toml.generation.command.clone(),
        toml.generation.args.clone(),
    ));

    let mut builder = WorkflowOrchestrator::builder(plan, generation, Arc::new(GitVcs))
        .agent_config(config.agent_config())
        .plan_store(store.clone())
        .retry_policy(RetryPolicy::new(config.max_task_attempts()))
        .search_limit(config.search_limit())
        .commit_prefix(config.commit_prefix());

    if let Some(path) = &config.memory_store {
        let memory = MemoryStore::open(path)
            .context("Failed to open memory store")?
            .with_ttl_days(config.ttl_days());
        builder = builder.memory(Arc::new(memory));
    }

    let timeout = Duration::from_secs(toml.stages.timeout_secs);
    let stage_commands = [
        (WorkflowState::Design, &toml.stages.design),
        (WorkflowState::Testing, &toml.stages.testing),
        (WorkflowState::Review, &toml.stages.review),
    ];
    for (stage, command) in stage_commands {
        if let Some(command) = command.as_deref().filter(|c| !c.trim().is_empty()) {
            builder = builder.stage_hook(stage, Arc::new(CommandStageHook::new(command, timeout)));
        }
    }

    let workflow = builder.build();
    let printer = EventPrinter::new(options.ui, verbose);
    let rx = workflow.subscribe();
    let printer_task = tokio::spawn(async move { printer.follow(rx).await });

    let interrupt = {
        let workflow = workflow.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted; aborting after the current task");
                if let Err(e) = workflow.abort() {
                    warn!("Abort failed: {}", e);
                }
            }
        })
    };

    let outcome = drive(&workflow, &options).await;
    interrupt.abort();
    let _ = interrupt.await;
    drop(workflow);
    // Every sender is gone once the workflow is dropped
    let _ = printer_task.await;
    let outcome = outcome?;

    if options.ui == UiMode::Json {
        println!(
            "{}",
            serde_json::to_string(&outcome).context("Failed to serialize outcome")?
        );
    } else {
        print_summary(&outcome);
    }

    if !outcome.success {
        bail!(
            "Workflow ended as {}{}",
            outcome.state,
            outcome
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// Load the plan to run, reactivating it when a previous run stopped early.
fn prepare_plan(store: &PlanStore, config: &Config, id: Option<&str>) -> Result<ImplementationPlan> {
    let mut plan = resolve_plan(store, config, id)?;
    match plan.status {
        PlanStatus::Completed => bail!("Plan {} is already completed", plan.id),
        PlanStatus::Active => {}
        PlanStatus::Failed | PlanStatus::Cancelled | PlanStatus::Paused => {
            println!(
                "Resuming plan {} from phase {} (was {})",
                plan.id, plan.current_phase, plan.status
            );
            plan.reactivate()?;
            store.save(&plan)?;
        }
    }
    Ok(plan)
}

/// Start the workflow and apply the retry/skip options to each failure.
async fn drive(workflow: &WorkflowOrchestrator, options: &RunOptions) -> Result<WorkflowOutcome> {
    let mut handle = workflow.start()?;
    let mut retries_left = options.retries;

    loop {
        let outcome = handle.await.context("Workflow task panicked")?;
        if outcome.state != WorkflowState::Failed {
            return Ok(outcome);
        }

        if retries_left > 0 {
            retries_left -= 1;
            match workflow.retry_current_step().await {
                Ok(next) => {
                    handle = next;
                    continue;
                }
                Err(e) => warn!("Retry refused: {}", e),
            }
        }

        if options.skip_failed {
            handle = workflow.skip_current_step().await?;
            retries_left = options.retries;
            continue;
        }
        return Ok(outcome);
    }
}

fn print_summary(outcome: &WorkflowOutcome) {
    println!();
    let state = match outcome.state {
        WorkflowState::Complete => style(outcome.state.as_str()).green().bold(),
        WorkflowState::Aborted => style(outcome.state.as_str()).yellow().bold(),
        _ => style(outcome.state.as_str()).red().bold(),
    };
    println!("Workflow {} {}", outcome.workflow_id, state);
    println!("  plan: {}", outcome.plan_id);
    if let Some(result) = &outcome.plan_result {
        println!(
            "  phases completed: {} ({:.1}s)",
            result.completed_phases(),
            result.duration.as_secs_f64()
        );
    }
    if let Some(stage) = outcome.failed_stage {
        println!("  failed at: {}", stage);
    }
    let skipped: Vec<&str> = outcome
        .stage_reports
        .iter()
        .filter(|r| r.skipped)
        .map(|r| r.stage.as_str())
        .collect();
    if !skipped.is_empty() {
        println!("  skipped: {}", skipped.join(", "));
    }
    if !outcome.warnings.is_empty() {
        println!("  warnings: {}", outcome.warnings.len());
    }
}
