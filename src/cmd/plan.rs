//! Plan commands: `anvil plan create|show|list|check`.

use anyhow::{Context, Result, anyhow};
use console::style;
use std::path::Path;

use anvil::config::Config;
use anvil::plan::{ImplementationPlan, PlanDraft, PlanStore, check_structure};

use super::super::PlanCommands;

pub fn open_store(config: &Config) -> Result<PlanStore> {
    PlanStore::open(&config.plans_dir).context("Failed to open plan store")
}

/// The named plan, or the repository's current plan.
pub fn resolve_plan(store: &PlanStore, config: &Config, id: Option<&str>) -> Result<ImplementationPlan> {
    match id {
        Some(id) => Ok(store.get(id)?),
        None => store.current(&config.project_dir)?.ok_or_else(|| {
            anyhow!("No current plan. Run 'anvil plan create <draft.json>' first.")
        }),
    }
}

pub fn cmd_plan(project_dir: &Path, command: PlanCommands, verbose: bool) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), verbose)?;
    let store = open_store(&config)?;

    match command {
        PlanCommands::Create { draft } => {
            let draft = PlanDraft::load(&draft)?;
            let plan = store.create(draft, config.project_dir.clone())?;
            println!(
                "{} Created plan {} ({} phases)",
                style("✓").green(),
                style(&plan.id).bold(),
                plan.total_phases()
            );
            print_check(&plan);
        }
        PlanCommands::Show { id, json } => {
            let plan = resolve_plan(&store, &config, id.as_deref())?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
                );
            } else {
                print_plan(&plan);
            }
        }
        PlanCommands::List => {
            let plans = store.list(Some(&config.project_dir))?;
            if plans.is_empty() {
                println!("No plans found. Run 'anvil plan create <draft.json>' to create one.");
                return Ok(());
            }
            let current = store.current(&config.project_dir)?.map(|p| p.id);
            println!("{:<38} {:<10} {:<8} Title", "Id", "Status", "Phase");
            for plan in plans {
                let marker = if current.as_deref() == Some(plan.id.as_str()) { "*" } else { " " };
                println!(
                    "{}{:<37} {:<10} {:<8} {}",
                    marker,
                    plan.id,
                    plan.status,
                    format!("{}/{}", plan.current_phase.min(plan.total_phases() as u32), plan.total_phases()),
                    plan.title
                );
            }
        }
        PlanCommands::Check { id } => {
            let plan = resolve_plan(&store, &config, id.as_deref())?;
            if !print_check(&plan) {
                anyhow::bail!("Plan {} has structural errors", plan.id);
            }
            println!("{} Plan structure is valid", style("✓").green());
        }
    }
    Ok(())
}

/// Print structural problems; returns false when there are errors.
fn print_check(plan: &ImplementationPlan) -> bool {
    let check = check_structure(plan);
    for error in &check.errors {
        println!("  {} {}", style("error:").red().bold(), error);
    }
    for warning in &check.warnings {
        println!("  {} {}", style("warning:").yellow(), warning);
    }
    check.is_ok()
}

fn print_plan(plan: &ImplementationPlan) {
    println!();
    println!("{} {}", style("Plan").bold(), style(&plan.title).cyan().bold());
    println!("  id:      {}", plan.id);
    println!("  status:  {}", plan.status);
    println!("  phase:   {} of {}", plan.current_phase, plan.total_phases());
    if let Some(reason) = &plan.failure_reason {
        println!("  reason:  {}", style(reason).red());
    }
    println!();
    for phase in &plan.phases {
        println!(
            "  {} {} {}",
            style(format!("Phase {}", phase.number)).yellow().bold(),
            phase.name,
            style(format!("[{}]", phase.status)).dim()
        );
        for task in &phase.tasks {
            let attempts = if task.attempts > 0 {
                format!(" ({} attempt(s))", task.attempts)
            } else {
                String::new()
            };
            println!(
                "    {:<6} {:<12} {}{}",
                task.id,
                task.status.as_str(),
                task.description,
                style(attempts).dim()
            );
            if let Some(error) = &task.error {
                println!("           {}", style(error).red());
            }
        }
    }
    println!();
}
