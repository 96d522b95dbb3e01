//! Configuration view and validation commands: `anvil init` and `anvil config`.

use anyhow::{Context, Result};
use std::path::Path;

use anvil::agents::ProjectType;
use anvil::anvil_config::{ANVIL_DIR, AnvilToml};
use anvil::config::Config;

use super::super::ConfigCommands;

pub fn cmd_init(project_dir: &Path, project_type: Option<&str>) -> Result<()> {
    let anvil_dir = project_dir.join(ANVIL_DIR);
    let config_path = anvil_dir.join("anvil.toml");
    std::fs::create_dir_all(anvil_dir.join("plans"))
        .with_context(|| format!("Failed to create {}", anvil_dir.display()))?;

    if config_path.exists() {
        println!("anvil.toml already exists at {}", config_path.display());
        return Ok(());
    }

    let mut toml = AnvilToml::default();
    if let Some(raw) = project_type {
        toml.project.project_type = raw.parse::<ProjectType>()?;
    }
    toml.save(&config_path)?;

    println!(
        "{} Initialized anvil ({}) at {}",
        console::style("✓").green(),
        toml.project.project_type,
        anvil_dir.display()
    );
    Ok(())
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let anvil_dir = project_dir.join(ANVIL_DIR);
    let config_path = anvil_dir.join("anvil.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Anvil Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No anvil.toml found at {}; using defaults", config_path.display());
            }
            println!();

            let config = Config::new(project_dir.to_path_buf(), false)?;
            let toml = config.toml();
            let rendered =
                toml::to_string_pretty(toml).context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            println!();

            println!("Effective values (with env overrides):");
            println!("  repository = {}/{}", config.repo_owner, config.repo_name);
            match &config.memory_store {
                Some(path) => println!("  memory_store = {}", path.display()),
                None => println!("  memory_store = (none: home directory unavailable)"),
            }
            println!("  generation.command = \"{}\"", toml.generation.command);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No anvil.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = AnvilToml::load(&config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("anvil.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            std::fs::create_dir_all(&anvil_dir)
                .with_context(|| format!("Failed to create {}", anvil_dir.display()))?;
            AnvilToml::default().save(&config_path)?;

            println!("Created anvil.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, project_type, owner");
            println!("  - [memory] ttl_days, search_limit, store_path");
            println!("  - [execution] max_task_attempts, commit_prefix");
            println!("  - [generation] command, args, model");
            println!("  - [stages] design, testing, review, timeout_secs");
        }
    }

    Ok(())
}
