use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::agents::AgentConfig;
use crate::anvil_config::{ANVIL_DIR, AnvilToml};

/// Runtime configuration for anvil.
///
/// Bridges the file-based `AnvilToml` with what the executors and stores
/// need at runtime: resolved directories, repository identity, and the
/// agent configuration for the project type.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub anvil_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub memory_store: Option<PathBuf>,
    /// Repository owner used to scope memories
    pub repo_owner: String,
    /// Repository name used to scope memories
    pub repo_name: String,
    pub verbose: bool,
    toml: AnvilToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let anvil_dir = project_dir.join(ANVIL_DIR);
        let toml = AnvilToml::load_or_default(&anvil_dir)?.apply_env();
        Ok(Self::from_toml(project_dir, toml, verbose))
    }

    /// Build a config from an already-loaded `AnvilToml`.
    pub fn from_toml(project_dir: PathBuf, toml: AnvilToml, verbose: bool) -> Self {
        let anvil_dir = project_dir.join(ANVIL_DIR);
        let plans_dir = anvil_dir.join("plans");
        let repo_name = toml
            .project
            .name
            .clone()
            .or_else(|| dir_name(&project_dir))
            .unwrap_or_else(|| "repository".to_string());
        let repo_owner = toml
            .project
            .owner
            .clone()
            .unwrap_or_else(|| "local".to_string());

        Self {
            memory_store: toml.memory_store_path(),
            project_dir,
            anvil_dir,
            plans_dir,
            repo_owner,
            repo_name,
            verbose,
            toml,
        }
    }

    pub fn toml(&self) -> &AnvilToml {
        &self.toml
    }

    pub fn ttl_days(&self) -> i64 {
        self.toml.memory.ttl_days
    }

    pub fn search_limit(&self) -> usize {
        self.toml.memory.search_limit
    }

    pub fn max_task_attempts(&self) -> u32 {
        self.toml.execution.max_task_attempts
    }

    pub fn commit_prefix(&self) -> &str {
        &self.toml.execution.commit_prefix
    }

    /// Default agent configuration for the configured project type.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::for_project_type(self.toml.project.project_type)
            .with_model(self.toml.generation.model.clone())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.plans_dir).context("Failed to create plans directory")?;
        if let Some(parent) = self.memory_store.as_ref().and_then(|p| p.parent()) {
            std::fs::create_dir_all(parent).context("Failed to create memory store directory")?;
        }
        Ok(())
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}
