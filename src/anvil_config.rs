//! Unified configuration for anvil, read from `.anvil/anvil.toml`.
//!
//! Layering is file → environment → CLI. Every section is optional and
//! falls back to defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//! project_type = "rust"
//!
//! [memory]
//! ttl_days = 28
//! search_limit = 5
//! store_path = "~/.anvil/memory.json"
//!
//! [execution]
//! max_task_attempts = 3
//! commit_prefix = "[anvil]"
//!
//! [generation]
//! command = "claude"
//! args = ["--print"]
//! model = "sonnet"
//!
//! [stages]
//! testing = "cargo test"
//! timeout_secs = 600
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agents::ProjectType;

/// Name of the per-repository anvil directory.
pub const ANVIL_DIR: &str = ".anvil";

/// Default memory time-to-live in days.
pub const DEFAULT_TTL_DAYS: i64 = 28;

/// Longest memory time-to-live honoured; larger values are clamped.
pub const MAX_TTL_DAYS: i64 = 36_500;

/// Default number of memories included in a prompt.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Selects the default agent configuration
    #[serde(default)]
    pub project_type: ProjectType,
    /// Repository owner used to scope memories (defaults to "local")
    #[serde(default)]
    pub owner: Option<String>,
}

/// Memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Override for the memory store location. A leading `~/` expands to the
    /// home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

fn default_ttl_days() -> i64 {
    DEFAULT_TTL_DAYS
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            search_limit: default_search_limit(),
            store_path: None,
        }
    }
}

/// Plan execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Retry budget: attempts allowed per task before an explicit retry is refused
    #[serde(default = "default_max_task_attempts")]
    pub max_task_attempts: u32,
    /// Prefix for checkpoint commit messages
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

fn default_max_task_attempts() -> u32 {
    3
}

fn default_commit_prefix() -> String {
    "[anvil]".to_string()
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_task_attempts: default_max_task_attempts(),
            commit_prefix: default_commit_prefix(),
        }
    }
}

/// Generation CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_generation_command")]
    pub command: String,
    #[serde(default = "default_generation_args")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_generation_command() -> String {
    "claude".to_string()
}

fn default_generation_args() -> Vec<String> {
    vec!["--print".to_string()]
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            command: default_generation_command(),
            args: default_generation_args(),
            model: None,
        }
    }
}

/// Shell commands run for the design, testing and review workflow stages.
/// A stage without a command passes straight through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default = "default_stage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_stage_timeout_secs() -> u64 {
    600
}

impl Default for StagesSection {
    fn default() -> Self {
        Self {
            design: None,
            testing: None,
            review: None,
            timeout_secs: default_stage_timeout_secs(),
        }
    }
}

/// The complete anvil.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnvilToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub stages: StagesSection,
}

impl AnvilToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse anvil.toml")
    }

    /// Load from `<anvil_dir>/anvil.toml`, or defaults if the file is absent.
    pub fn load_or_default(anvil_dir: &Path) -> Result<Self> {
        let config_path = anvil_dir.join("anvil.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize anvil.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env(mut self) -> Self {
        if let Some(ttl) = std::env::var("ANVIL_MEMORY_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
        {
            self.memory.ttl_days = ttl;
        }
        if let Ok(cmd) = std::env::var("ANVIL_GENERATION_CMD")
            && !cmd.is_empty()
        {
            self.generation.command = cmd;
        }
        self
    }

    /// Resolve the memory store path, defaulting to `~/.anvil/memory.json`.
    pub fn memory_store_path(&self) -> Option<PathBuf> {
        match &self.memory.store_path {
            Some(raw) => Some(expand_home(raw)),
            None => dirs::home_dir().map(|h| h.join(ANVIL_DIR).join("memory.json")),
        }
    }

    /// Non-fatal problems with the configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.memory.ttl_days <= 0 {
            warnings.push(format!(
                "memory.ttl_days is {}; every memory will be considered expired",
                self.memory.ttl_days
            ));
        } else if self.memory.ttl_days > MAX_TTL_DAYS {
            warnings.push(format!(
                "memory.ttl_days is {}; clamped to {} days",
                self.memory.ttl_days, MAX_TTL_DAYS
            ));
        }
        if self.memory.search_limit == 0 {
            warnings.push("memory.search_limit is 0; prompts will never include memories".into());
        }
        if self.execution.max_task_attempts == 0 {
            warnings.push("execution.max_task_attempts is 0; retries will always be refused".into());
        }
        if self.stages.timeout_secs == 0 {
            warnings.push("stages.timeout_secs is 0; stage commands will time out immediately".into());
        }
        if self.generation.command.trim().is_empty() {
            warnings.push("generation.command is empty".into());
        }
        warnings
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}
