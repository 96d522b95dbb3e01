//! Generation-session seam. A session is scoped to one repository and is
//! created once per phase.

pub mod cli;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use cli::CliGenerationClient;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub working_directory: PathBuf,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl GenerationResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Whitespace-only content counts as no content.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn create_session(&self, config: SessionConfig) -> Result<SessionId>;

    async fn send(&self, session: &SessionId, prompt: &str) -> Result<GenerationResponse>;

    async fn close(&self, session: &SessionId) -> Result<()>;
}
