use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{GenerationClient, GenerationResponse, SessionConfig, SessionId};

/// Runs a CLI command per prompt: the prompt goes to stdin, the reply is
/// read from stdout.
pub struct CliGenerationClient {
    command: String,
    args: Vec<String>,
    sessions: Mutex<HashMap<SessionId, SessionConfig>>,
}

impl CliGenerationClient {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, id: &SessionId) -> Result<SessionConfig> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session table lock poisoned"))?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown session: {}", id))
    }

    fn prompt_with_system(config: &SessionConfig, prompt: &str) -> String {
        match &config.system_prompt {
            Some(system) if !system.trim().is_empty() => format!("{}\n\n{}", system, prompt),
            _ => prompt.to_string(),
        }
    }
}

#[async_trait]
impl GenerationClient for CliGenerationClient {
    async fn create_session(&self, config: SessionConfig) -> Result<SessionId> {
        let id = SessionId(uuid::Uuid::new_v4().to_string());
        debug!(
            "Opened generation session {} in {}",
            id,
            config.working_directory.display()
        );
        self.sessions
            .lock()
            .map_err(|_| anyhow!("session table lock poisoned"))?
            .insert(id.clone(), config);
        Ok(id)
    }

    async fn send(&self, session: &SessionId, prompt: &str) -> Result<GenerationResponse> {
        let config = self.session(session)?;
        let input = Self::prompt_with_system(&config, prompt);

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(model) = &config.model {
            cmd.arg("--model").arg(model);
        }

        let start = Instant::now();
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&config.working_directory)
            .spawn()
            .with_context(|| format!("Failed to spawn generation command '{}'", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for generation command")?;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Generation command finished in {:.1}s (exit: {})",
            start.elapsed().as_secs_f64(),
            exit_code
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Generation command exited with {}: {}",
                exit_code,
                stderr.trim()
            );
        }

        Ok(GenerationResponse {
            content: String::from_utf8_lossy(&output.stdout).to_string(),
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }

    async fn close(&self, session: &SessionId) -> Result<()> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session table lock poisoned"))?
            .remove(session);
        if removed.is_none() {
            warn!("Closing unknown generation session {}", session);
        }
        Ok(())
    }
}
