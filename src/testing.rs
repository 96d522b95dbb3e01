//! Scripted collaborator doubles for executor and memory tests.
//!
//! Compiled for unit tests, and for the integration suites under `tests/`
//! through the `testing` feature, so they can drive the executors without a
//! real generation service or git repository.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::memory::{FileSystem, Memory, MemorySearch};
use crate::session::{GenerationClient, GenerationResponse, SessionConfig, SessionId};
use crate::tracker::{CommitOptions, CommitOutcome, VcsStatus, VersionControl};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum Reply {
    Content(String),
    Error(String),
}

/// Generation client that answers from a script. Once the script runs out,
/// every prompt gets `"done"`.
#[derive(Default)]
pub struct ScriptedGeneration {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
    configs: Mutex<Vec<SessionConfig>>,
    created: AtomicUsize,
    closed: AtomicUsize,
    fail_create: AtomicBool,
    fail_close: AtomicBool,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: &str) -> Self {
        locked(&self.replies).push_back(Reply::Content(content.to_string()));
        self
    }

    /// Queue a whitespace-only reply.
    pub fn empty(self) -> Self {
        locked(&self.replies).push_back(Reply::Content("  \n".to_string()));
        self
    }

    pub fn error(self, message: &str) -> Self {
        locked(&self.replies).push_back(Reply::Error(message.to_string()));
        self
    }

    pub fn failing_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_close(self) -> Self {
        self.fail_close.store(true, Ordering::SeqCst);
        self
    }

    /// Cancel `token` once `sends` prompts have been answered.
    pub fn cancel_after(self, sends: usize, token: CancellationToken) -> Self {
        *locked(&self.cancel_after) = Some((sends, token));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        locked(&self.prompts).clone()
    }

    pub fn session_configs(&self) -> Vec<SessionConfig> {
        locked(&self.configs).clone()
    }

    pub fn sessions_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for ScriptedGeneration {
    async fn create_session(&self, config: SessionConfig) -> Result<SessionId> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("generation service unavailable");
        }
        locked(&self.configs).push(config);
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionId(format!("session-{}", n)))
    }

    async fn send(&self, _session: &SessionId, prompt: &str) -> Result<GenerationResponse> {
        let sent = {
            let mut prompts = locked(&self.prompts);
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if let Some((after, token)) = locked(&self.cancel_after).as_ref()
            && sent >= *after
        {
            token.cancel();
        }

        match locked(&self.replies).pop_front() {
            Some(Reply::Content(content)) => Ok(GenerationResponse::text(content)),
            Some(Reply::Error(message)) => Err(anyhow!(message)),
            None => Ok(GenerationResponse::text("done")),
        }
    }

    async fn close(&self, _session: &SessionId) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            bail!("close failed");
        }
        Ok(())
    }
}

/// Version control double that records commit messages.
pub struct RecordingVcs {
    has_changes: AtomicBool,
    reject_with: Mutex<Option<String>>,
    error_with: Mutex<Option<String>>,
    commits: Mutex<Vec<String>>,
    stage_calls: AtomicUsize,
}

impl Default for RecordingVcs {
    fn default() -> Self {
        Self {
            has_changes: AtomicBool::new(true),
            reject_with: Mutex::new(None),
            error_with: Mutex::new(None),
            commits: Mutex::new(Vec::new()),
            stage_calls: AtomicUsize::new(0),
        }
    }
}

impl RecordingVcs {
    /// A working tree that always has something to commit.
    pub fn new() -> Self {
        Self::default()
    }

    /// A working tree with nothing to stage.
    pub fn clean() -> Self {
        let vcs = Self::default();
        vcs.has_changes.store(false, Ordering::SeqCst);
        vcs
    }

    /// Commits come back unsuccessful with this error.
    pub fn rejecting(self, error: &str) -> Self {
        *locked(&self.reject_with) = Some(error.to_string());
        self
    }

    /// Every call fails outright.
    pub fn failing(self, error: &str) -> Self {
        *locked(&self.error_with) = Some(error.to_string());
        self
    }

    pub fn commits(&self) -> Vec<String> {
        locked(&self.commits).clone()
    }

    pub fn stage_calls(&self) -> usize {
        self.stage_calls.load(Ordering::SeqCst)
    }

    fn check_error(&self) -> Result<()> {
        match locked(&self.error_with).as_ref() {
            Some(error) => Err(anyhow!(error.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn stage_all(&self, _path: &Path) -> Result<bool> {
        self.check_error()?;
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_changes.load(Ordering::SeqCst))
    }

    async fn status(&self, _path: &Path) -> Result<VcsStatus> {
        self.check_error()?;
        let staged = usize::from(self.has_changes.load(Ordering::SeqCst));
        Ok(VcsStatus {
            staged_count: staged,
            unstaged_count: 0,
            untracked_count: 0,
            branch: Some("main".to_string()),
        })
    }

    async fn commit(
        &self,
        _path: &Path,
        message: &str,
        _options: Option<CommitOptions>,
    ) -> Result<CommitOutcome> {
        self.check_error()?;
        if let Some(error) = locked(&self.reject_with).as_ref() {
            return Ok(CommitOutcome::rejected(error.clone()));
        }
        let mut commits = locked(&self.commits);
        commits.push(message.to_string());
        Ok(CommitOutcome::committed(format!("{:040x}", commits.len())))
    }
}

/// File system backed by a map of absolute path to contents.
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: PathBuf, content: &str) {
        locked(&self.files).insert(path, content.to_string());
    }

    pub fn remove(&self, path: &Path) {
        locked(&self.files).remove(path);
    }
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(locked(&self.files).contains_key(path))
    }

    async fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        Ok(locked(&self.files).get(path).cloned())
    }
}

/// Memory search that always errors.
#[derive(Debug, Default)]
pub struct FailingMemorySearch;

#[async_trait]
impl MemorySearch for FailingMemorySearch {
    async fn search(&self, _repository_path: &Path, _query: &str, _limit: usize) -> Result<Vec<Memory>> {
        bail!("memory index unavailable")
    }

    async fn record_use(&self, _ids: &[String]) -> Result<()> {
        bail!("memory index unavailable")
    }
}
