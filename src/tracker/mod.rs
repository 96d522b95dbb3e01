//! Version-control seam. The executors only see `VersionControl`; `GitVcs`
//! is the git2-backed implementation the CLI wires in.

pub mod git;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use git::GitVcs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsStatus {
    pub staged_count: usize,
    pub unstaged_count: usize,
    pub untracked_count: usize,
    /// `None` on an unborn or detached HEAD
    pub branch: Option<String>,
}

impl VcsStatus {
    pub fn has_staged(&self) -> bool {
        self.staged_count > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOptions {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    #[serde(default)]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub success: bool,
    pub sha: Option<String>,
    pub error: Option<String>,
}

impl CommitOutcome {
    pub fn committed(sha: String) -> Self {
        Self {
            success: true,
            sha: Some(sha),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            sha: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Stage every change under `path`. Returns whether anything is staged.
    async fn stage_all(&self, path: &Path) -> Result<bool>;

    async fn status(&self, path: &Path) -> Result<VcsStatus>;

    /// Commit the index. With nothing staged (and `allow_empty` unset) the
    /// outcome is unsuccessful rather than an error.
    async fn commit(
        &self,
        path: &Path,
        message: &str,
        options: Option<CommitOptions>,
    ) -> Result<CommitOutcome>;
}
