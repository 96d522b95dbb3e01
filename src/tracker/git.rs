use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Signature, Status, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{CommitOptions, CommitOutcome, VcsStatus, VersionControl};

const DEFAULT_AUTHOR: &str = "anvil";
const DEFAULT_EMAIL: &str = "anvil@localhost";

/// git2-backed version control. Each call opens the repository fresh on a
/// blocking thread.
#[derive(Debug, Clone, Default)]
pub struct GitVcs;

impl GitVcs {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> Result<T> + Send + 'static,
{
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&path)
            .with_context(|| format!("Failed to open git repository: {}", path.display()))?;
        f(&repo)
    })
    .await
    .context("git task panicked")?
}

/// Get the HEAD commit if it exists (returns None for unborn branches)
fn head_commit(repo: &Repository) -> Option<git2::Commit<'_>> {
    repo.head().ok().and_then(|head| head.peel_to_commit().ok())
}

fn read_status(repo: &Repository) -> Result<VcsStatus> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .context("Failed to read git status")?;

    let staged_mask = Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE;
    let unstaged_mask = Status::WT_MODIFIED
        | Status::WT_DELETED
        | Status::WT_RENAMED
        | Status::WT_TYPECHANGE;

    let mut status = VcsStatus::default();
    for entry in statuses.iter() {
        let s = entry.status();
        if s.intersects(staged_mask) {
            status.staged_count += 1;
        }
        if s.intersects(unstaged_mask) {
            status.unstaged_count += 1;
        }
        if s.contains(Status::WT_NEW) {
            status.untracked_count += 1;
        }
    }
    status.branch = repo
        .head()
        .ok()
        .filter(|head| head.is_branch())
        .and_then(|head| head.shorthand().map(str::to_string));
    Ok(status)
}

#[async_trait]
impl VersionControl for GitVcs {
    async fn stage_all(&self, path: &Path) -> Result<bool> {
        blocking(path, |repo| {
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            // Picks up deletions that add_all leaves behind
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            Ok(read_status(repo)?.has_staged())
        })
        .await
    }

    async fn status(&self, path: &Path) -> Result<VcsStatus> {
        blocking(path, read_status).await
    }

    async fn commit(
        &self,
        path: &Path,
        message: &str,
        options: Option<CommitOptions>,
    ) -> Result<CommitOutcome> {
        let message = message.to_string();
        let options = options.unwrap_or_default();
        blocking(path, move |repo| {
            if !options.allow_empty && !read_status(repo)?.has_staged() {
                return Ok(CommitOutcome::rejected("Nothing to commit"));
            }

            let mut index = repo.index()?;
            let tree_id = index.write_tree()?;
            let tree = repo.find_tree(tree_id)?;
            let sig = Signature::now(
                options.author_name.as_deref().unwrap_or(DEFAULT_AUTHOR),
                options.author_email.as_deref().unwrap_or(DEFAULT_EMAIL),
            )?;

            // Handle unborn branch (new repo with no commits yet)
            let parents: Vec<git2::Commit<'_>> = head_commit(repo).into_iter().collect();
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            let oid = repo
                .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parent_refs)
                .context("Failed to create commit")?;

            debug!("Committed {}: {}", oid, message);
            Ok(CommitOutcome::committed(oid.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_commit_on_unborn_head() {
        let dir = setup_repo();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let vcs = GitVcs::new();

        assert!(vcs.stage_all(dir.path()).await.unwrap());
        let outcome = vcs
            .commit(dir.path(), "[anvil] phase 1: Setup", None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.sha.as_ref().unwrap().len(), 40);

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("[anvil] phase 1: Setup"));
        assert_eq!(head.author().name(), Some("anvil"));
    }

    #[tokio::test]
    async fn test_second_commit_has_parent() {
        let dir = setup_repo();
        let vcs = GitVcs::new();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        vcs.stage_all(dir.path()).await.unwrap();
        let first = vcs.commit(dir.path(), "first", None).await.unwrap();

        fs::write(dir.path().join("a.txt"), "two").unwrap();
        vcs.stage_all(dir.path()).await.unwrap();
        vcs.commit(dir.path(), "second", None).await.unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.parent_id(0).unwrap().to_string(), first.sha.unwrap());
    }

    #[tokio::test]
    async fn test_nothing_to_commit_is_not_an_error() {
        let dir = setup_repo();
        let vcs = GitVcs::new();
        assert!(!vcs.stage_all(dir.path()).await.unwrap());
        let outcome = vcs.commit(dir.path(), "empty", None).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.sha.is_none());
        assert_eq!(outcome.error.as_deref(), Some("Nothing to commit"));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let dir = setup_repo();
        let vcs = GitVcs::new();
        fs::write(dir.path().join("tracked.txt"), "v1").unwrap();
        vcs.stage_all(dir.path()).await.unwrap();
        vcs.commit(dir.path(), "init", None).await.unwrap();

        fs::write(dir.path().join("tracked.txt"), "v2").unwrap();
        fs::write(dir.path().join("new.txt"), "new").unwrap();
        let status = vcs.status(dir.path()).await.unwrap();
        assert_eq!(status.staged_count, 0);
        assert_eq!(status.unstaged_count, 1);
        assert_eq!(status.untracked_count, 1);
        assert!(status.branch.is_some());

        vcs.stage_all(dir.path()).await.unwrap();
        let status = vcs.status(dir.path()).await.unwrap();
        assert_eq!(status.staged_count, 2);
        assert_eq!(status.untracked_count, 0);
    }

    #[tokio::test]
    async fn test_stage_all_picks_up_deletions() {
        let dir = setup_repo();
        let vcs = GitVcs::new();
        fs::write(dir.path().join("gone.txt"), "bye").unwrap();
        vcs.stage_all(dir.path()).await.unwrap();
        vcs.commit(dir.path(), "init", None).await.unwrap();

        fs::remove_file(dir.path().join("gone.txt")).unwrap();
        assert!(vcs.stage_all(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_fails_outside_repository() {
        let dir = tempdir().unwrap();
        let vcs = GitVcs::new();
        assert!(vcs.status(dir.path()).await.is_err());
    }
}
