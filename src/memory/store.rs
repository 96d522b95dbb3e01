//! Memory store: storage, search, expiry, citation validation and pruning.
//!
//! Reads go through an `RwLock`. Validation of a memory holds that memory's
//! async lock for the whole pass, so two validations of the same id never
//! interleave their status updates.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::fs::{FileSystem, LocalFileSystem};
use super::search;
use super::types::{
    CitationInput, CitationIssue, Memory, MemoryStatistics, MemoryStatus, MemoryUpdate,
    Provenance, ValidationResult,
};
use super::validation;
use crate::anvil_config::{DEFAULT_TTL_DAYS, MAX_TTL_DAYS};
use crate::errors::MemoryError;

/// The executor's view of the memory store.
#[async_trait]
pub trait MemorySearch: Send + Sync {
    /// Relevance-ranked memories for a repository; empty when nothing matches.
    async fn search(
        &self,
        repository_path: &Path,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Memory>>;

    /// Note that these memories were included in a prompt.
    async fn record_use(&self, ids: &[String]) -> anyhow::Result<()>;
}

/// On-disk snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    version: u32,
    memories: Vec<Memory>,
}

const FILE_VERSION: u32 = 1;

pub struct MemoryStore {
    path: Option<PathBuf>,
    ttl_days: i64,
    clock: Arc<dyn Clock>,
    fs: Arc<dyn FileSystem>,
    memories: RwLock<HashMap<String, Memory>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            ttl_days: DEFAULT_TTL_DAYS,
            clock: Arc::new(SystemClock),
            fs: Arc::new(LocalFileSystem),
            memories: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open a store backed by a JSON snapshot at `path`. A missing file is an
    /// empty store; it is created on the first write.
    pub fn open(path: &Path) -> Result<Self, MemoryError> {
        let mut store = Self::in_memory();
        store.path = Some(path.to_path_buf());

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read memory store: {}", path.display()))
                .map_err(MemoryError::Persist)?;
            let file: MemoryFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse memory store: {}", path.display()))
                .map_err(MemoryError::Persist)?;
            debug!("Loaded {} memories from {}", file.memories.len(), path.display());
            store.memories = RwLock::new(
                file.memories
                    .into_iter()
                    .map(|m| (m.id.clone(), m))
                    .collect(),
            );
        }
        Ok(store)
    }

    /// Time-to-live in days, clamped to `MAX_TTL_DAYS`.
    pub fn with_ttl_days(mut self, ttl_days: i64) -> Self {
        self.ttl_days = ttl_days.min(MAX_TTL_DAYS);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn ttl_days(&self) -> i64 {
        self.ttl_days
    }

    pub fn expires_at(&self, memory: &Memory) -> DateTime<Utc> {
        memory.expires_at(self.ttl_days)
    }

    pub fn is_expired(&self, memory: &Memory) -> bool {
        memory.is_expired(self.ttl_days, self.clock.now())
    }

    /// Record a new fact. Duplicate subjects are allowed.
    pub fn store(
        &self,
        fact: &str,
        citations: Vec<CitationInput>,
        subject: &str,
        reason: &str,
        provenance: Provenance,
    ) -> Result<Memory, MemoryError> {
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            owner: provenance.owner,
            name: provenance.name,
            repository_path: provenance.repository_path,
            subject: subject.to_string(),
            fact: fact.to_string(),
            reason: reason.to_string(),
            citations: citations.into_iter().map(CitationInput::into_citation).collect(),
            status: MemoryStatus::Active,
            created_by: provenance.created_by,
            created_at: self.clock.now(),
            last_validated_at: None,
            last_used_at: None,
            use_count: 0,
            superseded_by: None,
        };

        self.write()?.insert(memory.id.clone(), memory.clone());
        self.persist()?;
        info!(
            "Stored memory {} ({}/{}): {}",
            memory.id, memory.owner, memory.name, memory.subject
        );
        Ok(memory)
    }

    pub fn get(&self, id: &str) -> Result<Memory, MemoryError> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound { id: id.to_string() })
    }

    /// Memories for a repository (or all), oldest first.
    pub fn list(&self, owner: Option<&str>, name: Option<&str>) -> Result<Vec<Memory>, MemoryError> {
        let mut memories: Vec<Memory> = self
            .read()?
            .values()
            .filter(|m| m.belongs_to(owner, name))
            .cloned()
            .collect();
        memories.sort_by_key(|m| m.created_at);
        Ok(memories)
    }

    /// Relevance-ranked search over subject and fact. Invalid, retired and
    /// expired memories are never returned.
    pub fn search(
        &self,
        repository_path: &Path,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let keywords = search::keywords(query);
        let now = self.clock.now();
        let scored: Vec<(u32, Memory)> = self
            .read()?
            .values()
            .filter(|m| m.repository_path == repository_path)
            .filter(|m| matches!(m.status, MemoryStatus::Active | MemoryStatus::Stale))
            .filter(|m| !m.is_expired(self.ttl_days, now))
            .filter_map(|m| {
                let score = search::score(m, query, &keywords);
                (score > 0).then(|| (score, m.clone()))
            })
            .collect();

        let mut ranked = search::rank(scored);
        ranked.truncate(limit);
        debug!(
            "Memory search '{}' in {} returned {} result(s)",
            query,
            repository_path.display(),
            ranked.len()
        );
        Ok(ranked)
    }

    /// Increment use counts for memories included in a prompt. Unknown ids
    /// are ignored.
    pub fn record_use(&self, ids: &[String]) -> Result<(), MemoryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        {
            let mut memories = self.write()?;
            for id in ids {
                if let Some(memory) = memories.get_mut(id) {
                    memory.use_count += 1;
                    memory.last_used_at = Some(now);
                }
            }
        }
        self.persist()
    }

    /// Check every citation of a memory and update its status.
    pub async fn validate(&self, id: &str) -> Result<ValidationResult, MemoryError> {
        let lock = self.lock_for(id)?;
        let _guard = lock.lock().await;

        let snapshot = self.get(id)?;
        let mut checks = Vec::with_capacity(snapshot.citations.len());
        for citation in &snapshot.citations {
            checks.push(
                validation::check_citation(self.fs.as_ref(), &snapshot.repository_path, citation)
                    .await,
            );
        }

        let now = self.clock.now();
        let confidence = validation::confidence(&checks);
        let recommended_action = validation::recommend(&checks);
        let mut warnings = Vec::new();
        if checks.is_empty() {
            warnings.push("Memory has no citations; confidence defaults to 1.0".to_string());
        }
        let moved = checks
            .iter()
            .filter(|c| matches!(c.issue, Some(CitationIssue::Moved { .. })))
            .count();
        if moved > 0 {
            warnings.push(format!("{} citation(s) point at content that has moved", moved));
        }

        let status = {
            let mut memories = self.write()?;
            let memory = memories
                .get_mut(id)
                .ok_or_else(|| MemoryError::NotFound { id: id.to_string() })?;

            let unchanged = memory.citations.len() == checks.len()
                && memory
                    .citations
                    .iter()
                    .zip(&checks)
                    .all(|(c, check)| c.file == check.file && c.line == check.line);
            if unchanged {
                for (citation, check) in memory.citations.iter_mut().zip(&checks) {
                    citation.is_valid = check.is_valid;
                    citation.last_verified = Some(now);
                }
                memory.status = validation::status_after(memory.status, &checks);
                memory.last_validated_at = Some(now);
            } else {
                warnings.push(
                    "Citations changed during validation; results were not applied".to_string(),
                );
            }
            memory.status
        };
        self.persist()?;

        if status != MemoryStatus::Active {
            warn!(
                "Memory {} validated as {} (confidence {:.2}, action {})",
                id, status, confidence, recommended_action
            );
        } else {
            debug!("Memory {} validated (confidence {:.2})", id, confidence);
        }

        Ok(ValidationResult {
            memory_id: id.to_string(),
            confidence,
            recommended_action,
            status,
            checks,
            warnings,
            validated_at: now,
        })
    }

    /// Validate every memory in a repository scope.
    pub async fn validate_all(
        &self,
        owner: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<ValidationResult>, MemoryError> {
        let ids: Vec<String> = self.list(owner, name)?.into_iter().map(|m| m.id).collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match self.validate(&id).await {
                Ok(result) => results.push(result),
                // Deleted concurrently
                Err(MemoryError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Extend the expiry window without re-checking citations.
    pub fn refresh(&self, id: &str) -> Result<bool, MemoryError> {
        let now = self.clock.now();
        let found = match self.write()?.get_mut(id) {
            Some(memory) => {
                memory.last_validated_at = Some(now);
                true
            }
            None => false,
        };
        if found {
            self.persist()?;
        }
        Ok(found)
    }

    /// Delete expired memories, optionally scoped to one repository.
    pub fn prune_expired(
        &self,
        owner: Option<&str>,
        name: Option<&str>,
    ) -> Result<usize, MemoryError> {
        let now = self.clock.now();
        let removed: Vec<String> = {
            let mut memories = self.write()?;
            let expired: Vec<String> = memories
                .values()
                .filter(|m| m.belongs_to(owner, name) && m.is_expired(self.ttl_days, now))
                .map(|m| m.id.clone())
                .collect();
            for id in &expired {
                memories.remove(id);
            }
            expired
        };

        if !removed.is_empty() {
            self.forget_locks(&removed);
            self.persist()?;
            info!("Pruned {} expired memories", removed.len());
        }
        Ok(removed.len())
    }

    pub fn statistics(&self, owner: &str, name: &str) -> Result<MemoryStatistics, MemoryError> {
        let now = self.clock.now();
        let memories = self.read()?;
        let scoped: Vec<&Memory> = memories
            .values()
            .filter(|m| m.owner == owner && m.name == name)
            .collect();

        let mut stats = MemoryStatistics {
            total: scoped.len(),
            ..Default::default()
        };
        let mut file_counts: HashMap<&str, usize> = HashMap::new();
        let mut most_used: Option<&Memory> = None;

        for memory in scoped.iter().copied() {
            match memory.status {
                MemoryStatus::Active => stats.active += 1,
                MemoryStatus::Stale => stats.stale += 1,
                MemoryStatus::Invalid => stats.invalid += 1,
                MemoryStatus::Superseded | MemoryStatus::Archived => {}
            }
            if memory.is_expired(self.ttl_days, now) {
                stats.expired += 1;
            }
            stats.total_use_count += memory.use_count;
            if memory.use_count > 0 && most_used.is_none_or(|m| memory.use_count > m.use_count) {
                most_used = Some(memory);
            }
            for citation in &memory.citations {
                *file_counts.entry(citation.file.as_str()).or_default() += 1;
            }
        }

        stats.most_used_subject = most_used.map(|m| m.subject.clone());
        stats.most_cited_file = file_counts
            .into_iter()
            .max_by(|(fa, ca), (fb, cb)| ca.cmp(cb).then_with(|| fb.cmp(fa)))
            .map(|(file, _)| file.to_string());
        Ok(stats)
    }

    pub fn update(&self, id: &str, update: MemoryUpdate) -> Result<Memory, MemoryError> {
        let updated = {
            let mut memories = self.write()?;
            let memory = memories
                .get_mut(id)
                .ok_or_else(|| MemoryError::NotFound { id: id.to_string() })?;
            if let Some(subject) = update.subject {
                memory.subject = subject;
            }
            if let Some(fact) = update.fact {
                memory.fact = fact;
            }
            if let Some(reason) = update.reason {
                memory.reason = reason;
            }
            if let Some(citations) = update.citations {
                memory.citations = citations
                    .into_iter()
                    .map(CitationInput::into_citation)
                    .collect();
            }
            if let Some(status) = update.status {
                memory.status = status;
            }
            memory.clone()
        };
        self.persist()?;
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let removed = self.write()?.remove(id).is_some();
        if removed {
            self.forget_locks(&[id.to_string()]);
            self.persist()?;
        }
        Ok(removed)
    }

    /// Mark `old_id` as replaced by `new_id`.
    pub fn supersede(&self, old_id: &str, new_id: &str) -> Result<(), MemoryError> {
        {
            let mut memories = self.write()?;
            if !memories.contains_key(new_id) {
                return Err(MemoryError::NotFound {
                    id: new_id.to_string(),
                });
            }
            let old = memories
                .get_mut(old_id)
                .ok_or_else(|| MemoryError::NotFound {
                    id: old_id.to_string(),
                })?;
            old.status = MemoryStatus::Superseded;
            old.superseded_by = Some(new_id.to_string());
        }
        self.persist()
    }

    fn lock_for(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, MemoryError> {
        let mut locks = self.locks.lock().map_err(|_| MemoryError::LockPoisoned)?;
        Ok(locks.entry(id.to_string()).or_default().clone())
    }

    fn forget_locks(&self, ids: &[String]) {
        if let Ok(mut locks) = self.locks.lock() {
            for id in ids {
                locks.remove(id);
            }
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Memory>>, MemoryError> {
        self.memories.read().map_err(|_| MemoryError::LockPoisoned)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Memory>>, MemoryError> {
        self.memories.write().map_err(|_| MemoryError::LockPoisoned)
    }

    /// Write the snapshot through a temp file so a crash never leaves a
    /// truncated store.
    fn persist(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = {
            let memories = self.read()?;
            let mut all: Vec<Memory> = memories.values().cloned().collect();
            all.sort_by_key(|m| m.created_at);
            MemoryFile {
                version: FILE_VERSION,
                memories: all,
            }
        };

        let write = || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let content =
                serde_json::to_string_pretty(&file).context("Failed to serialize memories")?;
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, content)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            std::fs::rename(&tmp, path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        };
        write().map_err(MemoryError::Persist)
    }
}

#[async_trait]
impl MemorySearch for MemoryStore {
    async fn search(
        &self,
        repository_path: &Path,
        query: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<Memory>> {
        MemoryStore::search(self, repository_path, query, limit).map_err(|e| anyhow!(e))
    }

    async fn record_use(&self, ids: &[String]) -> anyhow::Result<()> {
        MemoryStore::record_use(self, ids).map_err(|e| anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::clock::ManualClock;
    use crate::memory::types::{CreatedBy, RecommendedAction};
    use crate::testing::InMemoryFileSystem;
    use chrono::Duration;
    use tempfile::tempdir;

    fn provenance(name: &str) -> Provenance {
        Provenance {
            owner: "acme".into(),
            name: name.into(),
            repository_path: PathBuf::from(format!("/repos/{}", name)),
            created_by: CreatedBy::Workflow { id: "wf-1".into() },
        }
    }

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        fs: Arc<InMemoryFileSystem>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fs = Arc::new(InMemoryFileSystem::new());
        let store = MemoryStore::in_memory()
            .with_clock(clock.clone())
            .with_file_system(fs.clone());
        Fixture { store, clock, fs }
    }

    #[test]
    fn test_store_assigns_id_and_active_status() {
        let f = fixture();
        let memory = f
            .store
            .store("Use sqlx", vec![], "database access", "seen in Cargo.toml", provenance("api"))
            .unwrap();
        assert!(!memory.id.is_empty());
        assert_eq!(memory.status, MemoryStatus::Active);
        assert_eq!(memory.created_at, f.clock.now());
        assert!(memory.last_validated_at.is_none());
    }

    #[test]
    fn test_duplicate_subjects_are_kept() {
        let f = fixture();
        f.store.store("a", vec![], "same", "r", provenance("api")).unwrap();
        f.store.store("b", vec![], "same", "r", provenance("api")).unwrap();
        assert_eq!(f.store.list(Some("acme"), Some("api")).unwrap().len(), 2);
    }

    #[test]
    fn test_expiry_follows_ttl_without_validation() {
        let f = fixture();
        let t0 = f.clock.now();
        let memory = f.store.store("fact", vec![], "s", "r", provenance("api")).unwrap();
        assert_eq!(f.store.expires_at(&memory), t0 + Duration::days(28));

        f.clock.advance(Duration::days(27));
        assert!(!f.store.is_expired(&memory));
        f.clock.advance(Duration::days(2));
        assert!(f.store.is_expired(&memory));
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let f = fixture();
        let store = f.store.with_ttl_days(100_000_000);
        assert_eq!(store.ttl_days(), MAX_TTL_DAYS);

        let memory = store
            .store("Sessions use redis", vec![], "session storage", "r", provenance("api"))
            .unwrap();
        let found = store.search(Path::new("/repos/api"), "session", 5).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(store.prune_expired(None, None).unwrap(), 0);
        assert_eq!(store.statistics("acme", "api").unwrap().expired, 0);
        assert!(!store.is_expired(&memory));
    }

    #[test]
    fn test_refresh_extends_window() {
        let f = fixture();
        let memory = f.store.store("fact", vec![], "s", "r", provenance("api")).unwrap();
        f.clock.advance(Duration::days(20));
        assert!(f.store.refresh(&memory.id).unwrap());

        let refreshed = f.store.get(&memory.id).unwrap();
        assert_eq!(f.store.expires_at(&refreshed), f.clock.now() + Duration::days(28));
        assert!(!f.store.refresh("missing").unwrap());
    }

    #[test]
    fn test_search_empty_repository_returns_empty() {
        let f = fixture();
        let results = f
            .store
            .search(Path::new("/repos/empty"), "anything at all", 5)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_ranks_and_limits() {
        let f = fixture();
        f.store
            .store("Sessions use redis", vec![], "session storage", "r", provenance("api"))
            .unwrap();
        f.store
            .store("Errors map to 4xx", vec![], "error handling", "r", provenance("api"))
            .unwrap();
        f.store
            .store("Session cookies are http-only", vec![], "cookies", "r", provenance("api"))
            .unwrap();

        let results = f.store.search(Path::new("/repos/api"), "session storage", 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].subject, "session storage");
        assert_eq!(results[1].subject, "cookies");

        let limited = f.store.search(Path::new("/repos/api"), "errors cookies", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_search_excludes_other_repos_invalid_and_expired() {
        let f = fixture();
        let invalid = f.store.store("redis", vec![], "cache", "r", provenance("api")).unwrap();
        f.store.store("redis", vec![], "cache", "r", provenance("web")).unwrap();
        f.store
            .update(
                &invalid.id,
                MemoryUpdate {
                    status: Some(MemoryStatus::Invalid),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(f.store.search(Path::new("/repos/api"), "cache", 5).unwrap().is_empty());

        f.clock.advance(Duration::days(29));
        assert!(f.store.search(Path::new("/repos/web"), "cache", 5).unwrap().is_empty());
    }

    #[test]
    fn test_record_use_updates_counts() {
        let f = fixture();
        let memory = f.store.store("fact", vec![], "s", "r", provenance("api")).unwrap();
        f.store
            .record_use(&[memory.id.clone(), "unknown".into()])
            .unwrap();
        let used = f.store.get(&memory.id).unwrap();
        assert_eq!(used.use_count, 1);
        assert_eq!(used.last_used_at, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_validate_all_valid_keeps_memory() {
        let f = fixture();
        f.fs.insert(PathBuf::from("/repos/api/src/db.rs"), "pub fn pool() {}\n");
        let memory = f
            .store
            .store(
                "Pool lives in db.rs",
                vec![CitationInput::new("src/db.rs").at_line(1).with_snippet("pub fn pool()")],
                "connection pool",
                "r",
                provenance("api"),
            )
            .unwrap();

        f.clock.advance(Duration::days(3));
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.recommended_action, RecommendedAction::Keep);

        let validated = f.store.get(&memory.id).unwrap();
        assert_eq!(validated.status, MemoryStatus::Active);
        assert_eq!(validated.last_validated_at, Some(f.clock.now()));
        assert_eq!(
            f.store.expires_at(&validated),
            f.clock.now() + Duration::days(28)
        );
        assert_eq!(validated.citations[0].last_verified, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_validate_partial_failure_is_stale() {
        let f = fixture();
        f.fs.insert(PathBuf::from("/repos/api/a.rs"), "fn a() {}\n");
        let memory = f
            .store
            .store(
                "fact",
                vec![CitationInput::new("a.rs"), CitationInput::new("b.rs")],
                "s",
                "r",
                provenance("api"),
            )
            .unwrap();
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.recommended_action, RecommendedAction::UpdateCitations);
        assert_eq!(result.status, MemoryStatus::Stale);
        let stored = f.store.get(&memory.id).unwrap();
        assert!(stored.citations[0].is_valid);
        assert!(!stored.citations[1].is_valid);
    }

    #[tokio::test]
    async fn test_validate_all_failing_is_invalid_and_delete() {
        let f = fixture();
        let memory = f
            .store
            .store("fact", vec![CitationInput::new("gone.rs")], "s", "r", provenance("api"))
            .unwrap();
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 0.0);
        assert_ne!(result.recommended_action, RecommendedAction::Keep);
        assert_eq!(result.status, MemoryStatus::Invalid);
        assert_eq!(result.checks[0].issue, Some(CitationIssue::FileMissing));
    }

    #[tokio::test]
    async fn test_validate_does_not_override_archived() {
        let f = fixture();
        let memory = f
            .store
            .store("fact", vec![CitationInput::new("gone.rs")], "s", "r", provenance("api"))
            .unwrap();
        f.store
            .update(
                &memory.id,
                MemoryUpdate {
                    status: Some(MemoryStatus::Archived),
                    ..Default::default()
                },
            )
            .unwrap();
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.status, MemoryStatus::Archived);
    }

    #[tokio::test]
    async fn test_validate_without_citations() {
        let f = fixture();
        let memory = f.store.store("fact", vec![], "s", "r", provenance("api")).unwrap();
        let result = f.store.validate(&memory.id).await.unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.recommended_action, RecommendedAction::Keep);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_unknown_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.store.validate("missing").await,
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_validations_of_same_memory() {
        let f = fixture();
        f.fs.insert(PathBuf::from("/repos/api/a.rs"), "fn a() {}\n");
        let memory = f
            .store
            .store("fact", vec![CitationInput::new("a.rs")], "s", "r", provenance("api"))
            .unwrap();
        let store = Arc::new(f.store);
        let (a, b) = tokio::join!(store.validate(&memory.id), store.validate(&memory.id));
        assert_eq!(a.unwrap().status, MemoryStatus::Active);
        assert_eq!(b.unwrap().status, MemoryStatus::Active);
    }

    #[test]
    fn test_prune_is_idempotent_and_scoped() {
        let f = fixture();
        f.store.store("old api", vec![], "s", "r", provenance("api")).unwrap();
        f.store.store("old web", vec![], "s", "r", provenance("web")).unwrap();
        f.clock.advance(Duration::days(29));
        f.store.store("fresh api", vec![], "s", "r", provenance("api")).unwrap();

        assert_eq!(f.store.prune_expired(Some("acme"), Some("api")).unwrap(), 1);
        assert_eq!(f.store.prune_expired(Some("acme"), Some("api")).unwrap(), 0);
        assert_eq!(f.store.prune_expired(None, None).unwrap(), 1);
        assert_eq!(f.store.prune_expired(None, None).unwrap(), 0);
        assert_eq!(f.store.list(None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_statistics_aggregate_without_mutation() {
        let f = fixture();
        let a = f
            .store
            .store(
                "a",
                vec![CitationInput::new("src/lib.rs"), CitationInput::new("src/db.rs")],
                "routing",
                "r",
                provenance("api"),
            )
            .unwrap();
        f.store
            .store("b", vec![CitationInput::new("src/lib.rs")], "auth", "r", provenance("api"))
            .unwrap();
        f.store.record_use(&[a.id.clone(), a.id.clone()]).unwrap();

        let before = f.store.list(None, None).unwrap();
        let stats = f.store.statistics("acme", "api").unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.total_use_count, 2);
        assert_eq!(stats.most_used_subject.as_deref(), Some("routing"));
        assert_eq!(stats.most_cited_file.as_deref(), Some("src/lib.rs"));
        assert_eq!(f.store.list(None, None).unwrap(), before);
    }

    #[test]
    fn test_supersede_and_delete() {
        let f = fixture();
        let old = f.store.store("old", vec![], "s", "r", provenance("api")).unwrap();
        let new = f.store.store("new", vec![], "s", "r", provenance("api")).unwrap();
        f.store.supersede(&old.id, &new.id).unwrap();
        let old = f.store.get(&old.id).unwrap();
        assert_eq!(old.status, MemoryStatus::Superseded);
        assert_eq!(old.superseded_by.as_deref(), Some(new.id.as_str()));

        assert!(f.store.delete(&new.id).unwrap());
        assert!(!f.store.delete(&new.id).unwrap());
        assert!(f.store.supersede(&old.id, &new.id).is_err());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let id = {
            let store = MemoryStore::open(&path).unwrap();
            store
                .store("fact", vec![CitationInput::new("a.rs").at_line(3)], "s", "r", provenance("api"))
                .unwrap()
                .id
        };
        let store = MemoryStore::open(&path).unwrap();
        let memory = store.get(&id).unwrap();
        assert_eq!(memory.citations[0].line, Some(3));
    }

    #[tokio::test]
    async fn test_memory_search_trait_delegates() {
        let f = fixture();
        f.store.store("redis", vec![], "cache layer", "r", provenance("api")).unwrap();
        let searcher: &dyn MemorySearch = &f.store;
        let found = searcher.search(Path::new("/repos/api"), "cache", 5).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
