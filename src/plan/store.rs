//! Plan store: owns plan records and the "current plan" pointer.
//!
//! Plans are kept in memory and, when the store was opened on a directory,
//! written through to `<dir>/<id>.json`. The current plan id lives in
//! `<dir>/current`.

use anyhow::{Context, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use super::draft::PlanDraft;
use super::types::ImplementationPlan;
use crate::errors::PlanError;

const CURRENT_FILE: &str = "current";

#[derive(Default)]
struct Inner {
    plans: HashMap<String, ImplementationPlan>,
    /// repository path -> current plan id
    current: HashMap<PathBuf, String>,
}

pub struct PlanStore {
    dir: Option<PathBuf>,
    inner: RwLock<Inner>,
}

impl PlanStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Open (or create) a store backed by `dir`, loading every saved plan.
    pub fn open(dir: &Path) -> Result<Self, PlanError> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create plans directory: {}", dir.display()))
            .map_err(PlanError::Persist)?;

        let mut inner = Inner::default();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read plans directory: {}", dir.display()))
            .map_err(PlanError::Persist)?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let plan = load_plan(&path).map_err(PlanError::Persist)?;
            inner.plans.insert(plan.id.clone(), plan);
        }

        let current_path = dir.join(CURRENT_FILE);
        if let Ok(id) = std::fs::read_to_string(&current_path) {
            let id = id.trim().to_string();
            if let Some(plan) = inner.plans.get(&id) {
                inner.current.insert(plan.repository_path.clone(), id);
            }
        }

        debug!("Loaded {} plan(s) from {}", inner.plans.len(), dir.display());
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            inner: RwLock::new(inner),
        })
    }

    /// Materialize a draft into a new plan, persist it, and make it current
    /// for its repository.
    pub fn create(
        &self,
        draft: PlanDraft,
        repository_path: PathBuf,
    ) -> Result<ImplementationPlan, PlanError> {
        let plan = draft.materialize(repository_path);
        self.save(&plan)?;
        self.set_current(&plan.repository_path, &plan.id)?;
        Ok(plan)
    }

    pub fn get(&self, id: &str) -> Result<ImplementationPlan, PlanError> {
        let inner = self.read()?;
        inner
            .plans
            .get(id)
            .cloned()
            .ok_or_else(|| PlanError::NotFound { id: id.to_string() })
    }

    /// Insert or replace a plan.
    pub fn save(&self, plan: &ImplementationPlan) -> Result<(), PlanError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.json", plan.id));
            let content = serde_json::to_string_pretty(plan)
                .context("Failed to serialize plan")
                .map_err(PlanError::Persist)?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write plan file: {}", path.display()))
                .map_err(PlanError::Persist)?;
        }
        let mut inner = self.write()?;
        inner.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<bool, PlanError> {
        let mut inner = self.write()?;
        let removed = inner.plans.remove(id).is_some();
        inner.current.retain(|_, current| current != id);
        drop(inner);

        if removed && let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.json", id));
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove plan file: {}", path.display()))
                    .map_err(PlanError::Persist)?;
            }
            let current_path = dir.join(CURRENT_FILE);
            if std::fs::read_to_string(&current_path).is_ok_and(|c| c.trim() == id) {
                std::fs::remove_file(&current_path)
                    .context("Failed to clear current plan")
                    .map_err(PlanError::Persist)?;
            }
        }
        Ok(removed)
    }

    /// All plans, optionally limited to one repository, oldest first.
    pub fn list(&self, repository_path: Option<&Path>) -> Result<Vec<ImplementationPlan>, PlanError> {
        let inner = self.read()?;
        let mut plans: Vec<ImplementationPlan> = inner
            .plans
            .values()
            .filter(|p| repository_path.is_none_or(|r| p.repository_path == r))
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.created_at);
        Ok(plans)
    }

    pub fn current(&self, repository_path: &Path) -> Result<Option<ImplementationPlan>, PlanError> {
        let inner = self.read()?;
        Ok(inner
            .current
            .get(repository_path)
            .and_then(|id| inner.plans.get(id))
            .cloned())
    }

    pub fn set_current(&self, repository_path: &Path, id: &str) -> Result<(), PlanError> {
        let mut inner = self.write()?;
        if !inner.plans.contains_key(id) {
            return Err(PlanError::NotFound { id: id.to_string() });
        }
        inner
            .current
            .insert(repository_path.to_path_buf(), id.to_string());
        drop(inner);

        if let Some(dir) = &self.dir {
            std::fs::write(dir.join(CURRENT_FILE), id)
                .context("Failed to write current plan pointer")
                .map_err(PlanError::Persist)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, PlanError> {
        self.inner
            .read()
            .map_err(|e| PlanError::Persist(anyhow!("Plan store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, PlanError> {
        self.inner
            .write()
            .map_err(|e| PlanError::Persist(anyhow!("Plan store lock poisoned: {}", e)))
    }
}

fn load_plan(path: &Path) -> anyhow::Result<ImplementationPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan JSON: {}", path.display()))
}
