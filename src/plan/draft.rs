//! Plan drafts: the caller-provided shape a plan is materialized from.
//!
//! A draft carries names, descriptions and tasks but no numbering. The plan
//! store assigns phase numbers 1..n and task ids `"{phase}.{index}"`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::{ImplementationPlan, Phase, Task};
use crate::agents::AgentRole;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub description: String,
    #[serde(default)]
    pub target_files: Vec<String>,
    #[serde(default)]
    pub integration_points: Vec<String>,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default)]
    pub complexity: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// 1-based positions of the phases this one depends on
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDraft {
    pub title: String,
    #[serde(default)]
    pub feature_id: Option<String>,
    pub phases: Vec<PhaseDraft>,
}

impl PlanDraft {
    /// Load a draft from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan draft: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan draft JSON: {}", path.display()))
    }

    /// Materialize the draft into a numbered, active plan.
    pub fn materialize(self, repository_path: PathBuf) -> ImplementationPlan {
        let phases = self
            .phases
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let number = i as u32 + 1;
                let tasks = draft
                    .tasks
                    .into_iter()
                    .enumerate()
                    .map(|(j, t)| {
                        let mut task = Task::new(&format!("{}.{}", number, j + 1), &t.description);
                        task.target_files = t.target_files;
                        task.integration_points = t.integration_points;
                        task.role = t.role;
                        task.complexity = t.complexity;
                        task
                    })
                    .collect();
                let mut phase = Phase::new(number, &draft.name, tasks);
                phase.description = draft.description;
                phase.acceptance_criteria = draft.acceptance_criteria;
                phase.depends_on = draft.depends_on;
                phase
            })
            .collect();

        let mut plan = ImplementationPlan::new(&self.title, repository_path, phases);
        plan.feature_id = self.feature_id;
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PlanDraft {
        serde_json::from_str(
            r#"{
                "title": "Add login",
                "phases": [
                    {"name": "Schema", "tasks": [
                        {"description": "Create users table", "target_files": ["db/schema.sql"]},
                        {"description": "Add migration", "role": "tester"}
                    ]},
                    {"name": "Endpoints", "depends_on": [1], "tasks": [
                        {"description": "POST /login"}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_materialize_assigns_numbers_and_ids() {
        let plan = sample().materialize(PathBuf::from("/repo"));
        assert_eq!(plan.title, "Add login");
        assert_eq!(plan.phase_numbers(), vec![1, 2]);
        let ids: Vec<&str> = plan.phases[0].tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "1.2"]);
        assert_eq!(plan.phases[1].tasks[0].id, "2.1");
        assert_eq!(plan.phases[1].depends_on, vec![1]);
    }

    #[test]
    fn test_materialize_carries_task_fields() {
        let plan = sample().materialize(PathBuf::from("/repo"));
        let first = &plan.phases[0].tasks[0];
        assert_eq!(first.target_files, vec!["db/schema.sql"]);
        assert_eq!(first.attempts, 0);
        assert_eq!(plan.phases[0].tasks[1].role, AgentRole::Tester);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        std::fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();
        let draft = PlanDraft::load(&path).unwrap();
        assert_eq!(draft.phases.len(), 2);
    }

    #[test]
    fn test_load_invalid_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = PlanDraft::load(&path).unwrap_err().to_string();
        assert!(err.contains("bad.json"));
    }
}
