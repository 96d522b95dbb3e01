//! Agent configuration: per-project-type defaults and role configurations.
//!
//! `AgentConfig::for_project_type` is a pure factory. Every call returns a
//! fresh, immutable value; there is no shared default state to mutate.

use serde::{Deserialize, Serialize};

/// Kind of project being implemented. Selects naming conventions and
/// frameworks for the default agent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Rust,
    Typescript,
    Python,
    Go,
    #[default]
    Generic,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProjectType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rust" => Ok(Self::Rust),
            "typescript" | "ts" => Ok(Self::Typescript),
            "python" | "py" => Ok(Self::Python),
            "go" => Ok(Self::Go),
            "generic" => Ok(Self::Generic),
            _ => anyhow::bail!(
                "Invalid project type '{}'. Valid values: rust, typescript, python, go, generic",
                s
            ),
        }
    }
}

/// Role a task is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    #[default]
    Coder,
    Tester,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields shared by every role configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

/// Role configuration, keyed by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleConfig {
    Orchestrator {
        profile: RoleProfile,
        /// How many phases ahead the orchestrator plans.
        planning_horizon: u32,
    },
    Coder {
        profile: RoleProfile,
        #[serde(default)]
        style_rules: Vec<String>,
    },
    Tester {
        profile: RoleProfile,
        test_framework: String,
        /// Target line coverage, 0.0-1.0.
        coverage_target: f64,
    },
    Reviewer {
        profile: RoleProfile,
        #[serde(default)]
        checklist: Vec<String>,
    },
}

impl RoleConfig {
    pub fn role(&self) -> AgentRole {
        match self {
            Self::Orchestrator { .. } => AgentRole::Orchestrator,
            Self::Coder { .. } => AgentRole::Coder,
            Self::Tester { .. } => AgentRole::Tester,
            Self::Reviewer { .. } => AgentRole::Reviewer,
        }
    }

    pub fn profile(&self) -> &RoleProfile {
        match self {
            Self::Orchestrator { profile, .. }
            | Self::Coder { profile, .. }
            | Self::Tester { profile, .. }
            | Self::Reviewer { profile, .. } => profile,
        }
    }

    /// Role-specific guidance lines appended to the role header of a prompt.
    pub fn guidance(&self) -> Vec<String> {
        match self {
            Self::Orchestrator {
                planning_horizon, ..
            } => vec![format!(
                "Plan at most {} phase(s) ahead and keep tasks independently committable.",
                planning_horizon
            )],
            Self::Coder { style_rules, .. } => style_rules.clone(),
            Self::Tester {
                test_framework,
                coverage_target,
                ..
            } => vec![
                format!("Write tests with {}.", test_framework),
                format!(
                    "Aim for at least {:.0}% line coverage of the code you touch.",
                    coverage_target * 100.0
                ),
            ],
            Self::Reviewer { checklist, .. } => checklist.clone(),
        }
    }
}

/// Configuration handed to the executors for a plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub project_type: ProjectType,
    /// Model identifier forwarded to the generation session.
    #[serde(default)]
    pub model: Option<String>,
    pub naming_conventions: Vec<String>,
    pub frameworks: Vec<String>,
    pub roles: Vec<RoleConfig>,
}

impl AgentConfig {
    /// Default configuration for a project type.
    pub fn for_project_type(project_type: ProjectType) -> Self {
        let (naming_conventions, frameworks, test_framework) = match project_type {
            ProjectType::Rust => (
                vec![
                    "snake_case for functions, modules and variables".to_string(),
                    "UpperCamelCase for types and traits".to_string(),
                    "SCREAMING_SNAKE_CASE for constants".to_string(),
                ],
                vec!["tokio".to_string(), "serde".to_string()],
                "cargo test",
            ),
            ProjectType::Typescript => (
                vec![
                    "camelCase for functions and variables".to_string(),
                    "PascalCase for classes, types and components".to_string(),
                    "kebab-case for file names".to_string(),
                ],
                vec!["node".to_string()],
                "vitest",
            ),
            ProjectType::Python => (
                vec![
                    "snake_case for functions, modules and variables".to_string(),
                    "PascalCase for classes".to_string(),
                ],
                vec![],
                "pytest",
            ),
            ProjectType::Go => (
                vec![
                    "MixedCaps for exported identifiers".to_string(),
                    "short lowercase package names".to_string(),
                ],
                vec![],
                "go test",
            ),
            ProjectType::Generic => (vec![], vec![], "the project's existing test runner"),
        };

        Self {
            project_type,
            model: None,
            naming_conventions,
            frameworks,
            roles: default_roles(test_framework),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Look up the configuration for a role, if one is defined.
    pub fn role(&self, role: AgentRole) -> Option<&RoleConfig> {
        self.roles.iter().find(|r| r.role() == role)
    }

    /// System prompt for a generation session using this configuration.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are implementing changes in a {} project. Make the requested changes directly in the working tree.",
            self.project_type
        );
        if !self.naming_conventions.is_empty() {
            prompt.push_str("\n\nNaming conventions:\n");
            for rule in &self.naming_conventions {
                prompt.push_str(&format!("- {}\n", rule));
            }
        }
        if !self.frameworks.is_empty() {
            prompt.push_str(&format!(
                "\nPreferred frameworks: {}\n",
                self.frameworks.join(", ")
            ));
        }
        prompt
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::for_project_type(ProjectType::default())
    }
}

fn default_roles(test_framework: &str) -> Vec<RoleConfig> {
    vec![
        RoleConfig::Orchestrator {
            profile: RoleProfile {
                description: "Coordinates the plan and keeps phases coherent".to_string(),
                responsibilities: vec![
                    "Break work into committable steps".to_string(),
                    "Keep integration points consistent".to_string(),
                ],
            },
            planning_horizon: 1,
        },
        RoleConfig::Coder {
            profile: RoleProfile {
                description: "Implements production code".to_string(),
                responsibilities: vec![
                    "Modify only the files the task needs".to_string(),
                    "Follow existing patterns in the codebase".to_string(),
                ],
            },
            style_rules: vec!["Match the style of surrounding code.".to_string()],
        },
        RoleConfig::Tester {
            profile: RoleProfile {
                description: "Writes and maintains tests".to_string(),
                responsibilities: vec!["Cover new behavior and edge cases".to_string()],
            },
            test_framework: test_framework.to_string(),
            coverage_target: 0.8,
        },
        RoleConfig::Reviewer {
            profile: RoleProfile {
                description: "Reviews changes for correctness and clarity".to_string(),
                responsibilities: vec!["Flag defects before they are committed".to_string()],
            },
            checklist: vec![
                "Errors are handled, not ignored.".to_string(),
                "Public behavior is covered by tests.".to_string(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_is_pure() {
        let a = AgentConfig::for_project_type(ProjectType::Rust);
        let b = AgentConfig::for_project_type(ProjectType::Rust);
        assert_eq!(a, b);
    }

    #[test]
    fn test_factory_covers_every_role() {
        let config = AgentConfig::for_project_type(ProjectType::Python);
        for role in [
            AgentRole::Orchestrator,
            AgentRole::Coder,
            AgentRole::Tester,
            AgentRole::Reviewer,
        ] {
            assert_eq!(config.role(role).map(|r| r.role()), Some(role));
        }
    }

    #[test]
    fn test_tester_uses_project_test_framework() {
        let config = AgentConfig::for_project_type(ProjectType::Python);
        match config.role(AgentRole::Tester) {
            Some(RoleConfig::Tester { test_framework, .. }) => assert_eq!(test_framework, "pytest"),
            other => panic!("Expected tester config, got {:?}", other),
        }
    }

    #[test]
    fn test_system_prompt_lists_conventions() {
        let prompt = AgentConfig::for_project_type(ProjectType::Rust).system_prompt();
        assert!(prompt.contains("rust project"));
        assert!(prompt.contains("snake_case"));
        assert!(prompt.contains("tokio"));
    }

    #[test]
    fn test_generic_system_prompt_has_no_convention_section() {
        let prompt = AgentConfig::default().system_prompt();
        assert!(!prompt.contains("Naming conventions"));
    }

    #[test]
    fn test_project_type_from_str() {
        assert_eq!("TS".parse::<ProjectType>().unwrap(), ProjectType::Typescript);
        assert!("cobol".parse::<ProjectType>().is_err());
    }

    #[test]
    fn test_role_config_serde_is_tagged() {
        let role = RoleConfig::Reviewer {
            profile: RoleProfile {
                description: "r".into(),
                responsibilities: vec![],
            },
            checklist: vec!["a".into()],
        };
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["role"], "reviewer");
    }
}
