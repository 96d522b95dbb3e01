//! Memory and citation records, plus the validation and statistics shapes
//! the store returns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    #[default]
    Active,
    Stale,
    Invalid,
    Superseded,
    Archived,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Invalid => "invalid",
            Self::Superseded => "superseded",
            Self::Archived => "archived",
        }
    }

    /// Validation never moves a memory out of these states.
    pub fn is_retired(&self) -> bool {
        matches!(self, Self::Superseded | Self::Archived)
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "stale" => Ok(Self::Stale),
            "invalid" => Ok(Self::Invalid),
            "superseded" => Ok(Self::Superseded),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Invalid memory status: {}", s)),
        }
    }
}

/// Who created a memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreatedBy {
    Workflow { id: String },
    User { name: String },
}

/// Repository scope and creator of a new memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub owner: String,
    pub name: String,
    pub repository_path: PathBuf,
    pub created_by: CreatedBy,
}

/// Pointer from a memory to the file/line evidence that supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Repository-relative path
    pub file: String,
    /// 1-based line number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Content captured when the citation was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
    /// Result of the most recent validation pass only
    #[serde(default = "default_true")]
    pub is_valid: bool,
}

fn default_true() -> bool {
    true
}

/// Caller-supplied citation for `MemoryStore::store`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationInput {
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl CitationInput {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            line: None,
            snippet: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_snippet(mut self, snippet: &str) -> Self {
        self.snippet = Some(snippet.to_string());
        self
    }

    /// Parse `path` or `path:line`.
    pub fn parse(spec: &str) -> Self {
        if let Some((file, line)) = spec.rsplit_once(':')
            && let Ok(line) = line.parse::<u32>()
        {
            return Self::new(file).at_line(line);
        }
        Self::new(spec)
    }

    pub(crate) fn into_citation(self) -> Citation {
        Citation {
            file: self.file,
            line: self.line,
            snippet: self.snippet,
            last_verified: None,
            is_valid: true,
        }
    }
}

/// A durable, citation-backed fact reused across prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub repository_path: PathBuf,
    pub subject: String,
    pub fact: String,
    pub reason: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub status: MemoryStatus,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u64,
    /// Id of the memory that replaced this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

impl Memory {
    /// `(last_validated_at ?? created_at) + ttl_days`, saturating at the
    /// ends of the representable range.
    pub fn expires_at(&self, ttl_days: i64) -> DateTime<Utc> {
        let base = self.last_validated_at.unwrap_or(self.created_at);
        let saturated = if ttl_days < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        Duration::try_days(ttl_days)
            .and_then(|ttl| base.checked_add_signed(ttl))
            .unwrap_or(saturated)
    }

    pub fn is_expired(&self, ttl_days: i64, now: DateTime<Utc>) -> bool {
        now > self.expires_at(ttl_days)
    }

    pub fn belongs_to(&self, owner: Option<&str>, name: Option<&str>) -> bool {
        owner.is_none_or(|o| self.owner == o) && name.is_none_or(|n| self.name == n)
    }
}

/// Field updates applied by `MemoryStore::update`. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub subject: Option<String>,
    pub fact: Option<String>,
    pub reason: Option<String>,
    pub citations: Option<Vec<CitationInput>>,
    pub status: Option<MemoryStatus>,
}

/// Why a citation failed (or what was noticed while it passed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationIssue {
    OutsideRepository,
    FileMissing,
    Unreadable { message: String },
    LineOutOfRange { line: u32, line_count: u32 },
    SnippetMismatch,
    /// Snippet found, but not near the recorded line
    Moved { line: u32 },
}

impl std::fmt::Display for CitationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideRepository => write!(f, "path escapes the repository"),
            Self::FileMissing => write!(f, "file no longer exists"),
            Self::Unreadable { message } => write!(f, "file could not be read: {}", message),
            Self::LineOutOfRange { line, line_count } => {
                write!(f, "line {} is past end of file ({} lines)", line, line_count)
            }
            Self::SnippetMismatch => write!(f, "recorded snippet not found in file"),
            Self::Moved { line } => write!(f, "snippet moved to line {}", line),
        }
    }
}

/// Outcome for one citation in a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCheck {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<CitationIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Keep,
    UpdateCitations,
    ReviewManually,
    Delete,
}

impl RecommendedAction {
    /// Map a confidence score to an action.
    pub fn from_confidence(confidence: f64, any_valid: bool) -> Self {
        if confidence >= 0.8 {
            Self::Keep
        } else if confidence >= 0.4 {
            if any_valid {
                Self::UpdateCitations
            } else {
                Self::ReviewManually
            }
        } else {
            Self::Delete
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::UpdateCitations => "update_citations",
            Self::ReviewManually => "review_manually",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub memory_id: String,
    /// valid / total, or 1.0 with no citations
    pub confidence: f64,
    pub recommended_action: RecommendedAction,
    pub status: MemoryStatus,
    pub checks: Vec<CitationCheck>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn valid_count(&self) -> usize {
        self.checks.iter().filter(|c| c.is_valid).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total: usize,
    pub active: usize,
    pub stale: usize,
    pub invalid: usize,
    pub expired: usize,
    pub total_use_count: u64,
    pub most_used_subject: Option<String>,
    pub most_cited_file: Option<String>,
}
