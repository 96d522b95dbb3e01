//! Citation validation heuristic.
//!
//! A citation is checked against the current file contents:
//! 1. The path must stay inside the repository (no absolute paths, no `..`).
//! 2. The file must exist and be readable.
//! 3. A recorded line must not be past end of file.
//! 4. A recorded snippet, compared with all whitespace runs collapsed, must
//!    appear within `SNIPPET_WINDOW` lines of the recorded line. A match
//!    elsewhere in the file still counts as valid but is reported as `Moved`.
//!
//! Without a snippet, existence (and line range) is enough.

use std::path::{Component, Path};

use super::fs::FileSystem;
use super::types::{Citation, CitationCheck, CitationIssue, MemoryStatus, RecommendedAction};

/// Lines on either side of the recorded line searched for the snippet.
pub const SNIPPET_WINDOW: usize = 5;

/// Check one citation against the repository rooted at `repo_root`.
pub async fn check_citation(
    fs: &dyn FileSystem,
    repo_root: &Path,
    citation: &Citation,
) -> CitationCheck {
    let invalid = |issue: CitationIssue| CitationCheck {
        file: citation.file.clone(),
        line: citation.line,
        is_valid: false,
        issue: Some(issue),
    };

    let relative = Path::new(&citation.file);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return invalid(CitationIssue::OutsideRepository);
    }

    let content = match fs.read_to_string(&repo_root.join(relative)).await {
        Ok(Some(content)) => content,
        Ok(None) => return invalid(CitationIssue::FileMissing),
        Err(e) => {
            return invalid(CitationIssue::Unreadable {
                message: e.to_string(),
            });
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    let line_count = lines.len() as u32;

    if let Some(line) = citation.line
        && (line == 0 || line > line_count)
    {
        return invalid(CitationIssue::LineOutOfRange { line, line_count });
    }

    let snippet = citation
        .snippet
        .as_deref()
        .map(normalize)
        .filter(|s| !s.is_empty());

    let Some(snippet) = snippet else {
        return CitationCheck {
            file: citation.file.clone(),
            line: citation.line,
            is_valid: true,
            issue: None,
        };
    };

    let span = citation
        .snippet
        .as_deref()
        .map(|s| s.lines().count().max(1))
        .unwrap_or(1);

    match locate_snippet(&lines, &snippet, span, citation.line) {
        Some(found) => {
            let near = citation.line.is_none_or(|recorded| {
                (found as i64 - recorded as i64).unsigned_abs() as usize <= SNIPPET_WINDOW
            });
            CitationCheck {
                file: citation.file.clone(),
                line: citation.line,
                is_valid: true,
                issue: (!near).then_some(CitationIssue::Moved { line: found }),
            }
        }
        None => invalid(CitationIssue::SnippetMismatch),
    }
}

/// 1-based line where the snippet starts, preferring the match closest to
/// `near` when one is given.
fn locate_snippet(lines: &[&str], snippet: &str, span: usize, near: Option<u32>) -> Option<u32> {
    let matches = (0..lines.len()).filter(|&start| {
        let end = (start + span).min(lines.len());
        normalize(&lines[start..end].join("\n")).contains(snippet)
    });

    match near {
        Some(recorded) => matches
            .map(|start| start as u32 + 1)
            .min_by_key(|line| (*line as i64 - recorded as i64).abs()),
        None => matches.map(|start| start as u32 + 1).next(),
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// valid / total, or 1.0 when there is nothing to check.
pub fn confidence(checks: &[CitationCheck]) -> f64 {
    if checks.is_empty() {
        return 1.0;
    }
    let valid = checks.iter().filter(|c| c.is_valid).count();
    valid as f64 / checks.len() as f64
}

pub fn recommend(checks: &[CitationCheck]) -> RecommendedAction {
    RecommendedAction::from_confidence(confidence(checks), checks.iter().any(|c| c.is_valid))
}

/// Status after a validation pass. Superseded and archived memories keep
/// their status.
pub fn status_after(current: MemoryStatus, checks: &[CitationCheck]) -> MemoryStatus {
    if current.is_retired() {
        return current;
    }
    let valid = checks.iter().filter(|c| c.is_valid).count();
    if checks.is_empty() || valid == checks.len() {
        MemoryStatus::Active
    } else if valid == 0 {
        MemoryStatus::Invalid
    } else {
        MemoryStatus::Stale
    }
}
