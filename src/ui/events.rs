//! Terminal rendering of the workflow event stream.
//!
//! Three output modes:
//! - `full`: every event, styled
//! - `minimal`: phase outcomes and the final result only
//! - `json`: one JSON object per event, for machine consumption

use console::{Term, style};
use std::io::Write;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::events::WorkflowEvent;
use crate::ui::icons::{CHECK, COMMIT, CROSS, RETRY, RUNNING, SKIP, SPARKLE, STAGE, STOP, WARN};
use crate::workflow::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

pub struct EventPrinter {
    mode: UiMode,
    verbose: bool,
    term: Term,
}

impl EventPrinter {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        Self {
            mode,
            verbose,
            term: Term::stdout(),
        }
    }

    /// Print events until every sender is gone. A workflow may emit several
    /// `WorkflowFinished` events when failed steps are retried or skipped.
    pub async fn follow(&self, mut rx: broadcast::Receiver<WorkflowEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event printer fell behind; {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn handle_event(&self, event: &WorkflowEvent) {
        if let Some(line) = self.render(event) {
            let _ = writeln!(&self.term, "{}", line);
        }
    }

    /// Line for `event` in the current mode, or `None` when the mode hides it.
    pub fn render(&self, event: &WorkflowEvent) -> Option<String> {
        match self.mode {
            UiMode::Json => serde_json::to_string(event).ok(),
            UiMode::Minimal => render_minimal(event),
            UiMode::Full => self.render_full(event),
        }
    }

    fn render_full(&self, event: &WorkflowEvent) -> Option<String> {
        let line = match event {
            WorkflowEvent::StageChanged { to, .. } => {
                if !to.is_stage() {
                    return None;
                }
                format!("{}{}", STAGE, style(to.as_str().to_uppercase()).cyan().bold())
            }
            WorkflowEvent::StageWarning { stage, message, .. } => {
                format!("{}{} {}", WARN, style(format!("[{}]", stage)).yellow(), message)
            }
            WorkflowEvent::PhaseStarted { phase, name, .. } => format!(
                "{}Phase {}: {}",
                RUNNING,
                style(phase).yellow().bold(),
                style(name).bold()
            ),
            WorkflowEvent::TaskStarted {
                task_id, attempt, ..
            } => {
                if !self.verbose && *attempt <= 1 {
                    return None;
                }
                format!("    {} task {} (attempt {})", style("→").dim(), task_id, attempt)
            }
            WorkflowEvent::TaskCompleted { task_id, .. } => {
                format!("    {} task {}", style("✓").green(), task_id)
            }
            WorkflowEvent::TaskFailed { task_id, error, .. } => format!(
                "    {} task {}: {}",
                style("✗").red(),
                task_id,
                style(error).red()
            ),
            WorkflowEvent::PhaseCompleted {
                phase, commit_sha, ..
            } => match commit_sha {
                Some(sha) => format!(
                    "{}Phase {} complete {}{}",
                    CHECK,
                    phase,
                    COMMIT,
                    style(short_sha(sha)).dim()
                ),
                None => format!("{}Phase {} complete (nothing to commit)", CHECK, phase),
            },
            WorkflowEvent::PhaseFailed {
                phase,
                error,
                cancelled,
                ..
            } => {
                if *cancelled {
                    format!("{}Phase {} cancelled: {}", STOP, phase, error)
                } else {
                    format!("{}Phase {} failed: {}", CROSS, phase, style(error).red())
                }
            }
            WorkflowEvent::PlanCompleted { .. } => {
                format!("{}{}", CHECK, style("All phases complete").green())
            }
            WorkflowEvent::PlanFailed { reason, .. } => {
                format!("{}{}", CROSS, style(reason).red())
            }
            WorkflowEvent::PlanCancelled { .. } => format!("{}Plan cancelled", STOP),
            WorkflowEvent::StepRetried { stage, phase, .. } => {
                format!("{}Retrying {}{}", RETRY, stage, phase_suffix(*phase))
            }
            WorkflowEvent::StepSkipped { stage, phase, .. } => {
                format!("{}Skipping {}{}", SKIP, stage, phase_suffix(*phase))
            }
            WorkflowEvent::WorkflowFinished { state, error, .. } => finished_line(*state, error),
        };
        Some(line)
    }
}

fn render_minimal(event: &WorkflowEvent) -> Option<String> {
    match event {
        WorkflowEvent::PhaseCompleted { phase, .. } => Some(format!("✓ phase {}", phase)),
        WorkflowEvent::PhaseFailed { phase, error, .. } => {
            Some(format!("✗ phase {} ({})", phase, error))
        }
        WorkflowEvent::WorkflowFinished { state, error, .. } => Some(match error {
            Some(error) => format!("Done: {} ({})", state, error),
            None => format!("Done: {}", state),
        }),
        _ => None,
    }
}

fn finished_line(state: WorkflowState, error: &Option<String>) -> String {
    match (state, error) {
        (WorkflowState::Complete, _) => {
            format!("{}{}", SPARKLE, style("Workflow complete").green().bold())
        }
        (WorkflowState::Aborted, _) => format!("{}{}", STOP, style("Workflow aborted").yellow()),
        (_, Some(error)) => format!(
            "{}{} {}",
            CROSS,
            style(format!("Workflow {}:", state)).red().bold(),
            error
        ),
        (_, None) => format!("{}Workflow {}", CROSS, state),
    }
}

fn phase_suffix(phase: Option<u32>) -> String {
    phase.map(|n| format!(" (phase {})", n)).unwrap_or_default()
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}
