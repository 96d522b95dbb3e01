//! Workflow event stream.
//!
//! Events go out on a bounded `tokio::sync::broadcast` channel. Delivery is
//! fire-and-forget: with no subscribers an event is dropped, and a subscriber
//! that falls behind loses the oldest events (`RecvError::Lagged`). Emitting
//! never blocks execution.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::workflow::WorkflowState;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StageChanged {
        workflow_id: String,
        from: WorkflowState,
        to: WorkflowState,
    },
    StageWarning {
        workflow_id: String,
        stage: WorkflowState,
        message: String,
    },
    PhaseStarted {
        plan_id: String,
        phase: u32,
        name: String,
    },
    TaskStarted {
        plan_id: String,
        phase: u32,
        task_id: String,
        attempt: u32,
    },
    TaskCompleted {
        plan_id: String,
        phase: u32,
        task_id: String,
    },
    TaskFailed {
        plan_id: String,
        phase: u32,
        task_id: String,
        error: String,
    },
    PhaseCompleted {
        plan_id: String,
        phase: u32,
        commit_sha: Option<String>,
    },
    PhaseFailed {
        plan_id: String,
        phase: u32,
        error: String,
        cancelled: bool,
    },
    PlanCompleted {
        plan_id: String,
    },
    PlanFailed {
        plan_id: String,
        phase: u32,
        reason: String,
    },
    PlanCancelled {
        plan_id: String,
    },
    StepRetried {
        workflow_id: String,
        stage: WorkflowState,
        phase: Option<u32>,
    },
    StepSkipped {
        workflow_id: String,
        stage: WorkflowState,
        phase: Option<u32>,
    },
    WorkflowFinished {
        workflow_id: String,
        state: WorkflowState,
        error: Option<String>,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageChanged { .. } => "stage_changed",
            Self::StageWarning { .. } => "stage_warning",
            Self::PhaseStarted { .. } => "phase_started",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::PhaseFailed { .. } => "phase_failed",
            Self::PlanCompleted { .. } => "plan_completed",
            Self::PlanFailed { .. } => "plan_failed",
            Self::PlanCancelled { .. } => "plan_cancelled",
            Self::StepRetried { .. } => "step_retried",
            Self::StepSkipped { .. } => "step_skipped",
            Self::WorkflowFinished { .. } => "workflow_finished",
        }
    }

    /// True for the last event a workflow run emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowFinished { .. })
    }
}

/// Cheap-to-clone handle onto the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: WorkflowEvent) {
        trace!(event_type = event.event_type(), "emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn completed(id: &str) -> WorkflowEvent {
        WorkflowEvent::PlanCompleted {
            plan_id: id.to_string(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        bus.emit(completed("p"));
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(completed("a"));
        bus.emit(completed("b"));
        assert_eq!(rx.recv().await.unwrap(), completed("a"));
        assert_eq!(rx.recv().await.unwrap(), completed("b"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for id in ["a", "b", "c"] {
            bus.emit(completed(id));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap(), completed("b"));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(WorkflowEvent::TaskStarted {
            plan_id: "p".into(),
            phase: 2,
            task_id: "2.1".into(),
            attempt: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "task_started");
        assert_eq!(json["task_id"], "2.1");
    }
}
