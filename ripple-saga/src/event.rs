//! The saga coordinator's event stream schema: a stable shape broadcast to
//! every subscriber at each phase transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaEventKind {
    SagaStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    CompensationStarted,
    CompensationCompleted,
    CompensationFailed,
    SagaCompleted,
    SagaFailed,
}

/// A single emitted saga event. Every field besides `event`, `saga_id`, and
/// `timestamp` is optional, since not every event kind carries step-level or
/// error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    pub event: SagaEventKind,
    pub saga_id: Uuid,
    pub step_name: Option<String>,
    pub step_index: Option<usize>,
    pub total_steps: Option<usize>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SagaEvent {
    pub fn new(event: SagaEventKind, saga_id: Uuid) -> Self {
        Self {
            event,
            saga_id,
            step_name: None,
            step_index: None,
            total_steps: None,
            duration_ms: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_step(mut self, name: impl Into<String>, index: usize, total: usize) -> Self {
        self.step_name = Some(name.into());
        self.step_index = Some(index);
        self.total_steps = Some(total);
        self
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total_steps = Some(total);
        self
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
