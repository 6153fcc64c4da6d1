//! Optional crash-recovery persistence for sagas. Only the interface is
//! defined here; the only implementation that ships lives in
//! `ripple-test-utils` — a real implementation is an external collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ripple_core::RippleResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedSagaStatus {
    InProgress,
    Completed,
    Failed,
    Compensated,
}

/// The durable record of a saga's progress, enough to resume or compensate
/// it after a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSaga {
    pub saga_id: Uuid,
    pub step_names: Vec<String>,
    pub completed: Vec<(String, Value)>,
    pub status: PersistedSagaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedSaga {
    pub fn new(saga_id: Uuid, step_names: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            saga_id,
            step_names,
            completed: Vec::new(),
            status: PersistedSagaStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Crash-recovery persistence for sagas. `get_incomplete` is what a process
/// calls at startup to find sagas that need their compensations replayed.
#[async_trait]
pub trait SagaPersistence: Send + Sync {
    async fn save(&self, saga: &PersistedSaga) -> RippleResult<()>;
    async fn load(&self, saga_id: Uuid) -> RippleResult<Option<PersistedSaga>>;
    async fn delete(&self, saga_id: Uuid) -> RippleResult<()>;
    async fn get_incomplete(&self) -> RippleResult<Vec<PersistedSaga>>;
    async fn clear(&self) -> RippleResult<()>;
}
