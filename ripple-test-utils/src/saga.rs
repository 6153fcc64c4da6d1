//! The in-memory `SagaPersistence` the crate doc comment on
//! `ripple_saga::persistence::SagaPersistence` points to — the only
//! implementation that ships, since a real persistence layer is an
//! external collaborator.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ripple_core::RippleResult;
use ripple_saga::persistence::{PersistedSaga, PersistedSagaStatus, SagaPersistence};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySagaPersistence {
    sagas: RwLock<HashMap<Uuid, PersistedSaga>>,
}

impl InMemorySagaPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaPersistence for InMemorySagaPersistence {
    async fn save(&self, saga: &PersistedSaga) -> RippleResult<()> {
        self.sagas
            .write()
            .expect("in-memory saga persistence lock poisoned")
            .insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn load(&self, saga_id: Uuid) -> RippleResult<Option<PersistedSaga>> {
        Ok(self
            .sagas
            .read()
            .expect("in-memory saga persistence lock poisoned")
            .get(&saga_id)
            .cloned())
    }

    async fn delete(&self, saga_id: Uuid) -> RippleResult<()> {
        self.sagas
            .write()
            .expect("in-memory saga persistence lock poisoned")
            .remove(&saga_id);
        Ok(())
    }

    async fn get_incomplete(&self) -> RippleResult<Vec<PersistedSaga>> {
        Ok(self
            .sagas
            .read()
            .expect("in-memory saga persistence lock poisoned")
            .values()
            .filter(|s| s.status == PersistedSagaStatus::InProgress)
            .cloned()
            .collect())
    }

    async fn clear(&self) -> RippleResult<()> {
        self.sagas.write().expect("in-memory saga persistence lock poisoned").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let persistence = InMemorySagaPersistence::new();
        let saga = PersistedSaga::new(Uuid::now_v7(), vec!["reserve".into(), "charge".into()]);
        let saga_id = saga.saga_id;
        persistence.save(&saga).await.unwrap();
        let loaded = persistence.load(saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.saga_id, saga_id);
        assert_eq!(loaded.step_names, vec!["reserve", "charge"]);
    }

    #[tokio::test]
    async fn get_incomplete_excludes_terminal_sagas() {
        let persistence = InMemorySagaPersistence::new();
        let mut in_progress = PersistedSaga::new(Uuid::now_v7(), vec!["a".into()]);
        in_progress.status = PersistedSagaStatus::InProgress;
        let mut completed = PersistedSaga::new(Uuid::now_v7(), vec!["b".into()]);
        completed.status = PersistedSagaStatus::Completed;
        persistence.save(&in_progress).await.unwrap();
        persistence.save(&completed).await.unwrap();

        let incomplete = persistence.get_incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].saga_id, in_progress.saga_id);
    }

    #[tokio::test]
    async fn delete_removes_the_saga() {
        let persistence = InMemorySagaPersistence::new();
        let saga = PersistedSaga::new(Uuid::now_v7(), vec!["a".into()]);
        let saga_id = saga.saga_id;
        persistence.save(&saga).await.unwrap();
        persistence.delete(saga_id).await.unwrap();
        assert!(persistence.load(saga_id).await.unwrap().is_none());
    }
}
