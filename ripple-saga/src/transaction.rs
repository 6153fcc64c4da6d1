//! Builds sagas from typed store operations: `ctx.save`/`ctx.delete` record
//! an auto-compensation derived from the entity's prior state, `ctx.step`
//! accepts arbitrary typed work. `TransactionalStore` is a narrow trait
//! rather than a dependency on `ripple-store` directly, letting a lower
//! layer call into a higher one without a crate cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ripple_core::{Entity, RippleResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::coordinator::{SagaCoordinator, SagaOutcome};
use crate::event::SagaEvent;
use crate::step::SagaStep;

/// The subset of store operations a transaction needs: read-before-write
/// (to capture the compensation snapshot), save, and delete.
#[async_trait]
pub trait TransactionalStore<T: Entity>: Send + Sync {
    async fn get(&self, id: &T::Id) -> RippleResult<Option<T>>;
    async fn save(&self, item: T) -> RippleResult<T>;
    async fn delete(&self, id: &T::Id) -> RippleResult<bool>;
}

#[derive(Serialize, Deserialize)]
struct SaveSnapshot<T> {
    prior: Option<T>,
    saved: T,
}

#[derive(Serialize, Deserialize)]
struct DeleteSnapshot<T> {
    prior: Option<T>,
}

/// A builder that accumulates typed store operations into a saga, then
/// executes them with automatic compensation on failure.
pub struct TransactionContext {
    coordinator: SagaCoordinator,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self {
            coordinator: SagaCoordinator::new(),
        }
    }
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator = self.coordinator.with_overall_timeout(timeout);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SagaEvent> {
        self.coordinator.subscribe()
    }

    pub fn step_count(&self) -> usize {
        self.coordinator.step_count()
    }

    /// Record a save: on compensation, restores `item`'s prior value, or
    /// deletes it if it didn't exist before this transaction touched it.
    pub fn save<T>(mut self, store: Arc<dyn TransactionalStore<T>>, item: T) -> Self
    where
        T: Entity,
    {
        let name = format!("save:{}:{:?}", T::type_name(), item.id());
        let store_fwd = store.clone();
        let item_fwd = item.clone();
        let store_comp = store;
        let step = SagaStep::new(
            name,
            move || {
                let store = store_fwd.clone();
                let item = item_fwd.clone();
                Box::pin(async move {
                    let prior = store.get(&item.id()).await?;
                    let saved = store.save(item).await?;
                    Ok(SaveSnapshot { prior, saved })
                })
            },
            move |snapshot: SaveSnapshot<T>| {
                let store = store_comp.clone();
                Box::pin(async move {
                    match snapshot.prior {
                        Some(prior) => {
                            store.save(prior).await?;
                        }
                        None => {
                            store.delete(&snapshot.saved.id()).await?;
                        }
                    }
                    Ok(())
                })
            },
        );
        self.coordinator = self.coordinator.add_step(step);
        self
    }

    /// Record a delete: on compensation, re-saves the entity's prior value
    /// (a no-op if it never existed).
    pub fn delete<T>(mut self, store: Arc<dyn TransactionalStore<T>>, id: T::Id) -> Self
    where
        T: Entity,
    {
        let name = format!("delete:{}:{:?}", T::type_name(), id);
        let store_fwd = store.clone();
        let id_fwd = id.clone();
        let store_comp = store;
        let step = SagaStep::new(
            name,
            move || {
                let store = store_fwd.clone();
                let id = id_fwd.clone();
                Box::pin(async move {
                    let prior = store.get(&id).await?;
                    store.delete(&id).await?;
                    Ok(DeleteSnapshot::<T> { prior })
                })
            },
            move |snapshot: DeleteSnapshot<T>| {
                let store = store_comp.clone();
                Box::pin(async move {
                    if let Some(prior) = snapshot.prior {
                        store.save(prior).await?;
                    }
                    Ok(())
                })
            },
        );
        self.coordinator = self.coordinator.add_step(step);
        self
    }

    /// Record arbitrary work with its own forward/compensation pair.
    pub fn step<R, Fwd, FwdFut, Comp, CompFut>(mut self, name: impl Into<String>, forward: Fwd, compensation: Comp) -> Self
    where
        R: Serialize + DeserializeOwned + Send + 'static,
        Fwd: Fn() -> FwdFut + Send + Sync + 'static,
        FwdFut: Future<Output = RippleResult<R>> + Send + 'static,
        Comp: Fn(R) -> CompFut + Send + Sync + 'static,
        CompFut: Future<Output = RippleResult<()>> + Send + 'static,
    {
        self.coordinator = self.coordinator.add_step(SagaStep::new(name, forward, compensation));
        self
    }

    pub async fn execute(&self) -> SagaOutcome {
        self.coordinator.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::RippleError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: u64,
        balance: i64,
    }

    impl Entity for Account {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
        fn type_name() -> &'static str {
            "account"
        }
    }

    struct InMemoryAccounts {
        rows: Mutex<std::collections::HashMap<u64, Account>>,
    }

    #[async_trait]
    impl TransactionalStore<Account> for InMemoryAccounts {
        async fn get(&self, id: &u64) -> RippleResult<Option<Account>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }
        async fn save(&self, item: Account) -> RippleResult<Account> {
            self.rows.lock().unwrap().insert(item.id, item.clone());
            Ok(item)
        }
        async fn delete(&self, id: &u64) -> RippleResult<bool> {
            Ok(self.rows.lock().unwrap().remove(id).is_some())
        }
    }

    #[tokio::test]
    async fn save_compensation_restores_prior_balance() {
        let store = Arc::new(InMemoryAccounts {
            rows: Mutex::new(std::collections::HashMap::from([(
                1,
                Account { id: 1, balance: 100 },
            )])),
        });

        let ctx = TransactionContext::new()
            .save(store.clone(), Account { id: 1, balance: 50 })
            .step::<(), _, _, _, _>(
                "force-failure",
                || Box::pin(async { Err(RippleError::Unknown("boom".into())) }),
                |_: ()| Box::pin(async { Ok(()) }),
            );

        let outcome = ctx.execute().await;
        assert!(!outcome.is_success());
        assert_eq!(store.get(&1).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn save_compensation_deletes_newly_created_entity() {
        let store = Arc::new(InMemoryAccounts {
            rows: Mutex::new(std::collections::HashMap::new()),
        });

        let ctx = TransactionContext::new()
            .save(store.clone(), Account { id: 2, balance: 10 })
            .step::<(), _, _, _, _>(
                "force-failure",
                || Box::pin(async { Err(RippleError::Unknown("boom".into())) }),
                |_: ()| Box::pin(async { Ok(()) }),
            );

        ctx.execute().await;
        assert!(store.get(&2).await.unwrap().is_none());
    }
}
