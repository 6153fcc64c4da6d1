//! ripple-saga - Saga coordinator, transaction context, and persistence
//! interface for multi-step compensating transactions.

pub mod coordinator;
pub mod event;
pub mod persistence;
pub mod step;
pub mod transaction;

pub use coordinator::{SagaCoordinator, SagaOutcome};
pub use event::{SagaEvent, SagaEventKind};
pub use persistence::{PersistedSaga, PersistedSagaStatus, SagaPersistence};
pub use step::SagaStep;
pub use transaction::{TransactionContext, TransactionalStore};
