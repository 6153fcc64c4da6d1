//! ripple-core - Entity, query, policy, and error primitives.
//!
//! Pure data structures and contracts with no backend or I/O behavior. Every
//! other crate in the workspace depends on this one.

pub mod config;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod policy;
pub mod query;
pub mod sync_status;
pub mod telemetry;

pub use config::{RetryConfig, StoreConfig};
pub use entity::{CacheEntry, CacheOrigin, Entity, PendingChange, PendingOp};
pub use error::{
    AuditError, AuthError, ConflictError, CryptoError, ErrorKind, GdprError, LifecycleError,
    OpContext, RippleError, RippleResult, SagaError, StorageError, SyncError, ValidationError,
};
pub use identifier::Identifier;
pub use policy::{ConflictResolution, FetchPolicy, SyncMode, WritePolicy};
pub use query::{Filter, FilterOperator, OrderBy, Query, SortDirection};
pub use sync_status::SyncStatus;
pub use telemetry::{MetricsConfig, MetricsReporter, NullReporter, SampledReporter};
