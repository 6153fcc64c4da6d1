//! Error taxonomy for ripple operations.
//!
//! Each domain gets its own `thiserror`-derived enum; `RippleError`
//! aggregates them behind `#[from]` into a single umbrella type.
//! Classification (`.kind()`, `.is_retryable()`) lives on the umbrella type
//! so the retry loop and the sync state machine can pattern-match without
//! caring which domain an error came from.

use thiserror::Error;

/// Context carried by every surfaced error: which operation was running,
/// what it was operating on, and which attempt this was.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpContext {
    pub op: &'static str,
    pub target: Option<String>,
    pub attempt: u32,
}

impl OpContext {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            target: None,
            attempt: 1,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

impl std::fmt::Display for OpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} ({}), attempt {}", self.op, target, self.attempt),
            None => write!(f, "{}, attempt {}", self.op, self.attempt),
        }
    }
}

/// Backend and cache errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("not found during {context}")]
    NotFound { context: OpContext },

    #[error("network failure during {context}: {reason}")]
    Network { context: OpContext, reason: String },

    #[error("timeout during {context}")]
    Timeout { context: OpContext },

    #[error("transaction failed during {context}: {reason}")]
    Transaction { context: OpContext, reason: String },

    #[error("backing store lock poisoned")]
    LockPoisoned,
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Remote write conflicts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConflictError {
    #[error("remote rejected write during {context}: {reason}")]
    Rejected { context: OpContext, reason: String },

    #[error("conflict resolution returned unresolved during {context}")]
    Unresolved { context: OpContext },
}

/// Sync-loop errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("retries exhausted after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("sync loop is paused")]
    Paused,
}

/// Credential and permission errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("authentication failed during {context}")]
    Authentication { context: OpContext },

    #[error("authorization denied during {context}: {reason}")]
    Authorization { context: OpContext, reason: String },
}

/// Field-level encryption errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CryptoError {
    #[error("encryption failed for field {field}: {reason}")]
    EncryptFailed { field: String, reason: String },

    #[error("decryption failed for field {field}: authentication tag mismatch")]
    TagMismatch { field: String },

    #[error("unrecognized ciphertext envelope for field {field}: {reason}")]
    MalformedEnvelope { field: String, reason: String },
}

/// Lifecycle errors (operations before `initialize()` or after `dispose()`).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("store is not ready: {reason}")]
    NotReady { reason: &'static str },
}

/// Saga execution errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SagaError {
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("step '{step}' timed out after {timeout_ms}ms")]
    StepTimedOut { step: String, timeout_ms: u64 },

    #[error("compensation for step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    #[error("saga exceeded its overall timeout of {timeout_ms}ms")]
    SagaTimedOut { timeout_ms: u64 },
}

/// Audit log errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuditError {
    #[error("failed to append audit entry: {reason}")]
    AppendFailed { reason: String },

    #[error("hash chain integrity check failed at index {index}")]
    IntegrityMismatch { index: u64 },
}

/// GDPR service errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GdprError {
    #[error("entity type '{entity_type}' is not registered with the GDPR service")]
    EntityTypeNotRegistered { entity_type: String },

    #[error("erasure failed for entity type '{entity_type}': {reason}")]
    ErasureFailed { entity_type: String, reason: String },
}

/// A classification of an error independent of which domain raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Network,
    Timeout,
    Validation,
    Conflict,
    Sync,
    Authentication,
    Authorization,
    Transaction,
    Encryption,
    NotReady,
    Unknown,
}

/// The umbrella error type returned by every ripple operation.
#[derive(Debug, Clone, Error)]
pub enum RippleError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("gdpr error: {0}")]
    Gdpr(#[from] GdprError),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl RippleError {
    /// Classify this error by kind, independent of which domain raised it.
    /// The default retryable kinds are `{Network, Timeout}`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RippleError::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            RippleError::Storage(StorageError::Network { .. }) => ErrorKind::Network,
            RippleError::Storage(StorageError::Timeout { .. }) => ErrorKind::Timeout,
            RippleError::Storage(StorageError::Transaction { .. }) => ErrorKind::Transaction,
            RippleError::Storage(StorageError::LockPoisoned) => ErrorKind::Unknown,
            RippleError::Validation(_) => ErrorKind::Validation,
            RippleError::Conflict(_) => ErrorKind::Conflict,
            RippleError::Sync(_) => ErrorKind::Sync,
            RippleError::Auth(AuthError::Authentication { .. }) => ErrorKind::Authentication,
            RippleError::Auth(AuthError::Authorization { .. }) => ErrorKind::Authorization,
            RippleError::Crypto(_) => ErrorKind::Encryption,
            RippleError::Lifecycle(_) => ErrorKind::NotReady,
            RippleError::Saga(_) => ErrorKind::Unknown,
            RippleError::Audit(_) => ErrorKind::Unknown,
            RippleError::Gdpr(_) => ErrorKind::Unknown,
            RippleError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether the error should be retried by the sync loop or by
    /// `cacheAndNetwork` background revalidation. The default retryable set
    /// is `{network, timeout}`; `conflict` is routed to conflict
    /// resolution rather than retried; `authentication`/`authorization`/
    /// `validation`/`encryption` never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }
}

/// Result alias used throughout the ripple workspace.
pub type RippleResult<T> = Result<T, RippleError>;
