//! The append-only audit hash chain: each event carries the previous
//! event's hash, a chosen hash algorithm, and a canonical-JSON digest of its
//! own payload, so tampering with or removing an entry breaks every later
//! link. The default in-memory store behind it is `Arc<Mutex<Vec<_>>>`
//! with append/query/len/clear.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use ripple_core::{RippleError, RippleResult, StorageError};

/// The well-known seed hash for the genesis entry (index 0's `prev_hash`).
pub const CHAIN_SEED: [u8; 32] = [0u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Sha256,
    #[default]
    Blake3,
}

fn digest(algorithm: HashAlgorithm, prev_hash: &[u8; 32], body: &[u8]) -> [u8; 32] {
    match algorithm {
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(prev_hash);
            hasher.update(body);
            *hasher.finalize().as_bytes()
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(prev_hash);
            hasher.update(body);
            hasher.finalize().into()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    List,
    Export,
    Erase,
    AccessDenied,
}

/// A single append-only audit entry. `hash` commits to `prev_hash` and the
/// canonical JSON of every other field; the chain is valid iff recomputing
/// `hash` from the stored fields reproduces the stored value for every
/// entry in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp_utc: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub success: bool,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

/// The fields committed to by `hash`, everything but `hash` itself.
#[derive(Serialize)]
struct AuditBody<'a> {
    id: &'a Uuid,
    timestamp_utc: &'a DateTime<Utc>,
    actor_id: &'a Option<String>,
    action: &'a AuditAction,
    entity_type: &'a str,
    entity_id: &'a Option<String>,
    success: bool,
    prev_hash: &'a [u8; 32],
}

impl AuditEntry {
    /// Build and seal a new entry chained onto `prev_hash`.
    pub fn new(
        actor_id: Option<String>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        success: bool,
        prev_hash: [u8; 32],
        algorithm: HashAlgorithm,
    ) -> Self {
        let id = Uuid::now_v7();
        let timestamp_utc = Utc::now();
        let entity_type = entity_type.into();
        let body = AuditBody {
            id: &id,
            timestamp_utc: &timestamp_utc,
            actor_id: &actor_id,
            action: &action,
            entity_type: &entity_type,
            entity_id: &entity_id,
            success,
            prev_hash: &prev_hash,
        };
        let canonical = serde_json::to_vec(&body).unwrap_or_default();
        let hash = digest(algorithm, &prev_hash, &canonical);
        Self {
            id,
            timestamp_utc,
            actor_id,
            action,
            entity_type,
            entity_id,
            success,
            prev_hash,
            hash,
        }
    }

    fn recompute_hash(&self, algorithm: HashAlgorithm) -> [u8; 32] {
        let body = AuditBody {
            id: &self.id,
            timestamp_utc: &self.timestamp_utc,
            actor_id: &self.actor_id,
            action: &self.action,
            entity_type: &self.entity_type,
            entity_id: &self.entity_id,
            success: self.success,
            prev_hash: &self.prev_hash,
        };
        let canonical = serde_json::to_vec(&body).unwrap_or_default();
        digest(algorithm, &self.prev_hash, &canonical)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action: Option<AuditAction>,
    pub actor_id: Option<String>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(entity_type) = &self.entity_type {
            if &entry.entity_type != entity_type {
                return false;
            }
        }
        if let Some(entity_id) = &self.entity_id {
            if entry.entity_id.as_ref() != Some(entity_id) {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(actor_id) = &self.actor_id {
            if entry.actor_id.as_ref() != Some(actor_id) {
                return false;
            }
        }
        if let Some((from, to)) = self.time_range {
            if entry.timestamp_utc < from || entry.timestamp_utc > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityReport {
    Ok,
    MismatchAt(u64),
}

/// The stable, checksummed export envelope: the checksum is the final chain
/// hash, i.e. `chain_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub entries: Vec<AuditEntry>,
    pub chain_root: [u8; 32],
    pub exported_at: DateTime<Utc>,
}

/// Append-only, order-preserving audit storage. `append` must be atomic
/// with the chain-head update, i.e. no two concurrent appends may observe
/// the same `prev_hash`.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append a new entry chained onto the current head, returning the
    /// sealed entry (its `prev_hash`/`hash` are set here, not by the caller).
    async fn append(
        &self,
        actor_id: Option<String>,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<String>,
        success: bool,
    ) -> RippleResult<AuditEntry>;

    async fn query(&self, filter: &AuditFilter) -> RippleResult<Vec<AuditEntry>>;

    /// Recompute every `hash_i` from `hash_{i-1}` and the entry body,
    /// reporting the first index where the stored and recomputed hashes
    /// diverge. This is the only operation that reads the full log.
    async fn verify_integrity(&self) -> RippleResult<IntegrityReport>;

    async fn export(&self) -> RippleResult<AuditExport>;

    async fn len(&self) -> RippleResult<usize>;

    async fn clear(&self) -> RippleResult<()>;
}

/// Default in-memory audit log. Writes are serialized by a single mutex
/// that also guards the chain head — reading `entries.last()` under the
/// same lock as the push is what gives append its atomicity, matching the
/// spec's "serializes all writes with a mutex that also protects the chain
/// head".
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    algorithm: HashAlgorithm,
}

impl InMemoryAuditLog {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            algorithm,
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(
        &self,
        actor_id: Option<String>,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<String>,
        success: bool,
    ) -> RippleResult<AuditEntry> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?;
        let prev_hash = entries.last().map(|e| e.hash).unwrap_or(CHAIN_SEED);
        let entry = AuditEntry::new(actor_id, action, entity_type, entity_id, success, prev_hash, self.algorithm);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, filter: &AuditFilter) -> RippleResult<Vec<AuditEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?;
        Ok(entries.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn verify_integrity(&self) -> RippleResult<IntegrityReport> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?;
        let mut expected_prev = CHAIN_SEED;
        for (index, entry) in entries.iter().enumerate() {
            if entry.prev_hash != expected_prev {
                return Ok(IntegrityReport::MismatchAt(index as u64));
            }
            if entry.recompute_hash(self.algorithm) != entry.hash {
                return Ok(IntegrityReport::MismatchAt(index as u64));
            }
            expected_prev = entry.hash;
        }
        Ok(IntegrityReport::Ok)
    }

    async fn export(&self) -> RippleResult<AuditExport> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?;
        let chain_root = entries.last().map(|e| e.hash).unwrap_or(CHAIN_SEED);
        Ok(AuditExport {
            entries: entries.clone(),
            chain_root,
            exported_at: Utc::now(),
        })
    }

    async fn len(&self) -> RippleResult<usize> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?
            .len())
    }

    async fn clear(&self) -> RippleResult<()> {
        self.entries
            .lock()
            .map_err(|_| RippleError::Storage(StorageError::LockPoisoned))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_chain_verifies_ok() {
        let log = InMemoryAuditLog::default();
        log.append(Some("alice".into()), AuditAction::Create, "account", Some("1".into()), true)
            .await
            .unwrap();
        log.append(Some("alice".into()), AuditAction::Update, "account", Some("1".into()), true)
            .await
            .unwrap();
        assert_eq!(log.verify_integrity().await.unwrap(), IntegrityReport::Ok);
    }

    #[tokio::test]
    async fn tampering_with_any_entry_flips_integrity_at_that_index() {
        let log = InMemoryAuditLog::default();
        log.append(Some("alice".into()), AuditAction::Create, "account", Some("1".into()), true)
            .await
            .unwrap();
        log.append(Some("bob".into()), AuditAction::Update, "account", Some("1".into()), true)
            .await
            .unwrap();
        log.append(Some("carol".into()), AuditAction::Delete, "account", Some("1".into()), true)
            .await
            .unwrap();

        {
            let mut entries = log.entries.lock().unwrap();
            entries[1].actor_id = Some("mallory".into());
        }

        match log.verify_integrity().await.unwrap() {
            IntegrityReport::MismatchAt(index) => assert_eq!(index, 1),
            IntegrityReport::Ok => panic!("expected mismatch"),
        }
    }

    #[tokio::test]
    async fn query_filters_by_entity_and_action() {
        let log = InMemoryAuditLog::default();
        log.append(None, AuditAction::Create, "account", Some("1".into()), true).await.unwrap();
        log.append(None, AuditAction::Create, "profile", Some("2".into()), true).await.unwrap();

        let results = log
            .query(&AuditFilter {
                entity_type: Some("account".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_type, "account");
    }

    #[tokio::test]
    async fn export_checksum_is_the_final_chain_hash() {
        let log = InMemoryAuditLog::default();
        log.append(None, AuditAction::Create, "account", Some("1".into()), true).await.unwrap();
        let last = log.append(None, AuditAction::Update, "account", Some("1".into()), true).await.unwrap();

        let export = log.export().await.unwrap();
        assert_eq!(export.chain_root, last.hash);
        assert_eq!(export.entries.len(), 2);
    }

    #[tokio::test]
    async fn clear_resets_the_chain_to_genesis() {
        let log = InMemoryAuditLog::default();
        log.append(None, AuditAction::Create, "account", Some("1".into()), true).await.unwrap();
        log.clear().await.unwrap();
        assert_eq!(log.len().await.unwrap(), 0);
        let entry = log.append(None, AuditAction::Create, "account", Some("2".into()), true).await.unwrap();
        assert_eq!(entry.prev_hash, CHAIN_SEED);
    }
}
