//! GDPR service: per-entity-type export, erasure, and access reporting,
//! traversing each registered backend's query interface for items whose
//! `subject_id_field` matches the requested subject.
//!
//! `GdprRegistry::register::<T>` type-erases each entity type behind
//! `GdprBinding`, the same shape `ripple-saga::transaction`'s
//! `TransactionalStore` uses to let a generic caller hold a
//! heterogeneous list of per-type operations without `dyn Any`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ripple_core::{Entity, Filter, GdprError, Query, RippleError, RippleResult};
use ripple_storage::Backend;

use crate::audit::{AuditAction, AuditFilter, AuditLog};

/// What happens to a matching record on erasure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErasurePolicy {
    HardDelete,
    Anonymize { token: String },
}

#[async_trait]
trait GdprBinding: Send + Sync {
    fn entity_type(&self) -> &'static str;
    fn category(&self) -> &str;
    async fn matching_subjects(&self, subject_id: &str) -> RippleResult<Vec<Value>>;
    async fn erase_subject(&self, subject_id: &str) -> RippleResult<usize>;
}

struct EntityBinding<T: Entity> {
    backend: Arc<dyn Backend<T>>,
    subject_id_field: String,
    category: String,
    erasure_policy: ErasurePolicy,
}

fn subject_query(field: &str, subject_id: &str) -> Query {
    Query::new().filter(Filter::eq(field, Value::String(subject_id.to_string())))
}

#[async_trait]
impl<T: Entity> GdprBinding for EntityBinding<T> {
    fn entity_type(&self) -> &'static str {
        T::type_name()
    }

    fn category(&self) -> &str {
        &self.category
    }

    async fn matching_subjects(&self, subject_id: &str) -> RippleResult<Vec<Value>> {
        let query = subject_query(&self.subject_id_field, subject_id);
        let items = self.backend.get_all_local(Some(&query)).await?;
        items.iter().map(|item| self.backend.to_json(item)).collect()
    }

    async fn erase_subject(&self, subject_id: &str) -> RippleResult<usize> {
        let query = subject_query(&self.subject_id_field, subject_id);
        let items = self.backend.get_all_local(Some(&query)).await?;
        let mut count = 0usize;
        for item in items {
            match &self.erasure_policy {
                ErasurePolicy::HardDelete => {
                    self.backend.delete_local(&item.id()).await?;
                }
                ErasurePolicy::Anonymize { token } => {
                    let mut json = self.backend.to_json(&item)?;
                    if let Some(obj) = json.as_object_mut() {
                        obj.insert(self.subject_id_field.clone(), Value::String(token.clone()));
                    }
                    let anonymized = self.backend.from_json(json)?;
                    self.backend.save_local(&anonymized).await?;
                }
            }
            count += 1;
        }
        Ok(count)
    }
}

/// The entity types and policies the GDPR service knows how to traverse.
#[derive(Default)]
pub struct GdprRegistry {
    bindings: Vec<Box<dyn GdprBinding>>,
}

impl GdprRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register entity type `T`: `subject_id_field` is the field on `T`
    /// that identifies the GDPR data subject, `category` labels it in
    /// export/access-report output, and `erasure_policy` controls what
    /// `erase` does to a matching record.
    pub fn register<T: Entity>(
        mut self,
        backend: Arc<dyn Backend<T>>,
        subject_id_field: impl Into<String>,
        category: impl Into<String>,
        erasure_policy: ErasurePolicy,
    ) -> Self {
        self.bindings.push(Box::new(EntityBinding {
            backend,
            subject_id_field: subject_id_field.into(),
            category: category.into(),
            erasure_policy,
        }));
        self
    }

    fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdprExportEntities {
    pub entity_type: String,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdprExport {
    pub subject_id: String,
    pub exported_at: DateTime<Utc>,
    pub entities: Vec<GdprExportEntities>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureReport {
    pub deleted_count: usize,
    pub affected_types: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessReport {
    pub subject_id: String,
    pub counts_by_category: std::collections::BTreeMap<String, usize>,
    pub categories: Vec<String>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    /// Distinct reasons this subject's data has been processed, derived
    /// from the kinds of GDPR operations recorded against it (e.g. a prior
    /// `export` or `erase`).
    pub recorded_purposes: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Traverses registered entity types on behalf of a data subject, emitting
/// an `export`/`erase` audit entry for every operation it performs.
pub struct GdprService {
    registry: GdprRegistry,
    audit: Arc<dyn AuditLog>,
}

impl GdprService {
    pub fn new(registry: GdprRegistry, audit: Arc<dyn AuditLog>) -> RippleResult<Self> {
        if registry.is_empty() {
            return Err(RippleError::Gdpr(GdprError::EntityTypeNotRegistered {
                entity_type: "<none registered>".into(),
            }));
        }
        Ok(Self { registry, audit })
    }

    pub async fn export(&self, subject_id: &str) -> RippleResult<GdprExport> {
        let mut entities = Vec::new();
        let mut categories = Vec::new();
        for binding in &self.registry.bindings {
            let items = binding.matching_subjects(subject_id).await?;
            if !items.is_empty() {
                entities.push(GdprExportEntities {
                    entity_type: binding.entity_type().to_string(),
                    items,
                });
            }
            categories.push(binding.category().to_string());
        }
        self.audit
            .append(None, AuditAction::Export, "gdpr_subject", Some(subject_id.to_string()), true)
            .await?;
        Ok(GdprExport {
            subject_id: subject_id.to_string(),
            exported_at: Utc::now(),
            entities,
            categories,
        })
    }

    pub async fn erase(&self, subject_id: &str) -> RippleResult<ErasureReport> {
        let mut deleted_count = 0usize;
        let mut affected_types = Vec::new();
        for binding in &self.registry.bindings {
            let erased = binding.erase_subject(subject_id).await?;
            if erased > 0 {
                deleted_count += erased;
                affected_types.push(binding.entity_type().to_string());
            }
        }
        self.audit
            .append(None, AuditAction::Erase, "gdpr_subject", Some(subject_id.to_string()), true)
            .await?;
        Ok(ErasureReport {
            deleted_count,
            affected_types,
            completed_at: Utc::now(),
        })
    }

    pub async fn access_report(&self, subject_id: &str) -> RippleResult<AccessReport> {
        let mut counts_by_category = std::collections::BTreeMap::new();
        let mut categories = Vec::new();
        for binding in &self.registry.bindings {
            let items = binding.matching_subjects(subject_id).await?;
            if !items.is_empty() {
                *counts_by_category.entry(binding.category().to_string()).or_insert(0) += items.len();
            }
            categories.push(binding.category().to_string());
        }
        let (recorded_purposes, earliest, latest) = self.processing_window(subject_id).await?;
        Ok(AccessReport {
            subject_id: subject_id.to_string(),
            counts_by_category,
            categories,
            earliest,
            latest,
            recorded_purposes,
            generated_at: Utc::now(),
        })
    }

    /// Folds the audit entries this service itself has recorded for
    /// `subject_id` (every prior `export`/`erase` call) into the subject's
    /// earliest/latest processing timestamps and the distinct purposes
    /// those entries represent.
    async fn processing_window(
        &self,
        subject_id: &str,
    ) -> RippleResult<(Vec<String>, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let entries = self
            .audit
            .query(&AuditFilter {
                entity_type: Some("gdpr_subject".to_string()),
                entity_id: Some(subject_id.to_string()),
                ..Default::default()
            })
            .await?;

        let mut earliest: Option<DateTime<Utc>> = None;
        let mut latest: Option<DateTime<Utc>> = None;
        let mut purposes = Vec::new();
        for entry in &entries {
            earliest = Some(earliest.map_or(entry.timestamp_utc, |e| e.min(entry.timestamp_utc)));
            latest = Some(latest.map_or(entry.timestamp_utc, |l| l.max(entry.timestamp_utc)));
            let purpose = match entry.action {
                AuditAction::Export => "data_export",
                AuditAction::Erase => "data_erasure",
                _ => continue,
            };
            if !purposes.iter().any(|p: &String| p == purpose) {
                purposes.push(purpose.to_string());
            }
        }
        Ok((purposes, earliest, latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use async_trait::async_trait;
    use ripple_storage::BackendCapabilities;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::watch;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        email: String,
        bio: String,
    }

    impl Entity for Profile {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
        fn type_name() -> &'static str {
            "profile"
        }
    }

    struct InMemoryProfiles {
        rows: Mutex<HashMap<u64, Profile>>,
    }

    #[async_trait]
    impl Backend<Profile> for InMemoryProfiles {
        async fn initialize(&self) -> RippleResult<()> {
            Ok(())
        }
        async fn dispose(&self) -> RippleResult<()> {
            Ok(())
        }
        async fn get_local(&self, id: &u64) -> RippleResult<Option<Profile>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }
        async fn get_all_local(&self, query: Option<&Query>) -> RippleResult<Vec<Profile>> {
            let rows = self.rows.lock().unwrap();
            let all: Vec<Profile> = rows.values().cloned().collect();
            match query {
                None => Ok(all),
                Some(q) => {
                    let filters = q.filters();
                    Ok(all
                        .into_iter()
                        .filter(|p| {
                            filters.iter().all(|f| match f.value.as_ref().and_then(|v| v.as_str()) {
                                Some(expected) if f.field == "email" => p.email == expected,
                                _ => true,
                            })
                        })
                        .collect())
                }
            }
        }
        async fn save_local(&self, item: &Profile) -> RippleResult<()> {
            self.rows.lock().unwrap().insert(item.id, item.clone());
            Ok(())
        }
        async fn delete_local(&self, id: &u64) -> RippleResult<bool> {
            Ok(self.rows.lock().unwrap().remove(id).is_some())
        }
        fn watch_local(&self, _query: Option<Query>) -> watch::Receiver<Vec<Profile>> {
            watch::channel(Vec::new()).1
        }
        async fn get_remote(&self, _id: &u64) -> RippleResult<Option<Profile>> {
            Ok(None)
        }
        async fn get_all_remote(&self, _query: Option<&Query>) -> RippleResult<Vec<Profile>> {
            Ok(Vec::new())
        }
        async fn save_remote(&self, item: &Profile) -> RippleResult<Profile> {
            Ok(item.clone())
        }
        async fn delete_remote(&self, _id: &u64) -> RippleResult<bool> {
            Ok(true)
        }
        async fn sync(&self) -> RippleResult<()> {
            Ok(())
        }
        fn pending_changes_count(&self) -> u64 {
            0
        }
        fn sync_status(&self) -> watch::Receiver<ripple_core::SyncStatus> {
            watch::channel(ripple_core::SyncStatus::Synced).1
        }
        fn is_connected(&self) -> watch::Receiver<bool> {
            watch::channel(true).1
        }
        fn to_json(&self, item: &Profile) -> RippleResult<Value> {
            Ok(serde_json::to_value(item).unwrap())
        }
        fn from_json(&self, value: Value) -> RippleResult<Profile> {
            Ok(serde_json::from_value(value).unwrap())
        }
        fn name(&self) -> &'static str {
            "in-memory-profiles"
        }
        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities::default()
        }
    }

    fn seeded_backend() -> Arc<InMemoryProfiles> {
        Arc::new(InMemoryProfiles {
            rows: Mutex::new(HashMap::from([
                (
                    1,
                    Profile {
                        id: 1,
                        email: "alice@example.com".into(),
                        bio: "hello".into(),
                    },
                ),
                (
                    2,
                    Profile {
                        id: 2,
                        email: "bob@example.com".into(),
                        bio: "hi".into(),
                    },
                ),
            ])),
        })
    }

    fn service(backend: Arc<InMemoryProfiles>, policy: ErasurePolicy) -> GdprService {
        let registry = GdprRegistry::new().register(backend, "email", "profile_data", policy);
        GdprService::new(registry, Arc::new(InMemoryAuditLog::default())).unwrap()
    }

    #[tokio::test]
    async fn export_scopes_to_the_matching_subject() {
        let backend = seeded_backend();
        let svc = service(backend, ErasurePolicy::HardDelete);
        let export = svc.export("alice@example.com").await.unwrap();
        assert_eq!(export.entities.len(), 1);
        assert_eq!(export.entities[0].items.len(), 1);
    }

    #[tokio::test]
    async fn hard_delete_erasure_removes_the_record() {
        let backend = seeded_backend();
        let svc = service(backend.clone(), ErasurePolicy::HardDelete);
        let report = svc.erase("alice@example.com").await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(backend.get_local(&1).await.unwrap().is_none());
        assert!(backend.get_local(&2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn anonymize_erasure_replaces_the_subject_field() {
        let backend = seeded_backend();
        let svc = service(backend.clone(), ErasurePolicy::Anonymize { token: "<redacted>".into() });
        svc.erase("alice@example.com").await.unwrap();
        let remaining = backend.get_local(&1).await.unwrap().unwrap();
        assert_eq!(remaining.email, "<redacted>");
        assert_eq!(remaining.bio, "hello");
    }

    #[tokio::test]
    async fn access_report_folds_audit_history_into_window_and_purposes() {
        let backend = seeded_backend();
        let audit = Arc::new(InMemoryAuditLog::default());
        let registry = GdprRegistry::new().register(backend, "email", "profile_data", ErasurePolicy::HardDelete);
        let svc = GdprService::new(registry, audit).unwrap();

        svc.export("alice@example.com").await.unwrap();
        let report = svc.access_report("alice@example.com").await.unwrap();
        assert_eq!(report.recorded_purposes, vec!["data_export".to_string()]);
        assert!(report.earliest.is_some());
        assert_eq!(report.earliest, report.latest);

        let first_latest = report.latest.unwrap();
        svc.erase("alice@example.com").await.unwrap();
        let report = svc.access_report("alice@example.com").await.unwrap();
        assert_eq!(
            report.recorded_purposes,
            vec!["data_export".to_string(), "data_erasure".to_string()]
        );
        assert_eq!(report.earliest.unwrap(), first_latest);
        assert!(report.latest.unwrap() >= first_latest);
    }

    #[tokio::test]
    async fn every_gdpr_operation_is_audited() {
        let backend = seeded_backend();
        let audit = Arc::new(InMemoryAuditLog::default());
        let registry = GdprRegistry::new().register(backend, "email", "profile_data", ErasurePolicy::HardDelete);
        let svc = GdprService::new(registry, audit.clone()).unwrap();
        svc.export("alice@example.com").await.unwrap();
        svc.erase("alice@example.com").await.unwrap();
        assert_eq!(audit.len().await.unwrap(), 2);
    }
}
