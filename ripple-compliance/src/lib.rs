//! ripple-compliance - Field-level encryption, the audit hash chain, and
//! the GDPR service: the compliance spine that sits above storage and
//! emits audit entries for every regulated operation.

pub mod audit;
pub mod crypto;
pub mod gdpr;

pub use audit::{AuditAction, AuditEntry, AuditExport, AuditFilter, AuditLog, HashAlgorithm, IntegrityReport, InMemoryAuditLog, CHAIN_SEED};
pub use crypto::{
    decrypt_field, encrypt_field, rotate_field_key, Aes256CbcHmacCipher, Aes256GcmCipher, ChaCha20Poly1305Cipher,
    EncryptionConfig, FieldAlgorithm, FieldCipher,
};
pub use gdpr::{AccessReport, ErasureReport, ErasurePolicy, GdprExport, GdprRegistry, GdprService};
