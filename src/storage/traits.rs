use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by audit storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// An audit log entry: a JSON-serialized snapshot of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub key: String,
    pub value: Vec<u8>,
}

/// Visitor invoked per record by `AuditStore::iter`. The first error aborts
/// the iteration and is returned to the caller.
pub type Visitor<'a> = dyn FnMut(AuditRecord) -> Result<(), StorageError> + Send + 'a;

/// Persistence contract the governor depends on for audit records.
///
/// Backends are pluggable collaborators and must be safe under concurrent
/// invocation.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn put(&self, record: AuditRecord) -> Result<(), StorageError>;

    /// Fetch a record by key; `NotFound` when absent.
    async fn get(&self, key: &str) -> Result<AuditRecord, StorageError>;

    /// Visit every stored record.
    async fn iter(&self, visit: &mut Visitor<'_>) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Release backend resources. The store must not be used afterwards.
    async fn close(&self) -> Result<(), StorageError>;
}
