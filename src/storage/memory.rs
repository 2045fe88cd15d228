use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{AuditRecord, AuditStore, StorageError, Visitor};

/// Concurrency-safe in-memory audit store.
///
/// Used for unit tests and ephemeral deployments; nothing survives the
/// process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buffer: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn put(&self, record: AuditRecord) -> Result<(), StorageError> {
        self.buffer.write().insert(record.key, record.value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<AuditRecord, StorageError> {
        self.buffer
            .read()
            .get(key)
            .map(|value| AuditRecord {
                key: key.to_string(),
                value: value.clone(),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn iter(&self, visit: &mut Visitor<'_>) -> Result<(), StorageError> {
        let buffer = self.buffer.read();
        for (key, value) in buffer.iter() {
            visit(AuditRecord {
                key: key.clone(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.buffer.write().remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: &str) -> AuditRecord {
        AuditRecord {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put(record("k1", "v1")).await.unwrap();

        let got = store.get("k1").await.unwrap();
        assert_eq!(got, record("k1", "v1"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.put(record("k1", "v1")).await.unwrap();
        store.delete("k1").await.unwrap();

        assert!(store.get("k1").await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_iter_visits_all_records() {
        let store = MemoryStore::new();
        store.put(record("k1", "v1")).await.unwrap();
        store.put(record("k2", "v2")).await.unwrap();

        let mut seen = Vec::new();
        store
            .iter(&mut |r| {
                seen.push(r.key);
                Ok(())
            })
            .await
            .unwrap();

        seen.sort();
        assert_eq!(seen, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[tokio::test]
    async fn test_iter_aborts_on_visitor_error() {
        let store = MemoryStore::new();
        store.put(record("k1", "v1")).await.unwrap();
        store.put(record("k2", "v2")).await.unwrap();

        let mut visited = 0;
        let err = store
            .iter(&mut |_| {
                visited += 1;
                Err(StorageError::Backend("stop".to_string()))
            })
            .await
            .unwrap_err();

        assert_eq!(visited, 1);
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
