pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{AuditRecord, AuditStore, StorageError, Visitor};

use std::sync::Arc;

use crate::config::Config;
use crate::error::{GovernorError, Result};

/// Available audit storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

/// Build an audit store from the configured backend selector.
pub fn build_store(config: &Config) -> Result<Arc<dyn AuditStore>> {
    match BackendKind::parse(&config.storage_backend) {
        Some(BackendKind::Memory) => Ok(Arc::new(MemoryStore::new())),
        None => Err(GovernorError::Config(format!(
            "unsupported storage backend: {}",
            config.storage_backend
        ))),
    }
}
