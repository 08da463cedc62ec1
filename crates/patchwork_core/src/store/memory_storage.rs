//! In-memory storage implementation.
//!
//! Used by tests and by projects opened without a storage directory.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::storage::{DocStorage, StorageResult};

/// In-memory document storage.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the store flushed. Data is lost when the last clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    docs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocStorage for MemoryStorage {
    fn load_doc(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.get(id).cloned())
    }

    fn save_doc(&self, id: &str, snapshot: &[u8]) -> StorageResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        docs.insert(id.to_string(), snapshot.to_vec());
        Ok(())
    }

    fn delete_doc(&self, id: &str) -> StorageResult<()> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        docs.remove(id);
        Ok(())
    }

    fn list_docs(&self) -> StorageResult<Vec<String>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
