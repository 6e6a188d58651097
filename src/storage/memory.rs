//! In-memory storage backend.
//!
//! Thread-safe implementation of [`NodeStorage`] intended for embedded usage,
//! tests, and as a reference implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::case::CaseMetadata;
use crate::node::NodeValue;
use crate::storage::traits::{MergeFn, NodeKey, NodeStorage, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory node store.
#[derive(Debug, Default)]
pub struct InMemoryNodeStorage {
    nodes: RwLock<HashMap<NodeKey, NodeValue>>,
    metadata: RwLock<Option<CaseMetadata>>,
}

impl InMemoryNodeStorage {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.nodes.read().map_err(|_| lock_err("node.len"))?.len())
    }

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl NodeStorage for InMemoryNodeStorage {
    fn load(&self, key: &NodeKey) -> Result<Option<NodeValue>, StorageError> {
        let nodes = self.nodes.read().map_err(|_| lock_err("node.load"))?;
        Ok(nodes.get(key).cloned())
    }

    fn store(&self, key: &NodeKey, value: NodeValue) -> Result<(), StorageError> {
        let mut nodes = self.nodes.write().map_err(|_| lock_err("node.store"))?;
        nodes.insert(key.clone(), value);
        Ok(())
    }

    fn merge(&self, key: &NodeKey, merge: &mut MergeFn<'_>) -> Result<(), StorageError> {
        // The write lock is held across the callback, which serializes every
        // merge. Fine for an in-memory map.
        let mut nodes = self.nodes.write().map_err(|_| lock_err("node.merge"))?;
        let merged = merge(nodes.get(key).cloned())?;
        nodes.insert(key.clone(), merged);
        Ok(())
    }

    fn contains(&self, key: &NodeKey) -> Result<bool, StorageError> {
        let nodes = self.nodes.read().map_err(|_| lock_err("node.contains"))?;
        Ok(nodes.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<NodeKey>, StorageError> {
        let nodes = self.nodes.read().map_err(|_| lock_err("node.keys"))?;
        let mut keys: Vec<NodeKey> = nodes.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn load_metadata(&self) -> Result<Option<CaseMetadata>, StorageError> {
        let metadata = self.metadata.read().map_err(|_| lock_err("metadata.load"))?;
        Ok(metadata.clone())
    }

    fn store_metadata(&self, metadata: &CaseMetadata) -> Result<(), StorageError> {
        let mut slot = self.metadata.write().map_err(|_| lock_err("metadata.store"))?;
        *slot = Some(metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{GenData, SummaryVector};
    use std::sync::Arc;
    use std::thread;

    fn summary_value(step: usize, value: f64) -> NodeValue {
        let mut vector = SummaryVector::new();
        vector.set(step, value);
        NodeValue::Summary(vector)
    }

    #[test]
    fn test_store_load() {
        let storage = InMemoryNodeStorage::new();
        let key = NodeKey::step("WPR_DIFF", 0, 1);
        assert!(storage.load(&key).unwrap().is_none());

        let value = NodeValue::GenData(GenData {
            data: vec![1.0],
            active: None,
        });
        storage.store(&key, value.clone()).unwrap();
        assert_eq!(storage.load(&key).unwrap(), Some(value));
        assert!(storage.contains(&key).unwrap());
        assert!(!storage.contains(&NodeKey::step("WPR_DIFF", 0, 2)).unwrap());
    }

    #[test]
    fn test_failed_merge_stores_nothing() {
        let storage = InMemoryNodeStorage::new();
        let key = NodeKey::vector("FOPR", 0);
        let result = storage.merge(&key, &mut |_| {
            Err(StorageError::BackendError("nope".to_string()))
        });
        assert!(result.is_err());
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_concurrent_merges_do_not_lose_updates() {
        let storage = Arc::new(InMemoryNodeStorage::new());
        let key = NodeKey::vector("FOPR", 0);

        let handles: Vec<_> = (1..=8)
            .map(|step| {
                let storage = Arc::clone(&storage);
                let key = key.clone();
                thread::spawn(move || {
                    storage
                        .merge(&key, &mut |existing| {
                            let mut vector = match existing {
                                Some(NodeValue::Summary(v)) => v,
                                _ => SummaryVector::new(),
                            };
                            vector.set(step, step as f64);
                            Ok(NodeValue::Summary(vector))
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = storage.load(&key).unwrap().unwrap();
        let vector = stored.as_summary().unwrap();
        for step in 1..=8 {
            assert_eq!(vector.get(step), Some(step as f64));
        }
    }

    #[test]
    fn test_keys_sorted() {
        let storage = InMemoryNodeStorage::new();
        storage.store(&NodeKey::vector("WOPR:OP1", 1), summary_value(1, 1.0)).unwrap();
        storage.store(&NodeKey::vector("FOPR", 0), summary_value(1, 1.0)).unwrap();
        let keys = storage.keys().unwrap();
        assert_eq!(keys[0], NodeKey::vector("FOPR", 0));
        assert_eq!(keys.len(), 2);
    }
}
