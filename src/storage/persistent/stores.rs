//! File-per-value node storage.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec::{read_record, write_record};
use super::file_lock::FileLock;
use super::PersistentConfig;
use crate::case::{CaseId, CaseMetadata};
use crate::node::NodeValue;
use crate::state_map::RealizationState;
use crate::storage::traits::{MergeFn, NodeKey, NodeStorage, StorageError};
use crate::time_map::TimeMapSnapshot;

const NODES_DIR: &str = "nodes";
const NODE_EXT: &str = "node";
const CASE_ID_FILE: &str = "case_id";
const TIME_MAP_FILE: &str = "time_map";
const STATE_MAP_FILE: &str = "state_map";
const SUMMARY_KEYS_FILE: &str = "summary_keys";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn io_err(path: &Path, err: &IoError) -> StorageError {
    if err.kind() == ErrorKind::InvalidData {
        StorageError::SerializationError(format!("{}: {err}", path.display()))
    } else {
        StorageError::Io(format!("{}: {err}", path.display()))
    }
}

/// On-disk form of a node value. The key is kept so the directory can be
/// listed without an index.
#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    key: NodeKey,
    value: NodeValue,
}

/// Node storage backed by a case directory.
///
/// ```text
/// <case>/.lock
/// <case>/case_id
/// <case>/time_map
/// <case>/state_map
/// <case>/summary_keys
/// <case>/nodes/<xx>/<blake3(key)>.node
/// ```
#[derive(Debug)]
pub struct PersistentNodeStorage {
    root: PathBuf,
    config: PersistentConfig,
    key_locks: Mutex<HashMap<NodeKey, Arc<Mutex<()>>>>,
    metadata_lock: Mutex<()>,
    _lock: FileLock,
}

impl PersistentNodeStorage {
    /// Opens (creating if needed) the case directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or another
    /// process holds the case lock.
    pub fn open(root: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(root.join(NODES_DIR)).map_err(|e| io_err(root, &e))?;
        let lock = FileLock::acquire(root).map_err(|e| io_err(root, &e))?;
        debug!(path = %root.display(), "opened case directory");

        Ok(Self {
            root: root.to_path_buf(),
            config,
            key_locks: Mutex::new(HashMap::new()),
            metadata_lock: Mutex::new(()),
            _lock: lock,
        })
    }

    /// The case directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn node_path(&self, key: &NodeKey) -> Result<PathBuf, StorageError> {
        let encoded =
            serde_json::to_vec(key).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let hash = blake3::hash(&encoded);
        let hex = hash.to_hex();
        Ok(self
            .root
            .join(NODES_DIR)
            .join(&hex.as_str()[..2])
            .join(format!("{}.{NODE_EXT}", hex.as_str())))
    }

    fn key_lock(&self, key: &NodeKey) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut locks = self.key_locks.lock().map_err(|_| lock_err("node.key_locks"))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    fn read_node(&self, key: &NodeKey) -> Result<Option<NodeValue>, StorageError> {
        let path = self.node_path(key)?;
        let stored: Option<StoredNode> =
            read_record(&path, self.config.max_record_size).map_err(|e| io_err(&path, &e))?;
        match stored {
            Some(stored) if stored.key != *key => Err(StorageError::BackendError(format!(
                "{} holds {} instead of {key}",
                path.display(),
                stored.key
            ))),
            Some(stored) => Ok(Some(stored.value)),
            None => Ok(None),
        }
    }

    fn write_node(&self, key: &NodeKey, value: NodeValue) -> Result<(), StorageError> {
        let path = self.node_path(key)?;
        let stored = StoredNode {
            key: key.clone(),
            value,
        };
        write_record(&path, &stored, self.config.sync_on_write).map_err(|e| io_err(&path, &e))
    }

    fn read_meta<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.root.join(name);
        read_record(&path, self.config.max_record_size).map_err(|e| io_err(&path, &e))
    }

    fn write_meta<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let path = self.root.join(name);
        write_record(&path, value, self.config.sync_on_write).map_err(|e| io_err(&path, &e))
    }
}

impl NodeStorage for PersistentNodeStorage {
    fn load(&self, key: &NodeKey) -> Result<Option<NodeValue>, StorageError> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| lock_err("node.load"))?;
        self.read_node(key)
    }

    fn store(&self, key: &NodeKey, value: NodeValue) -> Result<(), StorageError> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| lock_err("node.store"))?;
        self.write_node(key, value)
    }

    fn merge(&self, key: &NodeKey, merge: &mut MergeFn<'_>) -> Result<(), StorageError> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| lock_err("node.merge"))?;
        let merged = merge(self.read_node(key)?)?;
        self.write_node(key, merged)
    }

    fn keys(&self) -> Result<Vec<NodeKey>, StorageError> {
        let nodes_dir = self.root.join(NODES_DIR);
        let mut keys = Vec::new();
        for shard in fs::read_dir(&nodes_dir).map_err(|e| io_err(&nodes_dir, &e))? {
            let shard = shard.map_err(|e| io_err(&nodes_dir, &e))?.path();
            if !shard.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&shard).map_err(|e| io_err(&shard, &e))? {
                let path = entry.map_err(|e| io_err(&shard, &e))?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(NODE_EXT) {
                    continue;
                }
                let stored: Option<StoredNode> = read_record(&path, self.config.max_record_size)
                    .map_err(|e| io_err(&path, &e))?;
                if let Some(stored) = stored {
                    keys.push(stored.key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn load_metadata(&self) -> Result<Option<CaseMetadata>, StorageError> {
        let _guard = self.metadata_lock.lock().map_err(|_| lock_err("metadata.load"))?;
        let Some(id) = self.read_meta::<CaseId>(CASE_ID_FILE)? else {
            return Ok(None);
        };
        Ok(Some(CaseMetadata {
            id,
            time_map: self.read_meta::<TimeMapSnapshot>(TIME_MAP_FILE)?.unwrap_or_default(),
            states: self.read_meta::<Vec<RealizationState>>(STATE_MAP_FILE)?.unwrap_or_default(),
            summary_keys: self.read_meta::<BTreeSet<String>>(SUMMARY_KEYS_FILE)?.unwrap_or_default(),
        }))
    }

    fn store_metadata(&self, metadata: &CaseMetadata) -> Result<(), StorageError> {
        let _guard = self.metadata_lock.lock().map_err(|_| lock_err("metadata.store"))?;
        self.write_meta(TIME_MAP_FILE, &metadata.time_map)?;
        self.write_meta(STATE_MAP_FILE, &metadata.states)?;
        self.write_meta(SUMMARY_KEYS_FILE, &metadata.summary_keys)?;
        // Written last: a case without an id has never been synced.
        self.write_meta(CASE_ID_FILE, &metadata.id)
    }
}
