//! Initialization of nodes from forward model output.
//!
//! Nodes configured with forward init are not sampled up front; the forward
//! model writes their values into the run path and they are loaded before any
//! results are internalized.

use std::path::Path;

use tracing::{debug, error};

use crate::case::Case;
use crate::config::{ConfigNode, EnsembleConfig, NodeKind};
use crate::error::LoadError;
use crate::node::{GenData, NodeValue, ParameterValues};
use crate::storage::NodeKey;

/// Loads forward-initialized nodes for one realization.
pub trait ForwardInitializer: Send + Sync {
    /// Initializes every forward-init node of `config` for realization `iens`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ForwardInit`] describing every node that failed.
    fn initialize(
        &self,
        case: &Case,
        config: &EnsembleConfig,
        iens: usize,
        run_path: &Path,
    ) -> Result<(), LoadError>;
}

/// Reads forward-init nodes from files in the run path and stores them at
/// report step 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileForwardInit;

impl FileForwardInit {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn load_node(node: &ConfigNode, iens: usize, run_path: &Path) -> Result<NodeValue, String> {
        match node.kind() {
            NodeKind::Parameter(config) => {
                let path = config.init_path(run_path, iens).ok_or_else(|| {
                    format!("parameter {} has no init file configured", node.name())
                })?;
                ParameterValues::forward_load(&path)
                    .map(NodeValue::Parameter)
                    .map_err(|e| format!("failed to load {}: {e}", path.display()))
            }
            NodeKind::GenData(config) => {
                let path = config.result_path(run_path, 0);
                GenData::forward_load(&path)
                    .map(NodeValue::GenData)
                    .map_err(|e| format!("failed to load {}: {e}", path.display()))
            }
            NodeKind::Summary => Err(format!(
                "SUMMARY node {} cannot be forward initialized",
                node.name()
            )),
        }
    }
}

impl ForwardInitializer for FileForwardInit {
    fn initialize(
        &self,
        case: &Case,
        config: &EnsembleConfig,
        iens: usize,
        run_path: &Path,
    ) -> Result<(), LoadError> {
        let mut failures = Vec::new();
        for node in config.forward_init_nodes() {
            let result = Self::load_node(&node, iens, run_path).and_then(|value| {
                case.storage()
                    .store(&NodeKey::step(node.name(), iens, 0), value)
                    .map_err(|e| e.to_string())
            });
            match result {
                Ok(()) => debug!(node = node.name(), iens, "forward init loaded"),
                Err(reason) => {
                    error!(node = node.name(), iens, %reason, "forward init failed");
                    failures.push(format!("{}: {reason}", node.name()));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LoadError::ForwardInit {
                message: format!(
                    "Failed to initialize node(s) from forward model: {}",
                    failures.join("; ")
                ),
            })
        }
    }
}
