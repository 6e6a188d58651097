//! Case-wide variable configuration.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ConfigError;
use crate::key_matcher::SummaryKeyMatcher;

use super::node::{ConfigNode, NodeKind};

fn has_wildcard(key: &str) -> bool {
    key.contains(['*', '?', '['])
}

/// All configured variables of an ensemble plus the summary key matcher.
///
/// Nodes live behind a lock because SUMMARY nodes are created on the fly the
/// first time ingestion sees a matching key. The matcher itself is only
/// changed through `&mut self` at configuration time.
#[derive(Debug, Default)]
pub struct EnsembleConfig {
    nodes: RwLock<BTreeMap<String, Arc<ConfigNode>>>,
    matcher: SummaryKeyMatcher,
}

impl EnsembleConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<ConfigNode>>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<ConfigNode>>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateNode`] if the key is taken.
    pub fn add_node(&self, node: ConfigNode) -> Result<(), ConfigError> {
        let mut nodes = self.write();
        if nodes.contains_key(node.name()) {
            return Err(ConfigError::DuplicateNode {
                key: node.name().to_string(),
            });
        }
        nodes.insert(node.name().to_string(), Arc::new(node));
        Ok(())
    }

    /// Registers a summary key pattern.
    ///
    /// A key without wildcards also gets its SUMMARY node right away, so
    /// observations can be attached before any realization is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid pattern or when a non-summary node
    /// already uses the key.
    pub fn add_summary_key(&mut self, key: &str, required: bool) -> Result<(), ConfigError> {
        self.matcher.add_summary_key(key, required)?;
        if !has_wildcard(key) {
            self.get_or_create_summary_node(key.trim())?;
        }
        Ok(())
    }

    /// Attaches an observation key to an existing node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownNode`] if no node is configured for `key`.
    pub fn add_obs_key(&self, key: &str, obs_key: &str) -> Result<(), ConfigError> {
        let mut nodes = self.write();
        let node = nodes.get_mut(key).ok_or_else(|| ConfigError::UnknownNode {
            key: key.to_string(),
        })?;
        Arc::make_mut(node).add_obs_key(obs_key);
        Ok(())
    }

    /// The summary key matcher.
    #[must_use]
    pub fn matcher(&self) -> &SummaryKeyMatcher {
        &self.matcher
    }

    /// The node configured for `key`.
    #[must_use]
    pub fn get_node(&self, key: &str) -> Option<Arc<ConfigNode>> {
        self.read().get(key).cloned()
    }

    /// Returns true if a node is configured for `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Every configured key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns the SUMMARY node for `key`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KindMismatch`] if `key` is configured with
    /// another kind.
    pub fn get_or_create_summary_node(&self, key: &str) -> Result<Arc<ConfigNode>, ConfigError> {
        if let Some(node) = self.get_node(key) {
            return Self::expect_summary(node);
        }

        let mut nodes = self.write();
        // Another realization may have created it while the lock was released.
        if let Some(node) = nodes.get(key) {
            return Self::expect_summary(Arc::clone(node));
        }
        let node = Arc::new(ConfigNode::summary(key)?);
        nodes.insert(key.to_string(), Arc::clone(&node));
        Ok(node)
    }

    fn expect_summary(node: Arc<ConfigNode>) -> Result<Arc<ConfigNode>, ConfigError> {
        if node.is_summary() {
            Ok(node)
        } else {
            Err(ConfigError::KindMismatch {
                key: node.name().to_string(),
                expected: NodeKind::Summary.name(),
                actual: node.kind().name(),
            })
        }
    }

    /// Nodes whose kind satisfies `pred`, in key order.
    pub fn nodes_where(&self, pred: impl Fn(&ConfigNode) -> bool) -> Vec<Arc<ConfigNode>> {
        self.read()
            .values()
            .filter(|n| pred(n))
            .cloned()
            .collect()
    }

    /// Every GEN_DATA node.
    #[must_use]
    pub fn gen_data_nodes(&self) -> Vec<Arc<ConfigNode>> {
        self.nodes_where(|n| n.gen_data_config().is_some())
    }

    /// Every node initialized from forward model output.
    #[must_use]
    pub fn forward_init_nodes(&self) -> Vec<Arc<ConfigNode>> {
        self.nodes_where(ConfigNode::use_forward_init)
    }

    /// Returns true if any node is forward initialized.
    #[must_use]
    pub fn have_forward_init(&self) -> bool {
        self.read().values().any(|n| n.use_forward_init())
    }

    /// Returns true if any SUMMARY node is configured.
    #[must_use]
    pub fn have_summary(&self) -> bool {
        self.read().values().any(|n| n.is_summary())
    }

    /// Returns true if ingestion has to read simulator summary output.
    #[must_use]
    pub fn expects_summary(&self) -> bool {
        !self.matcher.is_empty() || self.have_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::node::{GenDataConfig, ParameterConfig};

    #[test]
    fn test_exact_summary_key_creates_node() {
        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", true).unwrap();
        config.add_summary_key("WOPR:*", false).unwrap();

        assert!(config.has_key("FOPR"));
        assert!(!config.has_key("WOPR:*"));
        assert!(config.matcher().is_required("FOPR"));
        assert!(config.expects_summary());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let config = EnsembleConfig::new();
        let a = config.get_or_create_summary_node("FGPT").unwrap();
        let b = config.get_or_create_summary_node("FGPT").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(config.keys(), vec!["FGPT"]);
    }

    #[test]
    fn test_get_or_create_rejects_other_kind() {
        let config = EnsembleConfig::new();
        config
            .add_node(ConfigNode::gen_data("FOPR", GenDataConfig::new("f.txt", []).unwrap()).unwrap())
            .unwrap();
        assert!(matches!(
            config.get_or_create_summary_node("FOPR"),
            Err(ConfigError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_add_obs_key() {
        let mut config = EnsembleConfig::new();
        config.add_summary_key("WWCT:WELL1", true).unwrap();
        config.add_obs_key("WWCT:WELL1", "WWCT_OBS").unwrap();
        assert!(config.get_node("WWCT:WELL1").unwrap().has_observations());
        assert!(matches!(
            config.add_obs_key("NOPE", "X"),
            Err(ConfigError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_kind_queries() {
        let config = EnsembleConfig::new();
        assert!(!config.expects_summary());
        config
            .add_node(ConfigNode::gen_data("WPR_DIFF", GenDataConfig::new("w_%d", [1, 2]).unwrap()).unwrap())
            .unwrap();
        config
            .add_node(
                ConfigNode::parameter("PORO", ParameterConfig::with_init_file("poro.txt"))
                    .unwrap()
                    .with_forward_init(true),
            )
            .unwrap();

        assert_eq!(config.gen_data_nodes().len(), 1);
        assert!(config.have_forward_init());
        assert_eq!(config.forward_init_nodes()[0].name(), "PORO");
        assert!(!config.have_summary());
        assert!(matches!(
            config.add_node(ConfigNode::summary("PORO").unwrap()),
            Err(ConfigError::DuplicateNode { .. })
        ));
    }
}
