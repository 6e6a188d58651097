//! Per-variable configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder substituted in file templates.
pub const STEP_PLACEHOLDER: &str = "%d";

/// GEN_DATA specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenDataConfig {
    result_file: String,
    report_steps: BTreeSet<usize>,
}

impl GenDataConfig {
    /// Creates a GEN_DATA config reading `result_file` at `report_steps`.
    ///
    /// With no report steps the result is only loaded for step 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the file template is empty, or if several report
    /// steps are configured and the template has no `%d` placeholder.
    pub fn new(
        result_file: impl Into<String>,
        report_steps: impl IntoIterator<Item = usize>,
    ) -> Result<Self, ConfigError> {
        let result_file = result_file.into();
        if result_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "RESULT_FILE".to_string(),
                reason: "result file cannot be empty".to_string(),
            });
        }

        let mut report_steps: BTreeSet<usize> = report_steps.into_iter().collect();
        if report_steps.is_empty() {
            report_steps.insert(0);
        }

        if report_steps.len() > 1 && !result_file.contains(STEP_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                field: "RESULT_FILE".to_string(),
                reason: format!(
                    "'{result_file}' must contain {STEP_PLACEHOLDER} when several report steps are loaded"
                ),
            });
        }

        Ok(Self {
            result_file,
            report_steps,
        })
    }

    /// Returns true if results for `report_step` should be internalized.
    #[must_use]
    pub fn should_internalize(&self, report_step: usize) -> bool {
        self.report_steps.contains(&report_step)
    }

    /// Configured report steps, ascending.
    #[must_use]
    pub fn report_steps(&self) -> &BTreeSet<usize> {
        &self.report_steps
    }

    /// Path of the result file for `report_step` below `run_path`.
    #[must_use]
    pub fn result_path(&self, run_path: &Path, report_step: usize) -> PathBuf {
        run_path.join(
            self.result_file
                .replace(STEP_PLACEHOLDER, &report_step.to_string()),
        )
    }
}

/// Parameter configuration (every non-response node kind).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterConfig {
    init_file: Option<String>,
}

impl ParameterConfig {
    /// Parameter without an init file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter read from `init_file`; `%d` is replaced by the realization.
    #[must_use]
    pub fn with_init_file(init_file: impl Into<String>) -> Self {
        Self {
            init_file: Some(init_file.into()),
        }
    }

    /// Init file for realization `iens` below `run_path`.
    #[must_use]
    pub fn init_path(&self, run_path: &Path, iens: usize) -> Option<PathBuf> {
        self.init_file
            .as_ref()
            .map(|f| run_path.join(f.replace(STEP_PLACEHOLDER, &iens.to_string())))
    }
}

/// What kind of variable a node describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Scalar time series read from the simulator summary.
    Summary,
    /// Generic data written by the forward model.
    GenData(GenDataConfig),
    /// Any parameter kind.
    Parameter(ParameterConfig),
}

impl NodeKind {
    /// Kind name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Summary => "SUMMARY",
            Self::GenData(_) => "GEN_DATA",
            Self::Parameter(_) => "PARAMETER",
        }
    }
}

/// Configuration of one ensemble variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    name: String,
    kind: NodeKind,
    obs_keys: Vec<String>,
    forward_init: bool,
}

impl ConfigNode {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        Ok(Self {
            name,
            kind,
            obs_keys: Vec::new(),
            forward_init: false,
        })
    }

    /// A SUMMARY node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKey`] for a blank name.
    pub fn summary(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_kind(name, NodeKind::Summary)
    }

    /// A GEN_DATA node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKey`] for a blank name.
    pub fn gen_data(name: impl Into<String>, config: GenDataConfig) -> Result<Self, ConfigError> {
        Self::with_kind(name, NodeKind::GenData(config))
    }

    /// A parameter node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKey`] for a blank name.
    pub fn parameter(name: impl Into<String>, config: ParameterConfig) -> Result<Self, ConfigError> {
        Self::with_kind(name, NodeKind::Parameter(config))
    }

    /// Sets whether the node is initialized from the forward model's output.
    #[must_use]
    pub fn with_forward_init(mut self, forward_init: bool) -> Self {
        self.forward_init = forward_init;
        self
    }

    /// Attaches an observation key.
    #[must_use]
    pub fn with_obs_key(mut self, obs_key: impl Into<String>) -> Self {
        self.add_obs_key(obs_key);
        self
    }

    /// Attaches an observation key unless already attached.
    pub fn add_obs_key(&mut self, obs_key: impl Into<String>) {
        let obs_key = obs_key.into();
        if !self.obs_keys.contains(&obs_key) {
            self.obs_keys.push(obs_key);
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn obs_keys(&self) -> &[String] {
        &self.obs_keys
    }

    /// Returns true if any observation refers to this node.
    #[must_use]
    pub fn has_observations(&self) -> bool {
        !self.obs_keys.is_empty()
    }

    #[must_use]
    pub fn use_forward_init(&self) -> bool {
        self.forward_init
    }

    /// Returns true for SUMMARY nodes.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(self.kind, NodeKind::Summary)
    }

    /// The GEN_DATA config, if this is a GEN_DATA node.
    #[must_use]
    pub fn gen_data_config(&self) -> Option<&GenDataConfig> {
        match &self.kind {
            NodeKind::GenData(config) => Some(config),
            _ => None,
        }
    }
}
