//! Observations of one variable over time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, MeasureError};
use crate::node::NodeValue;
use crate::storage::{NodeKey, NodeStorage, StorageError};

use super::active_list::ActiveList;
use super::meas_data::MeasData;

/// Kind of observation held by an [`ObsVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObsImplType {
    /// Scalar observation of a summary variable.
    SummaryObs,
    /// Observation of selected elements of a GEN_DATA variable.
    GenObs,
}

impl ObsImplType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SummaryObs => "SUMMARY_OBS",
            Self::GenObs => "GEN_OBS",
        }
    }
}

impl fmt::Display for ObsImplType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observed summary value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryObservation {
    pub value: f64,
    pub std: f64,
}

/// Observed values of selected GEN_DATA elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenObservation {
    /// Observed values, one per observation element.
    pub values: Vec<f64>,
    /// Standard deviations, one per observation element.
    pub stds: Vec<f64>,
    /// GEN_DATA element observed by each observation element.
    pub data_index: Vec<usize>,
    /// Active observation elements.
    pub active: ActiveList,
}

impl GenObservation {
    /// Observation of `data_index` with every element active.
    ///
    /// # Errors
    ///
    /// Returns an error if the three vectors differ in length.
    pub fn new(values: Vec<f64>, stds: Vec<f64>, data_index: Vec<usize>) -> Result<Self, ConfigError> {
        if values.len() != stds.len() || values.len() != data_index.len() {
            return Err(ConfigError::InvalidValue {
                field: "GENERAL_OBSERVATION".to_string(),
                reason: format!(
                    "{} values, {} std and {} indices",
                    values.len(),
                    stds.len(),
                    data_index.len()
                ),
            });
        }
        Ok(Self {
            values,
            stds,
            data_index,
            active: ActiveList::new(),
        })
    }

    /// Restricts the observation to `active`.
    #[must_use]
    pub fn with_active(mut self, active: ActiveList) -> Self {
        self.active = active;
        self
    }
}

/// The observation installed at one report step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObsNode {
    Summary(SummaryObservation),
    Gen(GenObservation),
}

impl ObsNode {
    fn impl_type(&self) -> ObsImplType {
        match self {
            Self::Summary(_) => ObsImplType::SummaryObs,
            Self::Gen(_) => ObsImplType::GenObs,
        }
    }

    /// Observation elements taking part in analysis.
    fn active_elements(&self) -> Vec<usize> {
        match self {
            Self::Summary(_) => vec![0],
            Self::Gen(obs) => obs.active.active_indices(obs.data_index.len()),
        }
    }
}

/// The observations attached to one variable, indexed by report step.
///
/// A step without a node has no observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsVector {
    impl_type: ObsImplType,
    obs_key: String,
    data_key: String,
    nodes: Vec<Option<ObsNode>>,
}

impl ObsVector {
    /// Empty observation vector for `data_key` spanning `num_reports` steps.
    #[must_use]
    pub fn new(
        impl_type: ObsImplType,
        obs_key: impl Into<String>,
        data_key: impl Into<String>,
        num_reports: usize,
    ) -> Self {
        Self {
            impl_type,
            obs_key: obs_key.into(),
            data_key: data_key.into(),
            nodes: vec![None; num_reports],
        }
    }

    #[must_use]
    pub fn obs_key(&self) -> &str {
        &self.obs_key
    }

    /// Key of the observed variable.
    #[must_use]
    pub fn data_key(&self) -> &str {
        &self.data_key
    }

    #[must_use]
    pub fn impl_type(&self) -> ObsImplType {
        self.impl_type
    }

    /// Installs `node` at `report_step`, replacing any previous node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KindMismatch`] if `node` is not of this
    /// vector's observation type.
    pub fn install_node(&mut self, report_step: usize, node: ObsNode) -> Result<(), ConfigError> {
        if node.impl_type() != self.impl_type {
            return Err(ConfigError::KindMismatch {
                key: self.obs_key.clone(),
                expected: self.impl_type.name(),
                actual: node.impl_type().name(),
            });
        }
        if self.nodes.len() <= report_step {
            self.nodes.resize(report_step + 1, None);
        }
        self.nodes[report_step] = Some(node);
        Ok(())
    }

    /// The node at `report_step`.
    #[must_use]
    pub fn node(&self, report_step: usize) -> Option<&ObsNode> {
        self.nodes.get(report_step).and_then(Option::as_ref)
    }

    /// Returns true if there is an observation at `report_step`.
    #[must_use]
    pub fn is_active(&self, report_step: usize) -> bool {
        self.node(report_step).is_some()
    }

    /// Report steps with an observation, ascending.
    #[must_use]
    pub fn step_list(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(step, node)| node.as_ref().map(|_| step))
            .collect()
    }

    /// Number of report steps with an observation.
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// The first observed step after `prev_step`, or the first observed step
    /// when `prev_step` is `None`.
    #[must_use]
    pub fn next_active_step(&self, prev_step: Option<usize>) -> Option<usize> {
        let from = prev_step.map_or(0, |s| s + 1);
        (from..self.nodes.len()).find(|step| self.is_active(*step))
    }

    /// Returns true if every realization in `active_mask` has stored data at
    /// every observed step.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn has_data(&self, active_mask: &[bool], storage: &dyn NodeStorage) -> Result<bool, StorageError> {
        let steps = self.step_list();
        for iens in active_mask
            .iter()
            .enumerate()
            .filter_map(|(iens, active)| active.then_some(iens))
        {
            let present = match self.impl_type {
                ObsImplType::SummaryObs => {
                    let stored = storage.load(&NodeKey::vector(self.data_key.as_str(), iens))?;
                    let vector = stored.as_ref().and_then(NodeValue::as_summary);
                    steps
                        .iter()
                        .all(|step| vector.is_some_and(|v| v.get(*step).is_some()))
                }
                ObsImplType::GenObs => {
                    let mut present = true;
                    for step in &steps {
                        if !storage.contains(&NodeKey::step(self.data_key.as_str(), iens, *step))? {
                            present = false;
                            break;
                        }
                    }
                    present
                }
            };
            if !present {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Adds the simulated responses of `active_realizations` at
    /// `report_step` to `meas`.
    ///
    /// Reads the values stored by ingestion: the summary vector's entry at
    /// `report_step`, or the observed elements of the step's GEN_DATA. Does
    /// nothing if there is no observation at `report_step`. Realizations index
    /// the rows of the new block directly.
    ///
    /// # Errors
    ///
    /// Returns an error if a realization has no stored value, if an observed
    /// element is outside the stored data, or if storage fails.
    pub fn measure(
        &self,
        storage: &dyn NodeStorage,
        report_step: usize,
        active_realizations: &[usize],
        meas: &mut MeasData,
    ) -> Result<(), MeasureError> {
        let Some(node) = self.node(report_step) else {
            return Ok(());
        };
        let elements = node.active_elements();

        let mut rows = Vec::with_capacity(active_realizations.len());
        for &iens in active_realizations {
            rows.push((iens, self.simulated(storage, node, &elements, iens, report_step)?));
        }

        // Filled detached so a failing row leaves `meas` untouched.
        let mut block = meas.new_block(&self.obs_key, report_step, elements.len());
        for (iens, values) in rows {
            for (iobs, (value, active)) in values.into_iter().enumerate() {
                block.iset(iens, iobs, value)?;
                if !active {
                    block.deactivate(iobs);
                }
            }
        }
        meas.push_block(block);
        Ok(())
    }

    /// Simulated value and forward model activity of every observed element.
    fn simulated(
        &self,
        storage: &dyn NodeStorage,
        node: &ObsNode,
        elements: &[usize],
        iens: usize,
        report_step: usize,
    ) -> Result<Vec<(f64, bool)>, MeasureError> {
        let missing = || MeasureError::MissingData {
            key: self.data_key.clone(),
            iens,
            report_step,
        };

        match node {
            ObsNode::Summary(_) => {
                let stored = storage
                    .load(&NodeKey::vector(self.data_key.as_str(), iens))?
                    .ok_or_else(missing)?;
                let vector = stored.as_summary().ok_or(MeasureError::UnexpectedValue {
                    key: self.data_key.clone(),
                    expected: "SUMMARY",
                    actual: stored.kind_name(),
                })?;
                let value = vector.get(report_step).ok_or_else(missing)?;
                Ok(vec![(value, true)])
            }
            ObsNode::Gen(obs) => {
                let stored = storage
                    .load(&NodeKey::step(self.data_key.as_str(), iens, report_step))?
                    .ok_or_else(missing)?;
                let data = stored.as_gen_data().ok_or(MeasureError::UnexpectedValue {
                    key: self.data_key.clone(),
                    expected: "GEN_DATA",
                    actual: stored.kind_name(),
                })?;
                elements
                    .iter()
                    .map(|&iobs| -> Result<(f64, bool), MeasureError> {
                        let index = *obs.data_index.get(iobs).ok_or(MeasureError::IndexOutOfRange {
                            key: self.obs_key.clone(),
                            index: iobs,
                            size: obs.data_index.len(),
                        })?;
                        let value = *data.data.get(index).ok_or(MeasureError::IndexOutOfRange {
                            key: self.data_key.clone(),
                            index,
                            size: data.size(),
                        })?;
                        Ok((value, data.is_active(index)))
                    })
                    .collect()
            }
        }
    }
}
