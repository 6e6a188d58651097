//! Simulated responses gathered for analysis.
//!
//! A [`MeasData`] holds one [`MeasBlock`] per (observation, report step).
//! Every block stores one value per (realization, observation element) for
//! the realizations of the ensemble mask.

use crate::error::MeasureError;

/// Simulated responses of one observation at one report step.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasBlock {
    obs_key: String,
    report_step: usize,
    obs_size: usize,
    ens_mask: Vec<bool>,
    // Row per realization in the mask, column per observation element.
    data: Vec<f64>,
    active: Vec<bool>,
}

impl MeasBlock {
    fn new(obs_key: &str, report_step: usize, obs_size: usize, ens_mask: &[bool]) -> Self {
        Self {
            obs_key: obs_key.to_string(),
            report_step,
            obs_size,
            ens_mask: ens_mask.to_vec(),
            data: vec![0.0; ens_mask.len() * obs_size],
            active: vec![true; obs_size],
        }
    }

    #[must_use]
    pub fn obs_key(&self) -> &str {
        &self.obs_key
    }

    #[must_use]
    pub fn report_step(&self) -> usize {
        self.report_step
    }

    /// Number of observation elements.
    #[must_use]
    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn offset(&self, iens: usize, iobs: usize) -> Result<usize, MeasureError> {
        if iens >= self.ens_mask.len() {
            return Err(MeasureError::IndexOutOfRange {
                key: self.obs_key.clone(),
                index: iens,
                size: self.ens_mask.len(),
            });
        }
        if iobs >= self.obs_size {
            return Err(MeasureError::IndexOutOfRange {
                key: self.obs_key.clone(),
                index: iobs,
                size: self.obs_size,
            });
        }
        Ok(iens * self.obs_size + iobs)
    }

    /// Sets the simulated value of element `iobs` for realization `iens`.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError::IndexOutOfRange`] for an index outside the block.
    pub fn iset(&mut self, iens: usize, iobs: usize, value: f64) -> Result<(), MeasureError> {
        let offset = self.offset(iens, iobs)?;
        self.data[offset] = value;
        Ok(())
    }

    /// The simulated value of element `iobs` for realization `iens`.
    #[must_use]
    pub fn iget(&self, iens: usize, iobs: usize) -> Option<f64> {
        self.offset(iens, iobs).ok().map(|offset| self.data[offset])
    }

    fn active_values(&self, iobs: usize) -> impl Iterator<Item = f64> + '_ {
        self.ens_mask
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(move |(iens, _)| self.data[iens * self.obs_size + iobs])
    }

    /// Ensemble mean of element `iobs` over the active realizations.
    #[must_use]
    pub fn ens_mean(&self, iobs: usize) -> Option<f64> {
        if iobs >= self.obs_size {
            return None;
        }
        let (sum, count) = self
            .active_values(iobs)
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Ensemble standard deviation (population) of element `iobs`.
    #[must_use]
    pub fn ens_std(&self, iobs: usize) -> Option<f64> {
        let mean = self.ens_mean(iobs)?;
        let (sum2, count) = self
            .active_values(iobs)
            .fold((0.0, 0usize), |(sum2, count), v| (sum2 + v * v, count + 1));
        let var = sum2 / count as f64 - mean * mean;
        Some(var.max(0.0).sqrt())
    }

    /// Excludes element `iobs` from analysis.
    pub fn deactivate(&mut self, iobs: usize) {
        if let Some(active) = self.active.get_mut(iobs) {
            *active = false;
        }
    }

    #[must_use]
    pub fn iget_active(&self, iobs: usize) -> bool {
        self.active.get(iobs).copied().unwrap_or(false)
    }

    /// Number of elements still active.
    #[must_use]
    pub fn active_obs_size(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }
}

/// Simulated responses of every measured observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasData {
    ens_mask: Vec<bool>,
    blocks: Vec<MeasBlock>,
}

impl MeasData {
    /// Creates an empty aggregate for the realizations set in `ens_mask`.
    #[must_use]
    pub fn new(ens_mask: Vec<bool>) -> Self {
        Self {
            ens_mask,
            blocks: Vec::new(),
        }
    }

    /// Appends a block for `obs_key` at `report_step` and returns it.
    pub fn add_block(&mut self, obs_key: &str, report_step: usize, obs_size: usize) -> &mut MeasBlock {
        let block = self.new_block(obs_key, report_step, obs_size);
        self.push_block(block)
    }

    /// A detached block shaped for this aggregate's mask.
    ///
    /// Fill it, then hand it to [`MeasData::push_block`]; a block dropped
    /// before that never shows up in the aggregate.
    #[must_use]
    pub fn new_block(&self, obs_key: &str, report_step: usize, obs_size: usize) -> MeasBlock {
        MeasBlock::new(obs_key, report_step, obs_size, &self.ens_mask)
    }

    /// Appends a block built by [`MeasData::new_block`] and returns it.
    pub fn push_block(&mut self, block: MeasBlock) -> &mut MeasBlock {
        self.blocks.push(block);
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    #[must_use]
    pub fn blocks(&self) -> &[MeasBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn iget_block(&self, index: usize) -> Option<&MeasBlock> {
        self.blocks.get(index)
    }

    pub fn iget_block_mut(&mut self, index: usize) -> Option<&mut MeasBlock> {
        self.blocks.get_mut(index)
    }

    /// Number of realizations taking part.
    #[must_use]
    pub fn active_ens_size(&self) -> usize {
        self.ens_mask.iter().filter(|a| **a).count()
    }

    /// Realizations of the mask, in order.
    #[must_use]
    pub fn active_realizations(&self) -> Vec<usize> {
        self.ens_mask
            .iter()
            .enumerate()
            .filter_map(|(iens, active)| active.then_some(iens))
            .collect()
    }

    /// The response matrix S: one row per active observation element, one
    /// column per active realization.
    #[must_use]
    pub fn make_s(&self) -> Vec<Vec<f64>> {
        let realizations = self.active_realizations();
        self.blocks
            .iter()
            .flat_map(|block| {
                (0..block.obs_size)
                    .filter(|iobs| block.iget_active(*iobs))
                    .map(|iobs| {
                        realizations
                            .iter()
                            .map(|iens| block.data[iens * block.obs_size + iobs])
                            .collect()
                    })
                    .collect::<Vec<Vec<f64>>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_stats_skip_inactive_realizations() {
        let mut meas = MeasData::new(vec![true, false, true]);
        let block = meas.add_block("WWCT_OBS", 3, 1);
        block.iset(0, 0, 1.0).unwrap();
        block.iset(1, 0, 100.0).unwrap();
        block.iset(2, 0, 3.0).unwrap();

        assert_eq!(block.ens_mean(0), Some(2.0));
        assert_eq!(block.ens_std(0), Some(1.0));
        assert_eq!(block.iget(1, 0), Some(100.0));
        assert!(block.iset(3, 0, 0.0).is_err());
        assert_eq!(meas.active_ens_size(), 2);
    }

    #[test]
    fn test_make_s_skips_deactivated_elements() {
        let mut meas = MeasData::new(vec![true, true]);
        let block = meas.add_block("GEN_OBS", 1, 3);
        for iens in 0..2 {
            for iobs in 0..3 {
                block.iset(iens, iobs, (10 * iobs + iens) as f64).unwrap();
            }
        }
        block.deactivate(1);
        assert_eq!(block.active_obs_size(), 2);

        let s = meas.make_s();
        assert_eq!(s, vec![vec![0.0, 1.0], vec![20.0, 21.0]]);
    }

    #[test]
    fn test_empty_mask_has_no_mean() {
        let mut meas = MeasData::new(vec![false]);
        let block = meas.add_block("X", 0, 1);
        assert_eq!(block.ens_mean(0), None);
        assert_eq!(block.ens_std(0), None);
    }
}
