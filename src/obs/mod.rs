//! Observation side of the storage scheme.
//!
//! Observations are configured once and then used by analysis to pull the
//! simulated responses that ingestion stored for every realization.

mod active_list;
mod meas_data;
mod obs_vector;

pub use active_list::{ActiveList, ActiveMode};
pub use meas_data::{MeasBlock, MeasData};
pub use obs_vector::{GenObservation, ObsImplType, ObsNode, ObsVector, SummaryObservation};
