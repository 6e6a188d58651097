//! Ensemble variable configuration.
//!
//! Configuration is produced elsewhere (config files, APIs) and consumed here
//! as typed nodes.

mod ensemble;
mod node;

pub use ensemble::EnsembleConfig;
pub use node::{ConfigNode, GenDataConfig, NodeKind, ParameterConfig, STEP_PLACEHOLDER};
