//! # histmatch - ensemble result ingestion
//!
//! Ensemble history matching runs many realizations of a reservoir simulator
//! and compares their responses with observations. This crate pulls each
//! finished realization's results into a shared case, reconciles them against
//! the case-wide simulated-time axis and records per-realization status.
//!
//! ## Core Concepts
//!
//! - **Case**: the shared state of one ensemble (time map, state map, storage)
//! - **TimeMap**: report step to simulated time, shared by every realization
//! - **StateMap**: lifecycle state of every realization
//! - **SummaryKeyMatcher**: which simulator variables are loaded, and which are required
//! - **Internalizer**: loads one realization's results into the case
//! - **ObsVector / ActiveList**: read the stored responses back for analysis
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use histmatch::{Case, EnsembleConfig, Internalizer};
//!
//! let mut config = EnsembleConfig::new();
//! config.add_summary_key("FOPR", true)?;
//! config.add_summary_key("WOPR:*", false)?;
//!
//! let case = Case::in_memory();
//! let internalizer = Internalizer::new(Arc::new(config));
//! let outcome = internalizer.ingest(&case, 0, "runs/realization-0".as_ref(), "ECLBASE", 0);
//! assert!(outcome.is_success());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod case;
pub mod config;
pub mod error;
pub mod forward_init;
pub mod internalizer;
pub mod key_matcher;
pub mod loader;
pub mod node;
pub mod obs;
pub mod state_map;
pub mod storage;
pub mod summary;
pub mod time_map;

// Re-export primary types at crate root for convenience
pub use case::{Case, CaseId, CaseMetadata};
pub use config::{ConfigNode, EnsembleConfig, GenDataConfig, NodeKind, ParameterConfig};
pub use error::{ConfigError, HistmatchError, HistmatchResult, LoadError, MeasureError};
pub use forward_init::{FileForwardInit, ForwardInitializer};
pub use internalizer::{Internalizer, LoadOutcome, LoadStatus};
pub use key_matcher::SummaryKeyMatcher;
pub use loader::{load_from_forward_model, ForwardModelLoader, LoaderConfig, RunArg};
pub use node::{GenData, NodeValue, ParameterValues, SummaryVector};
pub use obs::{ActiveList, ActiveMode, MeasBlock, MeasData, ObsImplType, ObsNode, ObsVector};
pub use state_map::{RealizationState, StateMap};
pub use storage::{InMemoryNodeStorage, NodeKey, NodeStorage, StorageError};
pub use summary::{FileSummaryReader, ParsedSummary, SummaryReader, SummaryWriter};
pub use time_map::{TimeMap, TimeMapError};
