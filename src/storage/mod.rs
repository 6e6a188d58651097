//! Node storage for ensemble cases.
//!
//! [`NodeStorage`] is the abstract interface; [`InMemoryNodeStorage`] is always
//! available, the on-disk backend needs the `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryNodeStorage;
pub use traits::{MergeFn, NodeKey, NodeStorage, StorageError};
