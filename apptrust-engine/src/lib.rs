//! Versioning and publishing engine
//!
//! Turns edits into immutable version snapshots, selects and diffs pairs of
//! versions, and publishes the latest version of an entity to the external
//! system of record. Every multi-step mutation of one entity runs under that
//! entity's lock and ends in a single atomic storage commit.

pub mod catalog;
pub mod chain;
pub mod error;
pub mod locks;
pub mod publish;
pub mod versioning;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::Catalog;
pub use chain::{select_diff_pair, verify_chain};
pub use error::EngineError;
pub use locks::{EntityGuard, EntityLocks};
pub use publish::PublishOrchestrator;
pub use versioning::{snapshot, VersioningEngine};
