//! Storage layer for AppTrust
//!
//! Provides persistence for templates, rules and their version chains.
//! Supports both in-memory (for development) and Couchbase backends.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "couchbase")]
pub mod couchbase;

pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use traits::EntityStorage;

#[cfg(feature = "couchbase")]
pub use couchbase::{CouchbaseConfig, CouchbaseStorage};

use apptrust_core::{Rule, Template};

/// Unified storage trait covering every entity kind
pub trait Storage: EntityStorage<Template> + EntityStorage<Rule> + Send + Sync {}

impl<T> Storage for T where T: EntityStorage<Template> + EntityStorage<Rule> + Send + Sync {}
