//! Core domain model for AppTrust
//!
//! This crate contains the data structures shared across the workspace:
//! the two governed entity kinds (Template and Rule), their immutable
//! Version snapshots, and the pure line-based Diff Engine.

pub mod diff;
pub mod error;
pub mod models;
pub mod snapshot;

pub use diff::diff;
pub use error::CoreError;
pub use models::*;
pub use snapshot::Snapshot;
