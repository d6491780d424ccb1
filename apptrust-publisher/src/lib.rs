//! Publisher for the external policy-management service
//!
//! Defines the [`PublishTarget`] seam the publish orchestrator talks to and
//! an HTTP implementation for the unified-policy REST API.

pub mod client;
pub mod error;
pub mod target;

pub use client::{UnifiedPolicyClient, UpstreamConfig};
pub use error::PublishError;
pub use target::{PublishTarget, RemoteResponse};
