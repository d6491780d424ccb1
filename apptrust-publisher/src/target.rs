//! The external publish target contract

use apptrust_core::EntityKind;
use async_trait::async_trait;
use serde_json::Value;

use crate::PublishError;

/// What the external system answered to a create or update call
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// Remote identifier, when the response carried or implied one
    pub id: Option<String>,
    pub status_code: u16,
    pub body: Value,
}

/// An external system of record that templates and rules are published to.
///
/// `update` must be idempotent: sending the same payload twice succeeds.
#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError>;

    async fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError>;
}
