//! Fixtures shared by the engine's unit tests

use apptrust_core::{
    EntityId, EntityKind, Rule, RuleFields, RuleParameter, Snapshot, Template, TemplateFields,
    TemplateParameter, Version, VersionId,
};
use apptrust_publisher::{PublishError, PublishTarget, RemoteResponse};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

pub fn template_fields(name: &str) -> TemplateFields {
    TemplateFields {
        name: name.to_string(),
        description: Some("blocks critical CVEs".to_string()),
        category: "security".to_string(),
        data_source_type: "xray".to_string(),
        version: "1.0.0".to_string(),
        rego: "package curation.policies\n\nallow := true".to_string(),
        parameters: vec![TemplateParameter {
            name: "severity".to_string(),
            kind: "string".to_string(),
            description: None,
        }],
        scanners: vec!["sca".to_string()],
    }
}

pub fn rule_fields(template_id: EntityId, name: &str) -> RuleFields {
    RuleFields {
        template_id,
        name: name.to_string(),
        description: None,
        is_custom: true,
        version: "1".to_string(),
        parameters: vec![RuleParameter {
            name: "severity".to_string(),
            value: "critical".to_string(),
        }],
    }
}

pub fn sample_template(id: EntityId) -> Template {
    Template::new(id, template_fields("cve-block"), Utc::now())
}

pub fn sample_rule(id: EntityId, template_id: EntityId) -> Rule {
    Rule::new(id, rule_fields(template_id, "block-critical"), Utc::now())
}

pub fn version(id: VersionId, entity_id: EntityId, parent_id: Option<VersionId>) -> Version {
    Version {
        id,
        entity_id,
        version_ref: format!("tmpl-{:03}-20240101000000", id),
        message: String::new(),
        author: "system".to_string(),
        data: Snapshot::new(),
        created_at: Utc::now(),
        parent_id,
        is_published: false,
    }
}

/// A call observed by [`RecordingTarget`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub op: &'static str,
    pub kind: EntityKind,
    pub remote_id: Option<String>,
    pub payload: Value,
}

/// In-process publish target that records every call
pub struct RecordingTarget {
    pub calls: Mutex<Vec<RecordedCall>>,
    assign_id: Option<String>,
    failure: Option<(u16, String)>,
}

impl RecordingTarget {
    pub fn assigning(id: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            assign_id: Some(id.to_string()),
            failure: None,
        }
    }

    /// A target whose create responses carry no identifier
    pub fn without_ids() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            assign_id: None,
            failure: None,
        }
    }

    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            assign_id: None,
            failure: Some((status, body.to_string())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn respond(&self, call: RecordedCall) -> Result<RemoteResponse, PublishError> {
        let remote_id = call.remote_id.clone();
        self.calls.lock().push(call);
        if let Some((status, body)) = &self.failure {
            return Err(PublishError::Status {
                status: *status,
                body: body.clone(),
            });
        }
        Ok(RemoteResponse {
            id: remote_id.or_else(|| self.assign_id.clone()),
            status_code: 200,
            body: Value::Null,
        })
    }
}

#[async_trait]
impl PublishTarget for RecordingTarget {
    async fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError> {
        self.respond(RecordedCall {
            op: "create",
            kind,
            remote_id: None,
            payload: payload.clone(),
        })
    }

    async fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError> {
        self.respond(RecordedCall {
            op: "update",
            kind,
            remote_id: Some(remote_id.to_string()),
            payload: payload.clone(),
        })
    }
}
