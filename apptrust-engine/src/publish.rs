//! Publish Orchestrator
//!
//! Sends the latest version of a template or rule to the external publish
//! target and, only after the target accepts it, stamps the entity and the
//! version as published in one storage commit.

use apptrust_core::{
    EntityId, EntityKind, EntityRecord, LifecycleStatus, PublishResult, Rule, Template,
};
use apptrust_publisher::PublishTarget;
use apptrust_storage::EntityStorage;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::{verify_chain, EngineError, EntityLocks};

pub struct PublishOrchestrator {
    templates: Arc<dyn EntityStorage<Template>>,
    rules: Arc<dyn EntityStorage<Rule>>,
    target: Arc<dyn PublishTarget>,
    locks: Arc<EntityLocks>,
}

impl PublishOrchestrator {
    pub fn new(
        templates: Arc<dyn EntityStorage<Template>>,
        rules: Arc<dyn EntityStorage<Rule>>,
        target: Arc<dyn PublishTarget>,
        locks: Arc<EntityLocks>,
    ) -> Self {
        Self {
            templates,
            rules,
            target,
            locks,
        }
    }

    pub async fn publish_template(&self, id: EntityId) -> Result<PublishResult, EngineError> {
        let _guard = self.locks.lock(EntityKind::Template, id).await;

        let template = self
            .templates
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Template not found".to_string()))?;

        publish_latest(self.templates.as_ref(), self.target.as_ref(), template, None).await
    }

    /// Publish a rule; its template must already exist upstream.
    pub async fn publish_rule(&self, id: EntityId) -> Result<PublishResult, EngineError> {
        let _guard = self.locks.lock(EntityKind::Rule, id).await;

        let rule = self
            .rules
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Rule not found".to_string()))?;

        let template = self
            .templates
            .get(rule.template_id())
            .await?
            .ok_or_else(|| {
                EngineError::InvalidReference("Associated template not found".to_string())
            })?;

        let template_remote_id = template.lifecycle.remote_id.clone().ok_or_else(|| {
            EngineError::PreconditionFailed(
                "Template must be published before publishing rules".to_string(),
            )
        })?;

        publish_latest(
            self.rules.as_ref(),
            self.target.as_ref(),
            rule,
            Some(("template_id", Value::String(template_remote_id))),
        )
        .await
    }
}

/// Publish the newest version of `entity`, overriding one payload key if given.
///
/// The caller must hold the entity's lock.
async fn publish_latest<E: EntityRecord>(
    storage: &dyn EntityStorage<E>,
    target: &dyn PublishTarget,
    mut entity: E,
    overlay: Option<(&str, Value)>,
) -> Result<PublishResult, EngineError> {
    let kind = E::KIND;
    let mut chain = storage.versions(entity.id()).await?;
    verify_chain(&entity, &chain)?;

    let latest_index = chain.len().checked_sub(1).ok_or_else(|| {
        EngineError::PreconditionFailed("No versions available to publish".to_string())
    })?;

    let mut payload = chain[latest_index].data.clone();
    if let Some((key, value)) = overlay {
        payload.insert(key, value);
    }
    let payload = payload.into_payload();

    let existing = entity.lifecycle().remote_id.clone();
    let response = match existing.as_deref() {
        Some(remote_id) => target.update(kind, remote_id, &payload).await,
        None => target.create(kind, &payload).await,
    }
    .map_err(|e| {
        tracing::warn!("Publishing {} {} failed: {}", kind, entity.id(), e);
        EngineError::from(e)
    })?;

    let remote_id = response.id.or(existing).ok_or_else(|| {
        tracing::warn!(
            "Upstream returned status {} without a {} id",
            response.status_code,
            kind
        );
        EngineError::Upstream(format!("Missing {} id from upstream response", kind))
    })?;

    let now = Utc::now();
    let latest_id = chain[latest_index].id;
    let previous = entity.lifecycle().last_published_version_id;

    let lifecycle = entity.lifecycle_mut();
    lifecycle.remote_id = Some(remote_id.clone());
    lifecycle.status = LifecycleStatus::Published;
    lifecycle.last_published_version_id = Some(latest_id);
    lifecycle.updated_at = now;

    // only the newest published version keeps the flag
    let mut stamped = Vec::with_capacity(2);
    if let Some(previous) = previous.filter(|p| *p != latest_id) {
        if let Some(old) = chain.iter_mut().find(|v| v.id == previous) {
            old.is_published = false;
            stamped.push(old.clone());
        }
    }
    let latest = &mut chain[latest_index];
    latest.is_published = true;
    stamped.push(latest.clone());

    storage.commit(&entity, &stamped).await?;

    tracing::info!(
        "Published {} {} as {} (version {})",
        kind,
        entity.id(),
        remote_id,
        latest.version_ref
    );

    Ok(PublishResult {
        remote_id,
        version_ref: latest.version_ref.clone(),
        published_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_rule, sample_template, RecordingTarget};
    use crate::VersioningEngine;
    use apptrust_core::Version;
    use apptrust_storage::InMemoryStorage;
    use serde_json::json;

    struct Fixture {
        storage: Arc<InMemoryStorage>,
        target: Arc<RecordingTarget>,
        orchestrator: PublishOrchestrator,
    }

    fn fixture(target: RecordingTarget) -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let target = Arc::new(target);
        let orchestrator = PublishOrchestrator::new(
            storage.clone(),
            storage.clone(),
            target.clone(),
            Arc::new(EntityLocks::new()),
        );
        Fixture {
            storage,
            target,
            orchestrator,
        }
    }

    async fn record_template(storage: &Arc<InMemoryStorage>, template: Template) -> Template {
        let engine: VersioningEngine<Template> = VersioningEngine::new(storage.clone());
        engine.record(template, "edit", "system").await.unwrap().0
    }

    async fn record_rule(storage: &Arc<InMemoryStorage>, rule: Rule) -> Rule {
        let engine: VersioningEngine<Rule> = VersioningEngine::new(storage.clone());
        engine.record(rule, "edit", "system").await.unwrap().0
    }

    async fn template_versions(storage: &InMemoryStorage, id: EntityId) -> Vec<Version> {
        EntityStorage::<Template>::versions(storage, id).await.unwrap()
    }

    async fn stored_template(storage: &InMemoryStorage, id: EntityId) -> Template {
        EntityStorage::<Template>::get(storage, id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_stamps_entity_and_latest_version() {
        let fx = fixture(RecordingTarget::assigning("remote-7"));
        let mut template = record_template(&fx.storage, sample_template(1)).await;
        template.fields.version = "1.1.0".to_string();
        record_template(&fx.storage, template).await;

        let result = fx.orchestrator.publish_template(1).await.unwrap();

        let versions = template_versions(&fx.storage, 1).await;
        let template = stored_template(&fx.storage, 1).await;
        assert_eq!(result.remote_id, "remote-7");
        assert_eq!(result.version_ref, versions[1].version_ref);
        assert_eq!(template.lifecycle.status, LifecycleStatus::Published);
        assert_eq!(template.lifecycle.remote_id.as_deref(), Some("remote-7"));
        assert_eq!(template.lifecycle.last_published_version_id, Some(versions[1].id));
        assert!(!versions[0].is_published);
        assert!(versions[1].is_published);

        let calls = fx.target.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, "create");
        assert_eq!(calls[0].payload["version"], "1.1.0");
    }

    #[tokio::test]
    async fn test_republish_updates_remote_and_moves_flag() {
        let fx = fixture(RecordingTarget::assigning("remote-7"));
        let template = record_template(&fx.storage, sample_template(1)).await;
        fx.orchestrator.publish_template(1).await.unwrap();

        // editing demotes to draft but keeps the old flag
        let mut template = stored_template(&fx.storage, template.id).await;
        template.fields.rego = "package curation.policies\n\nallow := false".to_string();
        record_template(&fx.storage, template).await;

        let edited = stored_template(&fx.storage, 1).await;
        let versions = template_versions(&fx.storage, 1).await;
        assert_eq!(edited.lifecycle.status, LifecycleStatus::Draft);
        assert!(versions[0].is_published);
        assert!(!versions[1].is_published);

        fx.orchestrator.publish_template(1).await.unwrap();

        let versions = template_versions(&fx.storage, 1).await;
        let published: Vec<_> = versions.iter().filter(|v| v.is_published).collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, versions[1].id);

        let calls = fx.target.calls();
        assert_eq!(calls[1].op, "update");
        assert_eq!(calls[1].remote_id.as_deref(), Some("remote-7"));
    }

    #[tokio::test]
    async fn test_publish_without_versions_fails_without_writes() {
        let fx = fixture(RecordingTarget::assigning("remote-1"));
        let template = sample_template(1);
        fx.storage.commit(&template, &[]).await.unwrap();

        let err = fx.orchestrator.publish_template(1).await.unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(_)));
        assert!(fx.target.calls().is_empty());
        assert_eq!(stored_template(&fx.storage, 1).await, template);
    }

    #[tokio::test]
    async fn test_publish_missing_entity_is_not_found() {
        let fx = fixture(RecordingTarget::assigning("remote-1"));
        assert!(matches!(
            fx.orchestrator.publish_template(42).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.orchestrator.publish_rule(42).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rule_requires_published_template() {
        let fx = fixture(RecordingTarget::assigning("remote-1"));
        record_template(&fx.storage, sample_template(1)).await;
        record_rule(&fx.storage, sample_rule(1, 1)).await;

        let err = fx.orchestrator.publish_rule(1).await.unwrap_err();

        assert!(matches!(err, EngineError::PreconditionFailed(_)));
        assert!(fx.target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rule_with_missing_template_is_invalid_reference() {
        let fx = fixture(RecordingTarget::assigning("remote-1"));
        record_rule(&fx.storage, sample_rule(1, 99)).await;

        let err = fx.orchestrator.publish_rule(1).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_rule_payload_carries_template_remote_id() {
        let fx = fixture(RecordingTarget::assigning("remote-1"));
        record_template(&fx.storage, sample_template(1)).await;
        fx.orchestrator.publish_template(1).await.unwrap();
        record_rule(&fx.storage, sample_rule(1, 1)).await;

        fx.orchestrator.publish_rule(1).await.unwrap();

        let calls = fx.target.calls();
        assert_eq!(calls[1].kind, EntityKind::Rule);
        assert_eq!(calls[1].payload["template_id"], json!("remote-1"));
        assert_eq!(calls[1].payload["name"], json!("block-critical"));

        let versions = EntityStorage::<Rule>::versions(fx.storage.as_ref(), 1)
            .await
            .unwrap();
        assert_eq!(versions[0].data.get("template_id"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_records_untouched() {
        let fx = fixture(RecordingTarget::failing(503, "maintenance"));
        let template = record_template(&fx.storage, sample_template(1)).await;

        let err = fx.orchestrator.publish_template(1).await.unwrap_err();

        match err {
            EngineError::Upstream(message) => assert!(message.contains("maintenance")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stored_template(&fx.storage, 1).await, template);
        assert!(!template_versions(&fx.storage, 1).await[0].is_published);
    }

    #[tokio::test]
    async fn test_missing_remote_id_on_create_is_upstream_failure() {
        let fx = fixture(RecordingTarget::without_ids());
        record_template(&fx.storage, sample_template(1)).await;

        let err = fx.orchestrator.publish_template(1).await.unwrap_err();

        assert!(matches!(err, EngineError::Upstream(_)));
        let template = stored_template(&fx.storage, 1).await;
        assert_eq!(template.lifecycle.status, LifecycleStatus::Draft);
        assert!(template.lifecycle.remote_id.is_none());
    }
}
