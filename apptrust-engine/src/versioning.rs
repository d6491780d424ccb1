//! Versioning Engine
//!
//! Every edit of an entity produces exactly one new immutable [`Version`]
//! chained to the previous head of that entity's history.

use apptrust_core::{EntityRecord, LifecycleStatus, Version, VersionId};
use apptrust_storage::EntityStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{verify_chain, EngineError};

/// Build the next version of `entity` on top of `chain` (oldest first).
///
/// Stamps the entity's `updated_at` and demotes a published entity back to
/// draft. Nothing is persisted here.
pub fn snapshot<E: EntityRecord>(
    entity: &mut E,
    chain: &[Version],
    version_id: VersionId,
    message: &str,
    author: &str,
    now: DateTime<Utc>,
) -> Result<Version, EngineError> {
    let version = Version {
        id: version_id,
        entity_id: entity.id(),
        version_ref: Version::reference(E::KIND, chain.len() + 1, now),
        message: message.to_string(),
        author: author.to_string(),
        data: entity.snapshot()?,
        created_at: now,
        parent_id: chain.last().map(|v| v.id),
        is_published: false,
    };

    let lifecycle = entity.lifecycle_mut();
    lifecycle.updated_at = now;
    if lifecycle.status == LifecycleStatus::Published {
        lifecycle.status = LifecycleStatus::Draft;
    }

    Ok(version)
}

/// Persists snapshots for one entity kind
pub struct VersioningEngine<E: EntityRecord> {
    storage: Arc<dyn EntityStorage<E>>,
}

impl<E: EntityRecord> VersioningEngine<E> {
    pub fn new(storage: Arc<dyn EntityStorage<E>>) -> Self {
        Self { storage }
    }

    /// Load and verify the chain of `entity`, oldest first
    pub async fn chain(&self, entity: &E) -> Result<Vec<Version>, EngineError> {
        let chain = self.storage.versions(entity.id()).await?;
        verify_chain(entity, &chain)?;
        Ok(chain)
    }

    /// Snapshot `entity` as its next version and commit both together.
    ///
    /// The caller must hold the entity's lock, so that the chain read here is
    /// still the head when the commit lands.
    pub async fn record(
        &self,
        mut entity: E,
        message: &str,
        author: &str,
    ) -> Result<(E, Version), EngineError> {
        let chain = self.chain(&entity).await?;
        let version_id = self.storage.allocate_version_id().await?;

        // keep creation order aligned with chain order even if the clock steps back
        let now = match chain.last() {
            Some(tail) if tail.created_at > Utc::now() => tail.created_at,
            _ => Utc::now(),
        };

        let version = snapshot(&mut entity, &chain, version_id, message, author, now)?;
        self.storage
            .commit(&entity, std::slice::from_ref(&version))
            .await?;

        tracing::debug!(
            "Recorded {} for {} {} (parent {:?})",
            version.version_ref,
            E::KIND,
            entity.id(),
            version.parent_id
        );
        Ok((entity, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_rule, sample_template};
    use apptrust_core::{Rule, Template};
    use apptrust_storage::InMemoryStorage;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_first_snapshot_has_no_parent() {
        let mut template = sample_template(4);
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 10, 11, 12).unwrap();

        let version = snapshot(&mut template, &[], 17, "Initial draft", "alice", at).unwrap();

        assert_eq!(version.id, 17);
        assert_eq!(version.entity_id, 4);
        assert_eq!(version.parent_id, None);
        assert_eq!(version.version_ref, "tmpl-001-20250309101112");
        assert_eq!(version.author, "alice");
        assert!(!version.is_published);
        assert_eq!(template.lifecycle.updated_at, at);
    }

    #[test]
    fn test_snapshot_chains_to_tail() {
        let mut rule = sample_rule(2, 1);
        let at = Utc::now();
        let first = snapshot(&mut rule, &[], 1, "", "system", at).unwrap();
        let second = snapshot(&mut rule, &[first.clone()], 2, "", "system", at).unwrap();

        assert_eq!(second.parent_id, Some(first.id));
        assert!(second.version_ref.starts_with("rule-002-"));
    }

    #[test]
    fn test_snapshot_demotes_published_entity() {
        let mut template = sample_template(1);
        template.lifecycle.status = LifecycleStatus::Published;

        snapshot(&mut template, &[], 1, "edit", "system", Utc::now()).unwrap();

        assert_eq!(template.lifecycle.status, LifecycleStatus::Draft);
    }

    #[test]
    fn test_snapshot_is_detached_from_entity() {
        let mut template = sample_template(1);
        let version = snapshot(&mut template, &[], 1, "", "system", Utc::now()).unwrap();

        template.fields.scanners.push("secrets".to_string());
        template.fields.name = "renamed".to_string();

        assert_eq!(version.data.get("scanners"), Some(&json!(["sca"])));
        assert_eq!(version.data.get("name"), Some(&json!("cve-block")));
    }

    #[tokio::test]
    async fn test_record_builds_sequential_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        let engine: VersioningEngine<Template> = VersioningEngine::new(storage.clone());

        let mut template = sample_template(1);
        for i in 0..5 {
            template.fields.version = format!("1.{}", i);
            let (updated, _) = engine.record(template, "edit", "bob").await.unwrap();
            template = updated;
        }

        let chain = engine.chain(&template).await.unwrap();
        let sequences: Vec<_> = chain
            .iter()
            .map(|v| v.version_ref.split('-').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(sequences, vec!["001", "002", "003", "004", "005"]);
        assert_eq!(chain[0].parent_id, None);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].parent_id, Some(pair[0].id));
        }
    }

    #[tokio::test]
    async fn test_record_refuses_corrupted_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        let engine: VersioningEngine<Rule> = VersioningEngine::new(storage.clone());
        let rule = sample_rule(1, 1);

        let mut orphan = crate::test_support::version(1, 1, Some(99));
        orphan.version_ref = "rule-001-20240101000000".to_string();
        storage.commit(&rule, &[orphan]).await.unwrap();

        let err = engine.record(rule, "edit", "system").await.unwrap_err();
        assert!(matches!(err, EngineError::Integrity(_)));
        let stored = EntityStorage::<Rule>::versions(storage.as_ref(), 1).await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}
