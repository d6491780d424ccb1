//! Catalog façade over templates, rules and their version chains
//!
//! Every mutation takes the per-entity lock before reading, so a read of the
//! chain head and the commit that extends it can never interleave with another
//! writer of the same entity. Rule writes also hold their template's lock
//! (template first, then rule) so a rule can never be attached to a template
//! that is being deleted.

use apptrust_core::{
    diff, DiffReport, EntityId, EntityKind, EntityRecord, PublishResult, Rule, RuleDraft,
    Template, TemplateDraft, Version, VersionId,
};
use apptrust_publisher::PublishTarget;
use apptrust_storage::{EntityStorage, Storage};
use chrono::Utc;
use std::sync::Arc;

use crate::{select_diff_pair, EngineError, EntityLocks, PublishOrchestrator, VersioningEngine};

const CREATE_MESSAGE: &str = "Initial draft";
const UPDATE_MESSAGE: &str = "Update draft";

pub struct Catalog {
    templates: Arc<dyn EntityStorage<Template>>,
    rules: Arc<dyn EntityStorage<Rule>>,
    template_versions: VersioningEngine<Template>,
    rule_versions: VersioningEngine<Rule>,
    publisher: PublishOrchestrator,
    locks: Arc<EntityLocks>,
    default_author: String,
}

fn template_not_found() -> EngineError {
    EngineError::NotFound("Template not found".to_string())
}

fn rule_not_found() -> EngineError {
    EngineError::NotFound("Rule not found".to_string())
}

impl Catalog {
    pub fn new<S: Storage + 'static>(
        storage: Arc<S>,
        target: Arc<dyn PublishTarget>,
        default_author: impl Into<String>,
    ) -> Self {
        let templates: Arc<dyn EntityStorage<Template>> = storage.clone();
        let rules: Arc<dyn EntityStorage<Rule>> = storage;
        let locks = Arc::new(EntityLocks::new());

        Self {
            template_versions: VersioningEngine::new(templates.clone()),
            rule_versions: VersioningEngine::new(rules.clone()),
            publisher: PublishOrchestrator::new(
                templates.clone(),
                rules.clone(),
                target,
                locks.clone(),
            ),
            templates,
            rules,
            locks,
            default_author: default_author.into(),
        }
    }

    fn author_or_default(&self, author: Option<String>) -> String {
        author
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.default_author.clone())
    }

    // ==================== Templates ====================

    pub async fn list_templates(&self) -> Result<Vec<Template>, EngineError> {
        Ok(self.templates.list().await?)
    }

    pub async fn get_template(&self, id: EntityId) -> Result<Template, EngineError> {
        self.templates.get(id).await?.ok_or_else(template_not_found)
    }

    /// Create a template together with its first version
    pub async fn create_template(&self, draft: TemplateDraft) -> Result<Template, EngineError> {
        let id = self.templates.allocate_entity_id().await?;
        let _guard = self.locks.lock(EntityKind::Template, id).await;

        let template = Template::new(id, draft.fields, Utc::now());
        let message = draft.commit_message.unwrap_or_else(|| CREATE_MESSAGE.to_string());
        let author = self.author_or_default(draft.author);

        let (template, version) = self
            .template_versions
            .record(template, &message, &author)
            .await?;

        tracing::info!(
            "Created template {} '{}' ({})",
            template.id,
            template.fields.name,
            version.version_ref
        );
        Ok(template)
    }

    /// Replace a template's attributes and record the edit as a new version
    pub async fn update_template(
        &self,
        id: EntityId,
        draft: TemplateDraft,
    ) -> Result<Template, EngineError> {
        let _guard = self.locks.lock(EntityKind::Template, id).await;

        let mut template = self.get_template(id).await?;
        template.fields = draft.fields;
        let message = draft.commit_message.unwrap_or_else(|| UPDATE_MESSAGE.to_string());
        let author = self.author_or_default(draft.author);

        let (template, version) = self
            .template_versions
            .record(template, &message, &author)
            .await?;

        tracing::info!("Updated template {} ({})", template.id, version.version_ref);
        Ok(template)
    }

    /// Delete a template, its versions, and every rule built on it
    pub async fn delete_template(&self, id: EntityId) -> Result<(), EngineError> {
        let _guard = self.locks.lock(EntityKind::Template, id).await;
        self.get_template(id).await?;

        let candidates: Vec<EntityId> = self
            .rules
            .list()
            .await?
            .into_iter()
            .filter(|rule| rule.template_id() == id)
            .map(|rule| rule.id)
            .collect();

        let mut removed = 0;
        for rule_id in candidates {
            let _rule_guard = self.locks.lock(EntityKind::Rule, rule_id).await;
            // the rule may have moved to another template while we waited
            match self.rules.get(rule_id).await? {
                Some(rule) if rule.template_id() == id => {
                    self.rules.delete(rule_id).await?;
                    removed += 1;
                }
                _ => continue,
            }
        }

        self.templates.delete(id).await?;

        tracing::info!("Deleted template {} and {} dependent rule(s)", id, removed);
        Ok(())
    }

    /// Versions of a template, newest first
    pub async fn template_versions(&self, id: EntityId) -> Result<Vec<Version>, EngineError> {
        let template = self.get_template(id).await?;
        let mut chain = self.template_versions.chain(&template).await?;
        chain.reverse();
        Ok(chain)
    }

    pub async fn diff_template(
        &self,
        id: EntityId,
        version_id: VersionId,
        compare_to: Option<VersionId>,
    ) -> Result<DiffReport, EngineError> {
        let template = self.get_template(id).await?;
        let chain = self.template_versions.chain(&template).await?;
        diff_report::<Template>(&chain, version_id, compare_to)
    }

    pub async fn publish_template(&self, id: EntityId) -> Result<PublishResult, EngineError> {
        self.publisher.publish_template(id).await
    }

    // ==================== Rules ====================

    pub async fn list_rules(&self) -> Result<Vec<Rule>, EngineError> {
        Ok(self.rules.list().await?)
    }

    pub async fn get_rule(&self, id: EntityId) -> Result<Rule, EngineError> {
        self.rules.get(id).await?.ok_or_else(rule_not_found)
    }

    async fn require_template(&self, template_id: EntityId) -> Result<(), EngineError> {
        match self.templates.get(template_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::InvalidReference(
                "Associated template not found".to_string(),
            )),
        }
    }

    /// Create a rule under an existing template, with its first version
    pub async fn create_rule(&self, draft: RuleDraft) -> Result<Rule, EngineError> {
        let template_id = draft.fields.template_id;
        let _template_guard = self.locks.lock(EntityKind::Template, template_id).await;
        self.require_template(template_id).await?;

        let id = self.rules.allocate_entity_id().await?;
        let _guard = self.locks.lock(EntityKind::Rule, id).await;

        let rule = Rule::new(id, draft.fields, Utc::now());
        let message = draft.commit_message.unwrap_or_else(|| CREATE_MESSAGE.to_string());
        let author = self.author_or_default(draft.author);

        let (rule, version) = self.rule_versions.record(rule, &message, &author).await?;

        tracing::info!(
            "Created rule {} '{}' on template {} ({})",
            rule.id,
            rule.fields.name,
            template_id,
            version.version_ref
        );
        Ok(rule)
    }

    /// Replace a rule's attributes and record the edit as a new version
    pub async fn update_rule(&self, id: EntityId, draft: RuleDraft) -> Result<Rule, EngineError> {
        let template_id = draft.fields.template_id;
        let _template_guard = self.locks.lock(EntityKind::Template, template_id).await;
        let _guard = self.locks.lock(EntityKind::Rule, id).await;

        let mut rule = self.get_rule(id).await?;
        self.require_template(template_id).await?;

        rule.fields = draft.fields;
        let message = draft.commit_message.unwrap_or_else(|| UPDATE_MESSAGE.to_string());
        let author = self.author_or_default(draft.author);

        let (rule, version) = self.rule_versions.record(rule, &message, &author).await?;

        tracing::info!("Updated rule {} ({})", rule.id, version.version_ref);
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: EntityId) -> Result<(), EngineError> {
        let _guard = self.locks.lock(EntityKind::Rule, id).await;
        self.get_rule(id).await?;

        self.rules.delete(id).await?;

        tracing::info!("Deleted rule {}", id);
        Ok(())
    }

    /// Versions of a rule, newest first
    pub async fn rule_versions(&self, id: EntityId) -> Result<Vec<Version>, EngineError> {
        let rule = self.get_rule(id).await?;
        let mut chain = self.rule_versions.chain(&rule).await?;
        chain.reverse();
        Ok(chain)
    }

    pub async fn diff_rule(
        &self,
        id: EntityId,
        version_id: VersionId,
        compare_to: Option<VersionId>,
    ) -> Result<DiffReport, EngineError> {
        let rule = self.get_rule(id).await?;
        let chain = self.rule_versions.chain(&rule).await?;
        diff_report::<Rule>(&chain, version_id, compare_to)
    }

    pub async fn publish_rule(&self, id: EntityId) -> Result<PublishResult, EngineError> {
        self.publisher.publish_rule(id).await
    }
}

fn diff_report<E: EntityRecord>(
    chain: &[Version],
    version_id: VersionId,
    compare_to: Option<VersionId>,
) -> Result<DiffReport, EngineError> {
    let (base, target) = select_diff_pair(E::KIND, chain, version_id, compare_to)?;
    Ok(DiffReport {
        version_a: base.version_ref.clone(),
        version_b: target.version_ref.clone(),
        diff: diff(&base.data, &target.data),
    })
}
