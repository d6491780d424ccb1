//! Core domain models

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CoreError, Snapshot};

/// Numeric identity of a Template or Rule
pub type EntityId = i64;

/// Numeric identity of a Version
pub type VersionId = i64;

/// The two governed entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Template,
    Rule,
}

impl EntityKind {
    /// Prefix used in version reference strings
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Template => "tmpl",
            EntityKind::Rule => "rule",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Template => "template",
            EntityKind::Rule => "rule",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    #[default]
    Draft,
    Published,
}

/// Mutable head fields shared by every entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status: LifecycleStatus,
    /// Identifier assigned by the external publish target
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Most recently published version, if any
    pub last_published_version_id: Option<VersionId>,
}

impl Lifecycle {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: LifecycleStatus::Draft,
            remote_id: None,
            created_at: now,
            updated_at: now,
            last_published_version_id: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == LifecycleStatus::Published
    }
}

/// Behaviour the versioning and publishing engines need from an entity
pub trait EntityRecord:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    fn name(&self) -> &str;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// Deep copy of the structured attribute set
    fn snapshot(&self) -> Result<Snapshot, CoreError>;
}

// ==================== Templates ====================

/// A declared template parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The versioned attribute set of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub data_source_type: String,
    /// Free-form version label supplied by the author
    pub version: String,
    /// Rego policy source
    pub rego: String,
    pub parameters: Vec<TemplateParameter>,
    #[serde(default)]
    pub scanners: Vec<String>,
}

/// A policy template with its current head state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: TemplateFields,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Template {
    pub fn new(id: EntityId, fields: TemplateFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields,
            lifecycle: Lifecycle::new(now),
        }
    }
}

impl EntityRecord for Template {
    const KIND: EntityKind = EntityKind::Template;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.fields.name
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn snapshot(&self) -> Result<Snapshot, CoreError> {
        Snapshot::from_fields(&self.fields)
    }
}

/// Request body for creating or updating a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDraft {
    #[serde(flatten)]
    pub fields: TemplateFields,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

// ==================== Rules ====================

/// A concrete parameter value bound by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParameter {
    pub name: String,
    pub value: String,
}

fn default_is_custom() -> bool {
    true
}

/// The versioned attribute set of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFields {
    /// Owning template (local identity)
    pub template_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_is_custom")]
    pub is_custom: bool,
    pub version: String,
    pub parameters: Vec<RuleParameter>,
}

/// A rule instantiating a template, with its current head state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: RuleFields,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Rule {
    pub fn new(id: EntityId, fields: RuleFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields,
            lifecycle: Lifecycle::new(now),
        }
    }

    pub fn template_id(&self) -> EntityId {
        self.fields.template_id
    }
}

impl EntityRecord for Rule {
    const KIND: EntityKind = EntityKind::Rule;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.fields.name
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn snapshot(&self) -> Result<Snapshot, CoreError> {
        Snapshot::from_fields(&self.fields)
    }
}

/// Request body for creating or updating a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    #[serde(flatten)]
    pub fields: RuleFields,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

// ==================== Versions ====================

/// An immutable snapshot of one entity at one point in its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub entity_id: EntityId,
    pub version_ref: String,
    pub message: String,
    pub author: String,
    pub data: Snapshot,
    pub created_at: DateTime<Utc>,
    /// Chain predecessor; `None` only for the first version
    pub parent_id: Option<VersionId>,
    pub is_published: bool,
}

impl Version {
    /// Build the human-readable reference `<prefix>-<NNN>-<YYYYmmddHHMMSS>`
    pub fn reference(kind: EntityKind, sequence: usize, created_at: DateTime<Utc>) -> String {
        format!(
            "{}-{:03}-{}",
            kind.prefix(),
            sequence,
            created_at.format("%Y%m%d%H%M%S")
        )
    }
}

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub remote_id: String,
    pub version_ref: String,
    pub published_at: DateTime<Utc>,
}

/// Line-based difference between two versions of the same entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub version_a: String,
    pub version_b: String,
    pub diff: Vec<String>,
}
