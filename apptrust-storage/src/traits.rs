//! Storage traits defining the interface for persistence

use apptrust_core::{EntityId, EntityRecord, Version, VersionId};
use async_trait::async_trait;

use crate::StorageError;

/// Row storage for one entity kind and its versions.
///
/// Implementations must apply `commit` and `delete` atomically: either every
/// record in the call is written (or removed) or none is.
#[async_trait]
pub trait EntityStorage<E: EntityRecord>: Send + Sync {
    /// Reserve a fresh entity identity
    async fn allocate_entity_id(&self) -> Result<EntityId, StorageError>;

    /// Reserve a fresh version identity
    async fn allocate_version_id(&self) -> Result<VersionId, StorageError>;

    /// Get an entity by ID
    async fn get(&self, id: EntityId) -> Result<Option<E>, StorageError>;

    /// List all entities, newest first
    async fn list(&self) -> Result<Vec<E>, StorageError>;

    /// All versions of an entity, oldest first
    async fn versions(&self, entity_id: EntityId) -> Result<Vec<Version>, StorageError>;

    /// Upsert an entity together with any of its versions in one unit of work
    async fn commit(&self, entity: &E, versions: &[Version]) -> Result<(), StorageError>;

    /// Delete an entity and every version it owns
    async fn delete(&self, id: EntityId) -> Result<(), StorageError>;
}
