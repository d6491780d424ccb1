//! In-memory storage implementation for development and testing

use apptrust_core::{EntityId, EntityRecord, Rule, Template, Version, VersionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::{EntityStorage, StorageError};

/// Rows of one entity kind.
///
/// The whole table sits behind a single lock, so a commit or delete touching
/// an entity and its versions is one critical section.
struct Table<E> {
    entities: BTreeMap<EntityId, E>,
    versions: BTreeMap<VersionId, Version>,
    next_entity_id: EntityId,
    next_version_id: VersionId,
}

impl<E: EntityRecord> Table<E> {
    fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            versions: BTreeMap::new(),
            next_entity_id: 1,
            next_version_id: 1,
        }
    }

    fn allocate_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    fn allocate_version_id(&mut self) -> VersionId {
        let id = self.next_version_id;
        self.next_version_id += 1;
        id
    }

    fn list(&self) -> Vec<E> {
        let mut entities: Vec<_> = self.entities.values().cloned().collect();
        entities.sort_by(|a, b| {
            b.lifecycle()
                .created_at
                .cmp(&a.lifecycle().created_at)
                .then(b.id().cmp(&a.id()))
        });
        entities
    }

    fn versions(&self, entity_id: EntityId) -> Vec<Version> {
        let mut versions: Vec<_> = self
            .versions
            .values()
            .filter(|v| v.entity_id == entity_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        versions
    }

    fn commit(&mut self, entity: &E, versions: &[Version]) -> Result<(), StorageError> {
        if let Some(stray) = versions.iter().find(|v| v.entity_id != entity.id()) {
            return Err(StorageError::Internal(format!(
                "version {} belongs to {} {}, not {}",
                stray.id,
                E::KIND,
                stray.entity_id,
                entity.id()
            )));
        }

        self.entities.insert(entity.id(), entity.clone());
        for version in versions {
            self.versions.insert(version.id, version.clone());
        }
        Ok(())
    }

    fn delete(&mut self, id: EntityId) -> Result<(), StorageError> {
        if !self.entities.contains_key(&id) {
            return Err(StorageError::NotFound(format!(
                "{} with id {} not found",
                E::KIND,
                id
            )));
        }
        self.versions.retain(|_, v| v.entity_id != id);
        self.entities.remove(&id);
        Ok(())
    }
}

/// In-memory storage for development and testing
pub struct InMemoryStorage {
    templates: RwLock<Table<Template>>,
    rules: RwLock<Table<Rule>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(Table::new()),
            rules: RwLock::new(Table::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_entity_storage {
    ($entity:ty, $table:ident) => {
        #[async_trait]
        impl EntityStorage<$entity> for InMemoryStorage {
            async fn allocate_entity_id(&self) -> Result<EntityId, StorageError> {
                Ok(self.$table.write().allocate_entity_id())
            }

            async fn allocate_version_id(&self) -> Result<VersionId, StorageError> {
                Ok(self.$table.write().allocate_version_id())
            }

            async fn get(&self, id: EntityId) -> Result<Option<$entity>, StorageError> {
                Ok(self.$table.read().entities.get(&id).cloned())
            }

            async fn list(&self) -> Result<Vec<$entity>, StorageError> {
                Ok(self.$table.read().list())
            }

            async fn versions(&self, entity_id: EntityId) -> Result<Vec<Version>, StorageError> {
                Ok(self.$table.read().versions(entity_id))
            }

            async fn commit(
                &self,
                entity: &$entity,
                versions: &[Version],
            ) -> Result<(), StorageError> {
                self.$table.write().commit(entity, versions)?;
                tracing::debug!(
                    "Committed {} {} with {} version record(s)",
                    <$entity as EntityRecord>::KIND,
                    entity.id,
                    versions.len()
                );
                Ok(())
            }

            async fn delete(&self, id: EntityId) -> Result<(), StorageError> {
                self.$table.write().delete(id)
            }
        }
    };
}

impl_entity_storage!(Template, templates);
impl_entity_storage!(Rule, rules);
