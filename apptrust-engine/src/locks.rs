//! Per-entity write serialization

use apptrust_core::{EntityId, EntityKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockKey = (EntityKind, EntityId);

/// Registry of one async mutex per entity.
///
/// Holding the guard for an entity excludes every other snapshot, publish or
/// delete of that same entity; other entities are unaffected. An entry lives
/// only while some caller holds or waits for it.
#[derive(Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one entity until dropped
pub struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, kind: EntityKind, id: EntityId) -> EntityGuard<'_> {
        let key = (kind, id);
        let mutex = {
            let mut map = self.inner.lock();
            map.entry(key).or_default().clone()
        };
        EntityGuard {
            locks: self,
            key,
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Number of entities currently held or awaited
    pub fn tracked(&self) -> usize {
        self.inner.lock().len()
    }

    fn release(&self, key: &LockKey) {
        let mut map = self.inner.lock();
        // clones are only taken under the map lock, so a count of one means
        // nobody holds or waits for this entry
        if map.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(key);
        }
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}
