//! Application state shared across handlers

use apptrust_engine::Catalog;
use apptrust_publisher::PublishTarget;
use apptrust_storage::{InMemoryStorage, Storage};
use apptrust_validator::{BasicValidator, PolicyValidator};
use std::sync::Arc;

use crate::AppConfig;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Catalog,
    pub validator: Arc<dyn PolicyValidator>,
}

impl AppState {
    /// Create with a custom storage backend
    pub fn with_storage<S: Storage + 'static>(
        config: AppConfig,
        storage: Arc<S>,
        target: Arc<dyn PublishTarget>,
        validator: Arc<dyn PolicyValidator>,
    ) -> Self {
        let catalog = Catalog::new(storage, target, config.default_author.clone());
        Self {
            config,
            catalog,
            validator,
        }
    }

    /// In-memory storage, default configuration and basic rego validation
    pub fn in_memory(target: Arc<dyn PublishTarget>) -> Self {
        Self::with_storage(
            AppConfig::default(),
            Arc::new(InMemoryStorage::new()),
            target,
            Arc::new(BasicValidator),
        )
    }
}
