//! AppTrust - Main Application Entry Point
//!
//! Governs policy templates and rules: every edit becomes an immutable
//! version, versions can be diffed, and the latest version is published to
//! the external unified-policy service.

use anyhow::Context;
use apptrust_api::{AppConfig, AppState, StorageKind};
use apptrust_publisher::{PublishTarget, UnifiedPolicyClient};
use apptrust_storage::InMemoryStorage;
use apptrust_validator::select_validator;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,apptrust=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let address = config.bind_address();

    tracing::info!("Starting AppTrust server on {}", address);

    let target: Arc<dyn PublishTarget> = Arc::new(
        UnifiedPolicyClient::new(&config.upstream).context("Failed to build upstream client")?,
    );
    tracing::info!("Publishing to {}", config.upstream.base_url);

    let validator = select_validator(config.opa_binary.as_deref());

    // Initialize storage backend
    let app_state = match config.storage {
        StorageKind::Couchbase => {
            #[cfg(feature = "couchbase")]
            {
                use apptrust_storage::{CouchbaseConfig, CouchbaseStorage};
                tracing::info!("Initializing Couchbase storage...");
                let store = CouchbaseStorage::new(CouchbaseConfig {
                    connection_string: config.couchbase.connection_string.clone(),
                    username: config.couchbase.username.clone(),
                    password: config.couchbase.password.clone(),
                    bucket_name: config.couchbase.bucket.clone(),
                })
                .await
                .context("Failed to initialize Couchbase storage")?;
                AppState::with_storage(config, Arc::new(store), target, validator)
            }
            #[cfg(not(feature = "couchbase"))]
            {
                anyhow::bail!("Couchbase storage requested but 'couchbase' feature not enabled");
            }
        }
        StorageKind::Memory => {
            tracing::info!("Initializing InMemory storage...");
            AppState::with_storage(config, Arc::new(InMemoryStorage::new()), target, validator)
        }
    };

    // Build our application with routes
    let app = apptrust_api::create_router(Arc::new(app_state));

    // Run it
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    axum::serve(listener, app).await?;

    Ok(())
}
