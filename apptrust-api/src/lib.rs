//! AppTrust API Server
//!
//! REST API for authoring, versioning, diffing and publishing policy
//! templates and rules, plus rego validation.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::{AppConfig, ConfigError, StorageKind};
pub use error::ApiError;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Templates
        .route("/templates", get(handlers::list_templates).post(handlers::create_template))
        .route(
            "/templates/:id",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/templates/:id/versions", get(handlers::list_template_versions))
        .route(
            "/templates/:id/versions/:version_id/diff",
            get(handlers::diff_template_version),
        )
        .route("/templates/:id/publish", post(handlers::publish_template))
        // Rules
        .route("/rules", get(handlers::list_rules).post(handlers::create_rule))
        .route(
            "/rules/:id",
            get(handlers::get_rule)
                .put(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        .route("/rules/:id/versions", get(handlers::list_rule_versions))
        .route(
            "/rules/:id/versions/:version_id/diff",
            get(handlers::diff_rule_version),
        )
        .route("/rules/:id/publish", post(handlers::publish_rule))
        // Validation
        .route("/validation/rego", post(handlers::validate_rego))
        .route("/validation/rego/eval", post(handlers::evaluate_rego))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let prefix = app_state.config.api_prefix.clone();

    let router = Router::new().route("/health", get(handlers::health_check));
    let router = if prefix.is_empty() {
        router.merge(api_routes())
    } else {
        router.nest(&prefix, api_routes())
    };

    router
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
