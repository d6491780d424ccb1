//! API request handlers

use apptrust_core::{EntityId, RuleDraft, TemplateDraft, VersionId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Query string of the diff endpoints
#[derive(Debug, Deserialize)]
pub struct DiffParams {
    pub compare_to: Option<VersionId>,
}

// ==================== Template Handlers ====================

/// List templates, newest first
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.list_templates().await?))
}

/// Create a template and its first version
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<TemplateDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state.catalog.create_template(draft).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.get_template(id).await?))
}

/// Replace a template's attributes, recording a new version
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    Json(draft): Json<TemplateDraft>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.update_template(id, draft).await?))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    state.catalog.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_template_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.template_versions(id).await?))
}

pub async fn diff_template_version(
    State(state): State<Arc<AppState>>,
    Path((id, version_id)): Path<(EntityId, VersionId)>,
    Query(params): Query<DiffParams>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .catalog
        .diff_template(id, version_id, params.compare_to)
        .await?;
    Ok(Json(report))
}

pub async fn publish_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.publish_template(id).await?))
}

// ==================== Rule Handlers ====================

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.list_rules().await?))
}

/// Create a rule under an existing template
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<RuleDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.catalog.create_rule(draft).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.get_rule(id).await?))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    Json(draft): Json<RuleDraft>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.update_rule(id, draft).await?))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    state.catalog.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_rule_versions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.rule_versions(id).await?))
}

pub async fn diff_rule_version(
    State(state): State<Arc<AppState>>,
    Path((id, version_id)): Path<(EntityId, VersionId)>,
    Query(params): Query<DiffParams>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .catalog
        .diff_rule(id, version_id, params.compare_to)
        .await?;
    Ok(Json(report))
}

pub async fn publish_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog.publish_rule(id).await?))
}

// ==================== Validation Handlers ====================

#[derive(Debug, Deserialize)]
pub struct RegoValidationRequest {
    pub rego: String,
}

#[derive(Debug, Serialize)]
pub struct RegoValidationResponse {
    pub valid: bool,
    pub errors: Option<Vec<String>>,
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RegoEvaluationRequest {
    pub rego: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct RegoEvaluationResponse {
    pub result: Option<Value>,
    pub errors: Option<Vec<String>>,
    pub warnings: Option<Vec<String>>,
    pub command: Option<String>,
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Check rego syntax with the configured validator
pub async fn validate_rego(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegoValidationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.validator.validate(&req.rego).await?;
    tracing::debug!(
        "Validated rego with {} strategy: valid={}",
        state.validator.strategy(),
        report.valid
    );

    Ok(Json(RegoValidationResponse {
        valid: report.valid,
        errors: non_empty(report.errors),
        warnings: non_empty(report.warnings),
    }))
}

/// Evaluate rego against an input document
pub async fn evaluate_rego(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegoEvaluationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.validator.evaluate(&req.rego, &req.input).await?;

    Ok(Json(RegoEvaluationResponse {
        result: report.result,
        errors: non_empty(report.errors),
        warnings: non_empty(report.warnings),
        command: report.command.filter(|c| !c.is_empty()),
    }))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "apptrust"
    }))
}
