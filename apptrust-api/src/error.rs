//! API error types and error handling

use apptrust_engine::EngineError;
use apptrust_storage::StorageError;
use apptrust_validator::ValidatorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Upstream publish failed: {0}")]
    Upstream(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => ApiError::NotFound(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::InvalidReference(msg) => ApiError::InvalidReference(msg),
            EngineError::PreconditionFailed(msg) => ApiError::PreconditionFailed(msg),
            EngineError::Upstream(msg) => ApiError::Upstream(msg),
            EngineError::Integrity(msg) => ApiError::Integrity(msg),
            EngineError::Storage(err) => err.into(),
            EngineError::Core(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ValidatorError> for ApiError {
    fn from(err: ValidatorError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::InvalidReference(_) => (StatusCode::BAD_REQUEST, "invalid_reference"),
            ApiError::PreconditionFailed(_) => (StatusCode::BAD_REQUEST, "precondition_failed"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ApiError::Integrity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "integrity_violation"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EngineError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(EngineError::InvalidReference("x".into()), StatusCode::BAD_REQUEST)]
    #[case(EngineError::PreconditionFailed("x".into()), StatusCode::BAD_REQUEST)]
    #[case(EngineError::Upstream("x".into()), StatusCode::BAD_GATEWAY)]
    #[case(EngineError::Integrity("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(
        EngineError::Storage(StorageError::NotFound("x".into())),
        StatusCode::NOT_FOUND
    )]
    #[case(
        EngineError::Storage(StorageError::Connection("x".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn test_engine_error_status(#[case] err: EngineError, #[case] expected: StatusCode) {
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), expected);
    }
}
