//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use crate::metadata::normalizer::MissingRoleError;
use crate::tunnel::TunnelError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection not established: {0}")]
    NotConnected(String),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Metadata error: {0}")]
    MissingRole(#[from] MissingRoleError),

    #[error("Repository API error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(e.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    /// Stable machine-readable code for the error body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotConnected(_) => "NOT_CONNECTED",
            AppError::Tunnel(t) => t.code(),
            AppError::MissingRole(_) => "MISSING_ROLE",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message, details) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::NotConnected(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Tunnel(e) => {
                error!("Tunnel error: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string(), Some(e.remediation().to_string()))
            }
            AppError::MissingRole(e) => {
                error!("Metadata normalization failed: {}", e);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Metadata result set is missing a required column".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                "Repository API request failed".to_string(),
                Some(msg.clone()),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}

/// Helper function to create a bad request error
pub fn bad_request_error(msg: impl Into<String>) -> AppError {
    AppError::BadRequest(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_error_keeps_category_code() {
        let err = AppError::from(TunnelError::TargetNotConnected("i-0abc".to_string()));
        assert_eq!(err.code(), "TUNNEL_TARGET_NOT_CONNECTED");
    }

    #[test]
    fn test_missing_role_response_status() {
        let err = AppError::from(MissingRoleError {
            role: crate::metadata::normalizer::Role::Table,
            headers: vec!["foo".to_string()],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
