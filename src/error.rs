// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::{FinalizeError, SessionError, UploadError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Location permission not granted")]
    LocationPermission,

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("No active crawl session")]
    NoActiveSession,

    #[error("A crawl session is already active")]
    SessionAlreadyActive,

    #[error("The crawl is being finalized")]
    CrawlFinalizing,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::PermissionDenied => AppError::LocationPermission,
            SessionError::LocationUnavailable(msg) => AppError::LocationUnavailable(msg),
            SessionError::NoActiveSession => AppError::NoActiveSession,
            SessionError::SessionAlreadyActive => AppError::SessionAlreadyActive,
            SessionError::Finalizing => AppError::CrawlFinalizing,
            SessionError::Validation(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Upload(err.to_string())
    }
}

impl From<FinalizeError> for AppError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::Session(e) => e.into(),
            FinalizeError::Upload(e) => e.into(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::LocationPermission => (
                StatusCode::FORBIDDEN,
                "location_permission_denied",
                Some("Enable location access to start a crawl".to_string()),
            ),
            AppError::LocationUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "location_unavailable",
                Some(msg.clone()),
            ),
            AppError::NoActiveSession => {
                tracing::warn!("Crawl action with no active session");
                (StatusCode::CONFLICT, "no_active_session", None)
            }
            AppError::SessionAlreadyActive => {
                tracing::warn!("Crawl start while another crawl is held");
                (StatusCode::CONFLICT, "session_already_active", None)
            }
            AppError::CrawlFinalizing => (
                StatusCode::CONFLICT,
                "crawl_finalizing",
                Some("The crawl was submitted before this photo arrived".to_string()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Upload(msg) => (
                StatusCode::BAD_GATEWAY,
                "upload_failed",
                Some(format!("{}; your crawl was kept, try again", msg)),
            ),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
