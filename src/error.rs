use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{database::StoreError, media::MediaError};

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Slow down.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{RATE_LIMITED_MESSAGE}")]
    RateLimited,
    #[error("invalid file type")]
    InvalidFileType {
        file_type: String,
        allowed_types: Vec<String>,
    },
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_types: Option<Vec<String>>,
}

impl ErrorResponse {
    fn message(error: String) -> Self {
        Self {
            error,
            file_type: None,
            allowed_types: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::message(msg)),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorResponse::message(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::message(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::message(msg)),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse::message(RATE_LIMITED_MESSAGE.to_string()),
            ),
            AppError::InvalidFileType {
                file_type,
                allowed_types,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "invalid file type".to_string(),
                    file_type: Some(file_type),
                    allowed_types: Some(allowed_types),
                },
            ),
            AppError::Internal(msg) => {
                // 真实错误只记日志，客户端拿到通用信息
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("Internal server error".to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(e: MediaError) -> Self {
        AppError::Internal(format!("media host: {e}"))
    }
}
