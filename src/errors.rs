use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::origin::DecodeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("malformed origin token: {0}")]
    MalformedToken(#[from] DecodeError),

    #[error("forbidden target: {0}")]
    ForbiddenTarget(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream timeout")]
    UpstreamTimeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::MalformedToken(e) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "malformed_origin_token",
                format!("malformed origin token: {}", e),
            ),
            AppError::ForbiddenTarget(host) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "forbidden_target",
                format!("target {} is not reachable through this proxy", host),
            ),
            AppError::Upstream(e) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_failed",
                e.clone(),
            ),
            AppError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout_error",
                "upstream_timeout",
                "upstream did not answer in time".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
