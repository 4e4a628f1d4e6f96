// src/errors.rs

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Lifecycle misuse of the runtime handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("runtime is already built")]
    AlreadyBuilt,
    #[error("runtime is not built")]
    NotBuilt,
    #[error("runtime is closed")]
    Closed,
}

/// Failures surfaced by HTTP routes.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("Invalid webhook secret")]
    InvalidSecret,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("service not ready: {0}")]
    NotReady(#[from] RuntimeError),
    #[error("update processing failed: {0}")]
    Dispatch(anyhow::Error),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::InvalidSecret => StatusCode::UNAUTHORIZED,
            WebError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        // handler internals stay in the logs
        let detail = match &self {
            WebError::Dispatch(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "ok": false, "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WebError::InvalidSecret.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(WebError::MalformedPayload("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(WebError::from(RuntimeError::Closed).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            WebError::Dispatch(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
