use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::error::RelayError;

/// Failure surfaced by a handler as `{"detail": "..."}`.
///
/// Upstream diagnostics are logged, never echoed to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("Too many requests")]
    TooManyRequests { retry_after: Duration },
    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn empty_query() -> Self {
        Self::BadRequest("Empty query".to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, retry_after) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail, None),
            ApiError::TooManyRequests { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
                Some(retry_after),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
                None,
            ),
            ApiError::Relay(err) => {
                warn!(error = %err, "completion failed");
                match err {
                    RelayError::Validation { message } => (StatusCode::BAD_REQUEST, message, None),
                    RelayError::Timeout { .. } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "LLM error: upstream timed out".to_string(),
                        None,
                    ),
                    RelayError::RateLimit { retry_after, .. } => (
                        StatusCode::TOO_MANY_REQUESTS,
                        "LLM error: upstream rate limited".to_string(),
                        retry_after,
                    ),
                    RelayError::Auth { .. } => (
                        StatusCode::BAD_GATEWAY,
                        "LLM error: provider authentication failed".to_string(),
                        None,
                    ),
                    RelayError::Transport { .. }
                    | RelayError::Upstream { .. }
                    | RelayError::Provider { .. }
                    | RelayError::Retrieval { .. } => (
                        StatusCode::BAD_GATEWAY,
                        "LLM error: upstream request failed".to_string(),
                        None,
                    ),
                    RelayError::InvalidConfig { .. } | RelayError::Unknown { .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                        None,
                    ),
                }
            }
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if let Some(wait) = retry_after {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_details_are_not_leaked() {
        let response = ApiError::from(RelayError::Upstream {
            provider: "openai",
            status: 500,
            message: "secret stack trace".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn rate_limits_forward_retry_after() {
        let response = ApiError::from(RelayError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(9)),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("9")
        );
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let response = ApiError::from(RelayError::Validation {
            message: "unsupported provider: x".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::empty_query().to_string(), "Empty query");
    }

    #[test]
    fn local_limit_rounds_retry_after_up() {
        let response = ApiError::TooManyRequests {
            retry_after: Duration::from_millis(1_200),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("2")
        );

        let response = ApiError::TooManyRequests {
            retry_after: Duration::ZERO,
        }
        .into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("1")
        );
    }
}
