use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Status and body relayed unchanged from an upstream HTTP call.
    #[error("upstream responded with {status}")]
    Upstream { status: StatusCode, body: Value },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Turn a non-success upstream response into a pass-through error.
    /// Non-JSON bodies are wrapped as `{"message": <text>}`.
    pub async fn from_upstream(resp: reqwest::Response) -> Self {
        let status = resp.status();
        let url = resp.url().to_string();
        let text = resp.text().await.unwrap_or_default();
        warn!("Upstream {} responded {}: {}", url, status, text);
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "message": text }));
        Self::Upstream { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Upstream { status, body } => (status, Json(body)).into_response(),
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    status,
                    Json(json!({
                        "statusCode": status.as_u16(),
                        "message": "Internal server error",
                    })),
                )
                    .into_response()
            }
            other => (
                status,
                Json(json!({
                    "statusCode": status.as_u16(),
                    "message": other.to_string(),
                    "error": status.canonical_reason(),
                })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_keeps_status() {
        let err = ApiError::Upstream {
            status: StatusCode::UNAUTHORIZED,
            body: json!({ "message": "bad code" }),
        };
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_hides_cause() {
        let resp = ApiError::from(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
