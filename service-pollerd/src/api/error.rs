use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shared::validation::ValidationError;
use crate::error::RegistryError;

/// Rejections produced by the admin API. Validation failures never reach
/// the registry; registry failures map one-to-one onto a status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            ApiError::Registry(e) => match e {
                RegistryError::DuplicateName(_) => (StatusCode::CONFLICT, "DUPLICATE_NAME", e.to_string()),
                RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
                RegistryError::Invalid(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
                RegistryError::Store(_) | RegistryError::Closed => {
                    tracing::error!("Registry failure: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_registry_errors_map_to_distinct_codes() {
        let (status, json) = render(RegistryError::DuplicateName("svc1".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "DUPLICATE_NAME");

        let (status, json) = render(RegistryError::NotFound("svc1".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "NOT_FOUND");

        let (status, _) = render(RegistryError::Invalid("bad".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failures_are_sanitized() {
        let (status, json) = render(RegistryError::Closed.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let (status, json) = render(ValidationError::MissingFields.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "url and name are mandatory");
    }
}
