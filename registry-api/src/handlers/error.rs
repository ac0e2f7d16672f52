use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_derive::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use registry_common::registry::RegistryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: &'static str,
    detail: String,
}

impl ApiError {
    /// Returns (error_code, status_code) for this error.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::MalformedPayload(_) => ("malformed_payload", StatusCode::BAD_REQUEST),
            ApiError::Registry(RegistryError::Validation(_)) => {
                ("validation_error", StatusCode::BAD_REQUEST)
            }
            ApiError::Registry(RegistryError::NotFound { .. }) => {
                ("not_found", StatusCode::NOT_FOUND)
            }
            ApiError::Registry(RegistryError::Conflict(_)) => ("conflict", StatusCode::CONFLICT),
            ApiError::Registry(RegistryError::DependencyFailure(_)) => {
                ("dependency_failure", StatusCode::SERVICE_UNAVAILABLE)
            }
            ApiError::Registry(RegistryError::Internal(_)) => {
                ("internal_error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error_type, status) = self.error_metadata();
        let detail = match &self {
            ApiError::MalformedPayload(reason) => reason.clone(),
            ApiError::Registry(err) => err.to_string(),
        };

        if status.is_server_error() {
            error!(error_type, "request failed: {}", detail);
        } else {
            debug!(error_type, "request rejected: {}", detail);
        }

        (status, Json(ErrorBody { error_type, detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registry_error_has_its_own_status() {
        let cases = [
            (RegistryError::Validation("x".to_owned()), StatusCode::BAD_REQUEST),
            (
                RegistryError::NotFound {
                    kind: "extension",
                    id: "e1".to_owned(),
                },
                StatusCode::NOT_FOUND,
            ),
            (RegistryError::Conflict("x".to_owned()), StatusCode::CONFLICT),
            (
                RegistryError::DependencyFailure("x".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RegistryError::Internal("x".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_malformed_payload_is_distinct_from_validation() {
        let malformed = ApiError::MalformedPayload("expected value".to_owned());
        let invalid = ApiError::Registry(RegistryError::Validation("name is required".to_owned()));

        assert_eq!(malformed.error_metadata().0, "malformed_payload");
        assert_eq!(invalid.error_metadata().0, "validation_error");
        assert_eq!(malformed.error_metadata().1, invalid.error_metadata().1);
    }
}
