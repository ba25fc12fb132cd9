use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::bridge::backend::BackendError;
use crate::bridge::provider::ProviderError;

/// Unified application error type.
///
/// Only errors that reach an HTTP response boundary live here. Failures that
/// are resolved locally (storage corruption, provider sign-out failure) are
/// logged where they occur and never become an `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// A login/registration exchange the backend rejected. The message is the
    /// server-provided one, surfaced verbatim to the caller.
    #[error("{0}")]
    CredentialExchange(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body: `{"error": {"message": ..., "type": ...}}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::CredentialExchange(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unauthorized(_) => "authentication_error",
            Self::CredentialExchange(_) => "credential_error",
            Self::Forbidden(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::BadRequest(_) => "invalid_request_error",
            Self::Provider(_) => "provider_error",
            Self::Storage(_) | Self::Internal(_) => "server_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected(msg) => Self::CredentialExchange(msg),
            other => {
                tracing::error!(error = %other, "Backend exchange error");
                Self::CredentialExchange(BackendError::GENERIC_MESSAGE.to_string())
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::CredentialExchange("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Provider("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_bad_request_message_is_verbatim() {
        // Required-field messages are shown to the user unchanged.
        let err = AppError::BadRequest("Password is required".into());
        assert_eq!(err.to_string(), "Password is required");
    }

    #[test]
    fn test_backend_rejection_surfaces_server_message() {
        let err: AppError = BackendError::Rejected("Invalid credentials".into()).into();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_backend_transport_error_uses_generic_message() {
        let err: AppError = BackendError::Decode("bad json".into()).into();
        assert_eq!(err.to_string(), BackendError::GENERIC_MESSAGE);
    }
}
