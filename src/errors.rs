use crate::services::registry_service::RegistryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!("internal error: {:#}", err);
        AppError::internal("internal server error")
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::AuthenticationRequired | RegistryError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Sqlx(_)
            | RegistryError::Io(_)
            | RegistryError::Json(_)
            | RegistryError::Queue(_) => {
                error!("request failed: {}", err);
                return AppError::internal("internal server error");
            }
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_statuses() {
        let cases = [
            (RegistryError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (RegistryError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (RegistryError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (RegistryError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RegistryError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (RegistryError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = RegistryError::Io(std::io::Error::other("disk on fire at /secret/path"));
        let app = AppError::from(err);
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!app.message.contains("/secret/path"));
    }
}
