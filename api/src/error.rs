use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// API Error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// No valid session was presented. Clients should prompt re-login.
    #[error("{0}")]
    Unauthenticated(String),

    /// Valid session, failed capability check
    #[error("access denied")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    InternalError(String),
}

/// Error response structure for OpenAPI documentation
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ApiError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for the error type
    pub fn error_code(&self) -> &str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details are logged under a correlation id, never sent
        let (message, correlation_id) = match &self {
            ApiError::InternalError(detail) => {
                let correlation_id = ulid::Ulid::new().to_string();
                error!(correlation_id = %correlation_id, "Internal error: {}", detail);
                (
                    format!("An internal error occurred (reference {})", correlation_id),
                    Some(correlation_id),
                )
            }
            other => (other.to_string(), None),
        };

        let error_response = ApiErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                correlation_id,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<user::UserError> for ApiError {
    fn from(err: user::UserError) -> Self {
        match err {
            user::UserError::InvalidCredentials => {
                ApiError::Unauthenticated("invalid credentials".to_string())
            }
            user::UserError::NotAuthenticated | user::UserError::SessionExpired => {
                ApiError::Unauthenticated("not authenticated".to_string())
            }
            user::UserError::UserNotFound(id) => ApiError::NotFound(format!("user {}", id)),
            user::UserError::Duplicate { field, value } => {
                ApiError::Conflict(format!("duplicate {}: {}", field, value))
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<authz::error::AuthzError> for ApiError {
    fn from(err: authz::error::AuthzError) -> Self {
        match err {
            authz::error::AuthzError::Unauthenticated => {
                ApiError::Unauthenticated("not authenticated".to_string())
            }
            authz::error::AuthzError::Forbidden { .. } => ApiError::Forbidden,
            authz::error::AuthzError::Database(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<events::EventError> for ApiError {
    fn from(err: events::EventError) -> Self {
        match err {
            events::EventError::Validation(msg) => ApiError::ValidationError(msg),
            events::EventError::NotFound => ApiError::NotFound("event".to_string()),
            events::EventError::AccessDenied => ApiError::Forbidden,
            events::EventError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
