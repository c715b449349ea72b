//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use parley_shared::ChatError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Chat session not found: {0}")]
    SessionNotFound(String),
    #[error("Resource not found")]
    NotFound,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound(_) | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Delivery(_) | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => ("INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => ("UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => ("FORBIDDEN", self.to_string()),

            // Validation
            ApiError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::SessionNotFound(_) => ("SESSION_NOT_FOUND", "Chat session not found".to_string()),
            ApiError::NotFound => ("NOT_FOUND", self.to_string()),

            // Internal
            ApiError::Database(_) => ("DATABASE_ERROR", "Database error".to_string()),
            ApiError::Delivery(_) => ("DELIVERY_FAILURE", "Delivery failed".to_string()),
            ApiError::Internal => ("INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => ("SERVICE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (self.status(), body).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::SessionNotFound(customer) => ApiError::SessionNotFound(customer),
            ChatError::Validation(msg) => ApiError::Validation(msg),
            ChatError::Unauthorized(_) => ApiError::Unauthorized,
            ChatError::DeliveryFailure(msg) => ApiError::Delivery(msg),
            ChatError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Store unavailable");
                ApiError::Database(msg)
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
