//! Error types for the chat core

use thiserror::Error;

/// Failure taxonomy of the chat core.
///
/// Every operation of the controller, the automated response engine and the
/// stores reports one of these. Transport layers decide how each surfaces
/// (error frame, refused upgrade, HTTP status).
#[derive(Debug, Error)]
pub enum ChatError {
    /// An action addressed a customer id or session id with no session.
    #[error("Chat session not found: {0}")]
    SessionNotFound(String),

    /// An inbound frame or request is missing a required field or carries
    /// an unusable value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller is not allowed to open this kind of connection.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A room member's transport rejected an event.
    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    /// The backing store failed. No retry is attempted by the core.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ChatError {
    /// Short machine-readable code used in error frames and API bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::DeliveryFailure(_) => "DELIVERY_FAILURE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// Result alias for chat core operations
pub type ChatResult<T> = Result<T, ChatError>;
