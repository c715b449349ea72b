//! Staff authentication
//!
//! Dashboard endpoints and the admin socket accept only tokens whose role
//! is one of [`jwt::STAFF_ROLES`].

pub mod jwt;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub use jwt::{Claims, JwtError, JwtManager};

/// Authenticated staff member, inserted as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

impl StaffUser {
    /// Name used for replies and status changes
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// Validate a token and require a staff role
pub fn authenticate_staff(jwt: &JwtManager, token: &str) -> Result<StaffUser, ApiError> {
    let claims = jwt.validate_token(token).map_err(|e| {
        tracing::warn!(error = %e, "Staff token rejected");
        ApiError::InvalidToken
    })?;

    if !claims.is_staff() {
        tracing::warn!(user_id = %claims.sub, role = %claims.role, "Non-staff token used on staff surface");
        return Err(ApiError::Forbidden);
    }

    Ok(StaffUser {
        user_id: claims.sub,
        name: claims.name,
        email: claims.email,
    })
}

/// Middleware that requires a staff bearer token
pub async fn require_staff(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let staff = authenticate_staff(&state.jwt, token.trim())?;
    request.extensions_mut().insert(staff);

    Ok(next.run(request).await)
}
