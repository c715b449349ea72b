//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Roles whose holders may use the support dashboard
pub const STAFF_ROLES: &[&str] = &["staff", "admin", "superadmin"];

/// JWT claims carried by staff tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Display name shown to customers
    pub name: String,
    pub email: String,
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

impl Claims {
    pub fn is_staff(&self) -> bool {
        STAFF_ROLES.contains(&self.role.as_str())
    }
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    /// Mint a token. Issuance normally happens in the account service; this
    /// exists for tooling and tests.
    pub fn generate_token(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
        role: &str,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.expiry_hours);

        let claims = Claims {
            sub: user_id,
            name: name.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new(SECRET, 24);
        let user_id = Uuid::new_v4();

        let token = jwt
            .generate_token(user_id, "Grace", "grace@example.com", "staff")
            .expect("Failed to generate token");

        let claims = jwt.validate_token(&token).expect("Invalid token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.name, "Grace");
        assert!(claims.is_staff());
    }

    #[test]
    fn test_customer_role_is_not_staff() {
        let jwt = JwtManager::new(SECRET, 24);
        let token = jwt
            .generate_token(Uuid::new_v4(), "Ada", "ada@example.com", "customer")
            .unwrap();
        assert!(!jwt.validate_token(&token).unwrap().is_staff());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let other = JwtManager::new("another-secret-key-at-least-32-chars", 24);
        let token = other
            .generate_token(Uuid::new_v4(), "Mallory", "m@example.com", "admin")
            .unwrap();

        let jwt = JwtManager::new(SECRET, 24);
        assert!(matches!(jwt.validate_token(&token), Err(JwtError::Invalid)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = JwtManager::new(SECRET, -2);
        let token = jwt
            .generate_token(Uuid::new_v4(), "Grace", "grace@example.com", "staff")
            .unwrap();
        assert!(matches!(jwt.validate_token(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let jwt = JwtManager::new(SECRET, 24);
        assert!(jwt.validate_token("not-a-jwt").is_err());
    }
}
