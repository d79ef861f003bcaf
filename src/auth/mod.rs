/*!
 * # Staff Authentication
 *
 * Staff endpoints take `Authorization: Bearer <JWT>` tokens signed with
 * HS256. Tokens carry the staff member's roles and the stores they may
 * manage; `admin` may manage every store.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for staff JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // Subject (staff user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>, // Display name used when attributing notes
    #[serde(default)]
    pub roles: Vec<String>,
    /// Store ids this staff member may manage
    #[serde(default)]
    pub stores: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated staff member extracted from the JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub stores: Vec<String>,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    pub fn can_manage_store(&self, store_id: Uuid) -> bool {
        self.is_admin()
            || self
                .stores
                .iter()
                .any(|s| Uuid::parse_str(s).map_or(false, |id| id == store_id))
    }

    /// Name recorded on notes this user writes
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.user_id)
    }

    /// 403 unless the user may manage `store_id`
    pub fn ensure_store_access(&self, store_id: Uuid) -> Result<(), ServiceError> {
        if self.can_manage_store(store_id) {
            Ok(())
        } else {
            warn!(user_id = %self.user_id, %store_id, "Store access denied");
            Err(ServiceError::Forbidden(
                "you do not have access to this store".into(),
            ))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            roles: claims.roles,
            stores: claims.stores,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingAuth,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication token has expired")]
    ExpiredToken,
    #[error("Failed to issue token: {0}")]
    Issue(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Issue(msg) => ServiceError::InternalError(msg),
            other => ServiceError::AuthError(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Issues and validates staff tokens
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Signs a token for a staff member. Used by operator tooling and tests.
    pub fn issue_token(
        &self,
        user_id: &str,
        name: Option<&str>,
        roles: &[&str],
        stores: &[Uuid],
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|_| AuthError::Issue("invalid token lifetime".into()))?;
        let claims = Claims {
            sub: user_id.to_string(),
            name: name.map(str::to_string),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            stores: stores.iter().map(Uuid::to_string).collect(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => {
                    debug!(error = %e, "Rejected staff token");
                    AuthError::InvalidToken
                }
            })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts).ok_or(AuthError::MissingAuth)?;
        let claims = auth.validate_token(token)?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "test_secret_key_for_testing_purposes_only";

    #[test]
    fn issued_token_round_trips_claims() {
        let auth = AuthService::new(SECRET);
        let store = Uuid::new_v4();
        let token = auth
            .issue_token("staff-1", Some("Asha"), &["staff"], &[store], Duration::from_secs(60))
            .unwrap();
        let user: AuthUser = auth.validate_token(&token).unwrap().into();
        assert_eq!(user.user_id, "staff-1");
        assert_eq!(user.display_name(), "Asha");
        assert!(user.can_manage_store(store));
        assert!(!user.can_manage_store(Uuid::new_v4()));
    }

    #[test]
    fn admin_manages_every_store() {
        let user = AuthUser {
            user_id: "root".into(),
            name: None,
            roles: vec![ADMIN_ROLE.into()],
            stores: vec![],
        };
        assert!(user.ensure_store_access(Uuid::new_v4()).is_ok());
        assert_eq!(user.display_name(), "root");
    }

    #[test]
    fn foreign_store_is_forbidden() {
        let user = AuthUser {
            user_id: "staff".into(),
            name: Some("  ".into()),
            roles: vec!["staff".into()],
            stores: vec!["not-a-uuid".into()],
        };
        assert_matches!(
            user.ensure_store_access(Uuid::new_v4()),
            Err(ServiceError::Forbidden(_))
        );
        assert_eq!(user.display_name(), "staff");
    }

    #[test]
    fn wrong_secret_or_expired_token_is_rejected() {
        let auth = AuthService::new(SECRET);
        let other = AuthService::new("another_secret_key_that_is_long_enough!!");
        let token = other
            .issue_token("x", None, &[], &[], Duration::from_secs(60))
            .unwrap();
        assert_matches!(auth.validate_token(&token), Err(AuthError::InvalidToken));

        let now = Utc::now().timestamp();
        let expired = encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: "x".into(),
                name: None,
                roles: vec![],
                stores: vec![],
                iat: now - 7200,
                exp: now - 3600,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_matches!(auth.validate_token(&expired), Err(AuthError::ExpiredToken));
    }
}
