//! Bearer-token authentication and role gates.
//!
//! End-user identity lives with an external provider; this module validates
//! HS256 bearer tokens carrying the subject uid and role claim, and offers a
//! development-mode mint used by tooling and the test harness.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::entities::customer::Role;
use crate::errors::ServiceError;
use crate::AppState;

/// Claims carried by a storefront bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: external identity uid.
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_delivery(&self) -> bool {
        self.role == Role::Delivery
    }

    /// Admin-only surface (catalog/coupon mutation, return processing,
    /// refunds, all-orders listing).
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("admin access required".into()))
        }
    }

    /// Status transitions and the delivery dashboard.
    pub fn require_staff(&self) -> Result<(), ServiceError> {
        if self.is_admin() || self.is_delivery() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "admin or delivery access required".into(),
            ))
        }
    }

    /// Owner-or-admin surface (cancel, return request, order detail).
    pub fn require_owner_or_admin(&self, owner_uid: &str) -> Result<(), ServiceError> {
        if self.uid == owner_uid || self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "not the owner of this order".into(),
            ))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Issues an HS256 token. Used by the dev mint endpoint and tests.
pub fn issue_token(
    secret: &str,
    uid: &str,
    role: Role,
    name: Option<String>,
    email: Option<String>,
    ttl_seconds: i64,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: uid.to_string(),
        name,
        email,
        role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::Internal(format!("token creation failed: {}", e)))
}

/// Validates a bearer token and returns its claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected a bearer token".into()))?
            .trim();

        let claims = decode_token(&state.config.jwt_secret, token)?;
        Ok(AuthUser::from(claims))
    }
}
