// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local token codec.
//!
//! Signs and verifies locally-issued access and refresh tokens (HS256) with
//! two independent secrets, so a refresh-token compromise cannot forge an
//! access token and vice versa. Pure functions over the configured secrets;
//! no store access and no side effects.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Claims carried by locally-issued tokens.
#[derive(Debug, Serialize, Deserialize)]
struct LocalClaims {
    /// Identity (stable user key).
    sub: String,
    /// Issued at (Unix timestamp).
    iat: i64,
    /// Expiration (Unix timestamp).
    exp: i64,
}

/// Signs and verifies the local access/refresh token pair.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    /// Issue a short-lived access token for `identity`.
    pub fn issue_access(&self, identity: &str, ttl_seconds: i64) -> Result<String, AuthError> {
        sign(identity, ttl_seconds, &self.access_encoding)
    }

    /// Issue a long-lived refresh token for `identity`.
    pub fn issue_refresh(&self, identity: &str, ttl_seconds: i64) -> Result<String, AuthError> {
        sign(identity, ttl_seconds, &self.refresh_encoding)
    }

    /// Verify an access token and return the bound identity.
    pub fn verify_access(&self, token: &str) -> Result<String, AuthError> {
        verify(token, &self.access_decoding)
    }

    /// Verify a refresh token and return the bound identity.
    pub fn verify_refresh(&self, token: &str) -> Result<String, AuthError> {
        verify(token, &self.refresh_decoding)
    }
}

fn sign(identity: &str, ttl_seconds: i64, key: &EncodingKey) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = LocalClaims {
        sub: identity.to_string(),
        iat: now,
        exp: now + ttl_seconds,
    };
    encode(&Header::new(Algorithm::HS256), &claims, key)
        .map_err(|_| AuthError::InvalidToken("failed to sign local token"))
}

fn verify(token: &str, key: &DecodingKey) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Exact expiry: the access TTL already is the grace period.
    validation.leeway = 0;
    validation.validate_aud = false;

    let data = decode::<LocalClaims>(token, key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::InvalidToken("expired"),
        jsonwebtoken::errors::ErrorKind::InvalidSignature => {
            AuthError::InvalidToken("signature mismatch")
        }
        _ => AuthError::InvalidToken("malformed local token"),
    })?;

    Ok(data.claims.sub)
}
