// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authentication error taxonomy.
//!
//! Every failure path in the auth core returns one of these variants so the
//! transport adapters can branch on kind instead of string-matching messages.
//!
//! Client-visible responses are deliberately generic: a rejection never
//! reveals whether the access check, the refresh check, or the remote check
//! failed. The precise reason is logged at debug level instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication failure kinds.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Nothing was presented: no bearer token and no local cookies.
    #[error("no credentials presented")]
    NoCredentials,

    /// Cryptographic or structural token failure (malformed, bad signature,
    /// expired, wrong algorithm, unknown kid).
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    /// Presented refresh token does not match the persisted record.
    #[error("refresh token does not match stored record")]
    InvalidRefreshToken,

    /// Access check failed and no refresh token was presented.
    #[error("authorization failed")]
    AuthorizationFailed,

    /// Refresh token verified but the identity has no user record.
    #[error("no user record for identity")]
    UserNotFound,

    /// Password login failed (unknown identity or wrong password).
    #[error("unauthorized")]
    Unauthorized,

    /// Network failure while fetching remote signing keys. May be transient;
    /// distinct from a cryptographic failure so callers can decide to retry.
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// A store write failed while recording new credentials. The client's
    /// token was valid; this must not be reported as a credential failure.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
}

impl AuthError {
    /// True for failures caused by what the client presented (or didn't).
    pub fn is_credential_failure(&self) -> bool {
        !matches!(self, AuthError::KeyResolution(_) | AuthError::Persistence(_))
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoCredentials
            | AuthError::InvalidToken(_)
            | AuthError::InvalidRefreshToken
            | AuthError::AuthorizationFailed
            | AuthError::UserNotFound
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::KeyResolution(_) => StatusCode::BAD_GATEWAY,
            AuthError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "authentication rejected");
        let message = if self.is_credential_failure() {
            "not authorized"
        } else {
            "authentication backend unavailable"
        };
        (self.status_code(), Json(AuthErrorBody { error: message })).into_response()
    }
}
