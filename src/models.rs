// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request/response bodies for the auth API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::TrustDomain;
use crate::storage::Role;

/// Body for `POST /v1/auth/register`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Stable user key (email-shaped in practice; any opaque unique string).
    pub identity: String,
    pub password: String,
    /// Defaults to `member`.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Body for `POST /v1/auth/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub identity: String,
    pub password: String,
}

/// The authenticated session as reported to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub identity: String,
    /// Which trust domain authenticated the caller.
    pub trust: TrustDomain,
}

/// Liveness body for `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
