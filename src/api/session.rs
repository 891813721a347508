// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session endpoints: register, login, logout, session introspection.
//!
//! Login and register return the issued pair as `HttpOnly` cookies, never in
//! the response body. Logout clears both cookies whether or not any server
//! state existed for the identity.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::auth::guard::{clear_pair_cookies, set_pair_cookies, AuthContext};
use crate::auth::TrustDomain;
use crate::error::ApiError;
use crate::models::{LoginRequest, RegisterRequest, SessionResponse};
use crate::state::AppState;
use crate::storage::{DirectoryError, NewUser};

/// Minimum accepted password length for new accounts.
const MIN_PASSWORD_LEN: usize = 8;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, session cookies set", body = SessionResponse),
        (status = 400, description = "Invalid identity or password"),
        (status = 409, description = "Identity already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Response {
    if body.identity.trim().is_empty() {
        return ApiError::bad_request("identity is required").into_response();
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return ApiError::bad_request("password is too short").into_response();
    }

    let profile = NewUser {
        password: body.password,
        role: body.role.unwrap_or_default(),
    };
    match state.users.create(&body.identity, profile).await {
        Ok(_) => {}
        Err(DirectoryError::AlreadyExists(_)) => {
            return ApiError::conflict("identity already registered").into_response();
        }
        Err(err) => {
            tracing::error!(error = %err, "user creation failed");
            return ApiError::internal("failed to create user").into_response();
        }
    }

    match state.core.issue_session(&body.identity).await {
        Ok(pair) => {
            let mut headers = HeaderMap::new();
            set_pair_cookies(&mut headers, &pair, &state);
            (
                StatusCode::CREATED,
                headers,
                Json(SessionResponse {
                    identity: body.identity,
                    trust: TrustDomain::Local,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, session cookies set", body = SessionResponse),
        (status = 401, description = "Not authorized")
    ),
    tag = "Auth"
)]
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    match state.core.login(&body.identity, &body.password).await {
        Ok(session) => {
            let mut headers = HeaderMap::new();
            if let Some(pair) = &session.rotation {
                set_pair_cookies(&mut headers, pair, &state);
            }
            (
                StatusCode::OK,
                headers,
                Json(SessionResponse {
                    identity: session.identity,
                    trust: session.trust,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared, cookies expired"),
        (status = 401, description = "Not authorized")
    ),
    tag = "Auth"
)]
pub async fn logout(State(state): State<AppState>, Extension(ctx): Extension<AuthContext>) -> Response {
    if let Err(e) = state.core.logout(&ctx.identity).await {
        return e.into_response();
    }

    // Always expire the cookies, even if no server-side state existed.
    let mut headers = HeaderMap::new();
    clear_pair_cookies(&mut headers);
    (StatusCode::NO_CONTENT, headers).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "The authenticated session", body = SessionResponse),
        (status = 401, description = "Not authorized")
    ),
    tag = "Auth"
)]
pub async fn session(Extension(ctx): Extension<AuthContext>) -> Json<SessionResponse> {
    Json(SessionResponse {
        identity: ctx.identity,
        trust: ctx.trust,
    })
}
