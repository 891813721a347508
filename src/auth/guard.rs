// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP transport adapter over the authentication core.
//!
//! Extracts local tokens from the `access_token`/`refresh_token` cookies and
//! a remote bearer from the `x-id-token` header, runs the core's state
//! machine before the handler, and propagates rotated tokens back to the
//! client as `HttpOnly` cookies on the outgoing response. A rejected request
//! never reaches a handler.
//!
//! The same [`extract_credentials`] is used by the realtime gate, so the two
//! transports cannot drift in how they read credentials.

use axum::{
    extract::{Request, State},
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::core::{Credentials, TokenPair, TrustDomain};
use crate::state::AppState;

/// Cookie carrying the short-lived local access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie carrying the long-lived local refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Header carrying a remote-issued bearer token (`Bearer <token>`).
pub const ID_TOKEN_HEADER: &str = "x-id-token";

/// The authenticated caller, inserted into request extensions by the guard.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: String,
    pub trust: TrustDomain,
}

/// Resolve everything the request presented into one credential union.
pub fn extract_credentials(headers: &HeaderMap) -> Credentials {
    Credentials::from_parts(
        remote_bearer(headers),
        cookie_value(headers, ACCESS_COOKIE),
        cookie_value(headers, REFRESH_COOKIE),
    )
}

/// Middleware: verify before the handler, set rotated cookies after it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = extract_credentials(request.headers());

    match state.core.verify(credentials).await {
        Ok(session) => {
            request.extensions_mut().insert(AuthContext {
                identity: session.identity,
                trust: session.trust,
            });
            let mut response = next.run(request).await;
            if let Some(pair) = session.rotation {
                set_pair_cookies(response.headers_mut(), &pair, &state);
            }
            response
        }
        Err(e) => e.into_response(),
    }
}

/// Append Set-Cookie headers for a freshly issued pair.
pub fn set_pair_cookies(headers: &mut HeaderMap, pair: &TokenPair, state: &AppState) {
    let access = token_cookie(ACCESS_COOKIE, &pair.access, state.core.access_ttl_seconds());
    let refresh = token_cookie(REFRESH_COOKIE, &pair.refresh, state.core.refresh_ttl_seconds());
    match (access, refresh) {
        (Ok(access), Ok(refresh)) => {
            headers.append(SET_COOKIE, access);
            headers.append(SET_COOKIE, refresh);
        }
        _ => tracing::error!("failed to encode rotated token cookies"),
    }
}

/// Append expired Set-Cookie headers clearing both token cookies.
pub fn clear_pair_cookies(headers: &mut HeaderMap) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        if let Ok(cookie) = clear_cookie(name) {
            headers.append(SET_COOKIE, cookie);
        }
    }
}

/// Build a secure `HttpOnly` cookie for a token value.
fn token_cookie(
    name: &str,
    token: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    ))
}

fn clear_cookie(name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
    ))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn remote_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(ID_TOKEN_HEADER)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
