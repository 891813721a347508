// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::guard::require_auth,
    auth::TrustDomain,
    models::{HealthResponse, LoginRequest, RegisterRequest, SessionResponse},
    realtime,
    state::AppState,
    storage::Role,
};

pub mod health;
pub mod session;

pub fn router(state: AppState) -> Router {
    // Routes behind the HTTP auth guard: verified before the handler runs,
    // rotated cookies applied after it.
    let protected = Router::new()
        .route("/auth/logout", post(session::logout))
        .route("/auth/session", get(session::session))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let v1_routes = Router::new()
        .route("/auth/register", post(session::register))
        .route("/auth/login", post(session::login))
        // The realtime gate authenticates its own handshake.
        .route("/realtime", get(realtime::realtime_handler))
        .merge(protected)
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::register,
        session::login,
        session::logout,
        session::session,
    ),
    components(
        schemas(
            HealthResponse,
            RegisterRequest,
            LoginRequest,
            SessionResponse,
            Role,
            TrustDomain
        )
    ),
    tags(
        (name = "Auth", description = "Login, logout and session management"),
        (name = "Health", description = "Liveness")
    )
)]
struct ApiDoc;
