// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::EnvFilter;

use authgate::api::router;
use authgate::auth::{AuthCore, HttpJwksFetch, JwksResolver, TokenCodec};
use authgate::config::AppConfig;
use authgate::realtime::ConnectionRegistry;
use authgate::state::AppState;
use authgate::storage::{AuthRecordStore, RedbUserDirectory, SessionCache};

/// Identities the session cache can hold before LRU eviction kicks in.
const SESSION_CACHE_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::load().expect("invalid configuration");

    let sessions = Arc::new(SessionCache::new(SESSION_CACHE_CAPACITY));
    let records = Arc::new(
        AuthRecordStore::open(&config.data_dir.join("auth_records.redb"))
            .expect("failed to open auth record store"),
    );
    let users = Arc::new(
        RedbUserDirectory::open(&config.data_dir.join("users.redb"))
            .expect("failed to open user directory"),
    );

    let remote = config.idp.as_ref().map(|idp| {
        let fetch = HttpJwksFetch::new(idp.jwks_url.as_str())
            .expect("failed to build JWKS fetcher");
        tracing::info!(jwks_url = %idp.jwks_url, "remote trust domain enabled");
        JwksResolver::new(Arc::new(fetch), idp.issuer.clone(), idp.audience.clone())
    });
    if remote.is_none() {
        tracing::info!("remote trust domain disabled (IDP_DOMAIN not set)");
    }

    let core = Arc::new(AuthCore::new(
        TokenCodec::new(&config.access_secret, &config.refresh_secret),
        remote,
        sessions,
        records,
        users.clone(),
        config.access_ttl_seconds,
        config.refresh_ttl_seconds,
    ));

    let state = AppState::new(core, users, Arc::new(ConnectionRegistry::new()));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("failed to parse bind address");

    tracing::info!("authgate listening on http://{addr} (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install signal handler");
    tracing::info!("shutdown signal received");
}
