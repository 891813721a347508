// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for the redb stores | `/data` |
//! | `ACCESS_TOKEN_SECRET` | HS256 secret for local access tokens | Required |
//! | `REFRESH_TOKEN_SECRET` | HS256 secret for local refresh tokens | Required |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` (15 min) |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` (7 days) |
//! | `IDP_DOMAIN` | Remote provider domain (JWKS fetched from its well-known path) | Optional |
//! | `IDP_ISSUER` | Expected `iss` of remote tokens | Required with `IDP_DOMAIN` |
//! | `IDP_AUDIENCE` | Expected `aud` of remote tokens | Required with `IDP_DOMAIN` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! The two signing secrets must differ: sharing one would collapse the
//! access and refresh trust boundaries into a single key.

use std::env;
use std::path::PathBuf;

use url::Url;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 900;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ")]
    SharedSecret,
}

/// Remote identity provider settings.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Full JWKS endpoint URL, derived from `IDP_DOMAIN`.
    pub jwks_url: Url,
    pub issuer: String,
    pub audience: String,
}

/// Application configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    /// `None` disables the remote trust domain entirely.
    pub idp: Option<IdpConfig>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let access_secret = require("ACCESS_TOKEN_SECRET")?;
        let refresh_secret = require("REFRESH_TOKEN_SECRET")?;
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid("PORT", e.to_string()))?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "/data".to_string())),
            access_secret,
            refresh_secret,
            access_ttl_seconds: ttl_from_env("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?,
            refresh_ttl_seconds: ttl_from_env("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?,
            idp: idp_from_env()?,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn ttl_from_env(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<i64>()
            .ok()
            .filter(|ttl| *ttl > 0)
            .ok_or_else(|| ConfigError::Invalid(name, value)),
        Err(_) => Ok(default),
    }
}

fn idp_from_env() -> Result<Option<IdpConfig>, ConfigError> {
    let Ok(domain) = env::var("IDP_DOMAIN") else {
        return Ok(None);
    };

    let jwks_url = Url::parse(&format!("https://{domain}/.well-known/jwks.json"))
        .map_err(|e| ConfigError::Invalid("IDP_DOMAIN", e.to_string()))?;

    Ok(Some(IdpConfig {
        jwks_url,
        issuer: require("IDP_ISSUER")?,
        audience: require("IDP_AUDIENCE")?,
    }))
}
