// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote signing-key resolution and remote-token verification.
//!
//! Public keys are fetched from the identity provider's JWKS endpoint and
//! cached per `kid`. Cached keys are never proactively expired: an unknown
//! `kid` triggers a fresh fetch of the whole document (key rotation shows up
//! as a new `kid`), and a network failure during that fetch is retried once
//! before surfacing as [`AuthError::KeyResolution`] — distinct from a
//! cryptographic failure, so callers know the attempt may be retryable.
//!
//! ## Security
//!
//! - JWKS is fetched via HTTPS only
//! - Remote tokens must carry a `kid`; tokens without one are rejected
//! - Only the provider's asymmetric algorithms are accepted; a token whose
//!   header claims HS256/384/512 is rejected before any key lookup, closing
//!   the algorithm-confusion forgery path

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::error::AuthError;

/// Clock skew tolerance for remote tokens (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Claims this service reads from a remote-issued token.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteClaims {
    /// Subject — the provider's canonical user identifier.
    pub sub: String,
    /// Issuer.
    #[serde(default)]
    pub iss: String,
    /// Expiration timestamp.
    #[serde(default)]
    pub exp: i64,
    /// Audience (validated by the jsonwebtoken crate, kept for logging).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

/// Fetches the provider's JWKS document.
///
/// A trait seam so the resolver can be exercised without a network.
#[async_trait]
pub trait JwksFetch: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

/// Production fetcher against `https://<provider>/.well-known/jwks.json`.
pub struct HttpJwksFetch {
    jwks_url: String,
    client: reqwest::Client,
}

impl HttpJwksFetch {
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::KeyResolution(e.to_string()))?;
        Ok(Self {
            jwks_url: jwks_url.into(),
            client,
        })
    }
}

#[async_trait]
impl JwksFetch for HttpJwksFetch {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyResolution(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyResolution(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyResolution(e.to_string()))
    }
}

/// Resolves remote signing keys by `kid` and verifies remote-issued tokens.
pub struct JwksResolver {
    fetcher: Arc<dyn JwksFetch>,
    expected_issuer: String,
    expected_audience: String,
    /// Per-kid decoding keys, populated on first use.
    keys: RwLock<HashMap<String, (DecodingKey, Algorithm)>>,
}

impl JwksResolver {
    pub fn new(
        fetcher: Arc<dyn JwksFetch>,
        expected_issuer: impl Into<String>,
        expected_audience: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            expected_issuer: expected_issuer.into(),
            expected_audience: expected_audience.into(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Get the decoding key for `kid`, fetching the JWKS document on a miss.
    ///
    /// A network failure is retried once with a fresh fetch; an unknown `kid`
    /// after a successful fetch is a terminal token failure, not retryable.
    pub async fn resolve_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        {
            let keys = self.keys.read().await;
            if let Some(entry) = keys.get(kid) {
                return Ok(entry.clone());
            }
        }

        let jwks = match self.fetcher.fetch().await {
            Ok(jwks) => jwks,
            Err(AuthError::KeyResolution(_)) => self.fetcher.fetch().await?,
            Err(e) => return Err(e),
        };

        let mut keys = self.keys.write().await;
        for jwk in &jwks.keys {
            let Some(id) = jwk.common.key_id.clone() else {
                continue;
            };
            if let Ok(entry) = jwk_to_decoding_key(jwk) {
                keys.insert(id, entry);
            }
        }

        keys.get(kid)
            .cloned()
            .ok_or(AuthError::InvalidToken("no matching key in JWKS"))
    }

    /// Verify a remote-issued token and return its claims.
    pub async fn verify_remote_token(&self, token: &str) -> Result<RemoteClaims, AuthError> {
        let header =
            decode_header(token).map_err(|_| AuthError::InvalidToken("malformed remote token"))?;

        let kid = header
            .kid
            .as_deref()
            .ok_or(AuthError::InvalidToken("missing kid"))?;

        // Remote tokens are only ever asymmetric. A symmetric header
        // algorithm here is a forgery attempt, not a configuration issue.
        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::InvalidToken("symmetric algorithm on remote path"));
        }

        let (decoding_key, algorithm) = self.resolve_key(kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_audience(&[&self.expected_audience]);

        let token_data = decode::<RemoteClaims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::InvalidToken("remote token expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("remote signature mismatch")
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    AuthError::InvalidToken("invalid issuer")
                }
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    AuthError::InvalidToken("invalid audience")
                }
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidToken("algorithm mismatch")
                }
                _ => AuthError::InvalidToken("malformed remote token"),
            }
        })?;

        Ok(token_data.claims)
    }
}

/// Convert a JWK to a DecodingKey plus its algorithm.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|_| AuthError::InvalidToken("unusable RSA key in JWKS"))?;

            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    jsonwebtoken::jwk::KeyAlgorithm::RS384 => Algorithm::RS384,
                    jsonwebtoken::jwk::KeyAlgorithm::RS512 => Algorithm::RS512,
                    _ => Algorithm::RS256,
                })
                .unwrap_or(Algorithm::RS256);

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|_| AuthError::InvalidToken("unusable EC key in JWKS"))?;

            let alg = jwk
                .common
                .key_algorithm
                .map(|a| match a {
                    jsonwebtoken::jwk::KeyAlgorithm::ES384 => Algorithm::ES384,
                    _ => Algorithm::ES256,
                })
                .unwrap_or(Algorithm::ES256);

            Ok((key, alg))
        }
        _ => Err(AuthError::InvalidToken("unsupported key type in JWKS")),
    }
}
