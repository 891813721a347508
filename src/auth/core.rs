// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authentication core: the decision logic every transport adapter calls.
//!
//! One verification attempt enters here per request or connection. The
//! credential input is resolved once into a tagged union and matched
//! exhaustively, so the whole state machine is auditable in one place:
//!
//! - remote bearer → remote verification, nothing issued
//! - local access → codec check, then the session cache decides whether the
//!   token is still *the* live one (cryptographic validity alone is not enough)
//! - local refresh → codec check, user lookup, stored-record comparison,
//!   then full rotation of both tokens
//!
//! Two concurrent rotations for one identity are last-writer-wins on the
//! persistent record; the loser's fresh pair dies on its next use. Accepted
//! and documented, not papered over (see DESIGN.md).

use std::sync::Arc;

use super::error::AuthError;
use super::jwks::JwksResolver;
use super::token::TokenCodec;
use crate::storage::{
    verify_password, AuthRecordStore, DirectoryError, RecordStoreError, SessionCache, UserDirectory,
};

/// Which trust domain authenticated the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrustDomain {
    /// Tokens issued and verified by this service.
    Local,
    /// Tokens issued by the external identity provider.
    Remote,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Result of a successful authentication attempt.
#[derive(Debug)]
pub struct AuthSession {
    pub identity: String,
    pub trust: TrustDomain,
    /// Present only when this attempt rotated credentials; the transport
    /// adapter must propagate the new pair to the client.
    pub rotation: Option<TokenPair>,
}

/// Everything a caller presented, resolved once at entry.
#[derive(Debug)]
pub enum Credentials {
    /// Remote-issued bearer token.
    Remote(String),
    /// Local cookies; at least one of the two is present.
    Local {
        access: Option<String>,
        refresh: Option<String>,
    },
    /// Nothing presented.
    None,
}

impl Credentials {
    /// Build from extracted transport values. A remote bearer wins over
    /// local cookies; local cookies with neither token collapse to `None`.
    pub fn from_parts(
        bearer: Option<String>,
        access: Option<String>,
        refresh: Option<String>,
    ) -> Self {
        if let Some(token) = bearer {
            return Credentials::Remote(token);
        }
        if access.is_none() && refresh.is_none() {
            return Credentials::None;
        }
        Credentials::Local { access, refresh }
    }
}

impl From<RecordStoreError> for AuthError {
    fn from(e: RecordStoreError) -> Self {
        AuthError::Persistence(e.to_string())
    }
}

impl From<DirectoryError> for AuthError {
    fn from(e: DirectoryError) -> Self {
        AuthError::Persistence(e.to_string())
    }
}

/// Orchestrates login, logout and the verify/rotate decision.
pub struct AuthCore {
    codec: TokenCodec,
    remote: Option<JwksResolver>,
    sessions: Arc<SessionCache>,
    records: Arc<AuthRecordStore>,
    users: Arc<dyn UserDirectory>,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl AuthCore {
    pub fn new(
        codec: TokenCodec,
        remote: Option<JwksResolver>,
        sessions: Arc<SessionCache>,
        records: Arc<AuthRecordStore>,
        users: Arc<dyn UserDirectory>,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            codec,
            remote,
            sessions,
            records,
            users,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Run the verification state machine over one credential set.
    pub async fn verify(&self, credentials: Credentials) -> Result<AuthSession, AuthError> {
        match credentials {
            Credentials::Remote(token) => self.verify_remote(&token).await,
            Credentials::None => Err(AuthError::NoCredentials),
            Credentials::Local { access, refresh } => self.verify_local(access, refresh).await,
        }
    }

    async fn verify_remote(&self, token: &str) -> Result<AuthSession, AuthError> {
        let resolver = self
            .remote
            .as_ref()
            .ok_or(AuthError::InvalidToken("remote trust domain not configured"))?;

        let claims = resolver.verify_remote_token(token).await?;
        tracing::debug!(identity = %claims.sub, "remote token verified");
        Ok(AuthSession {
            identity: claims.sub,
            trust: TrustDomain::Remote,
            rotation: None,
        })
    }

    async fn verify_local(
        &self,
        access: Option<String>,
        refresh: Option<String>,
    ) -> Result<AuthSession, AuthError> {
        // Access path: cryptographic validity AND cache agreement. The cache
        // is the authority on "still the live token" — a mismatch or miss is
        // simply not-valid and falls through to refresh, so logout/rotation
        // can kill a token that has not yet expired.
        if let Some(presented) = access.as_deref() {
            if let Ok(identity) = self.codec.verify_access(presented) {
                if self.sessions.get(&identity).as_deref() == Some(presented) {
                    return Ok(AuthSession {
                        identity,
                        trust: TrustDomain::Local,
                        rotation: None,
                    });
                }
                tracing::debug!(identity = %identity, "access token not live, trying refresh");
            }
        }

        let refresh = refresh.ok_or(AuthError::AuthorizationFailed)?;
        let identity = self.codec.verify_refresh(&refresh)?;

        if self.users.find_by_identity(&identity).await?.is_none() {
            return Err(AuthError::UserNotFound);
        }

        let record = self
            .records
            .get(&identity)?
            .ok_or(AuthError::InvalidRefreshToken)?;
        if record.refresh_token != refresh {
            return Err(AuthError::InvalidRefreshToken);
        }

        // Rotation: the only path that produces new credentials.
        let pair = self.issue_session(&identity).await?;
        tracing::debug!(identity = %identity, "refresh verified, tokens rotated");
        Ok(AuthSession {
            identity,
            trust: TrustDomain::Local,
            rotation: Some(pair),
        })
    }

    /// Password login. The failure reason (unknown identity vs. wrong
    /// password) is deliberately not distinguished.
    pub async fn login(&self, identity: &str, password: &str) -> Result<AuthSession, AuthError> {
        let user = self
            .users
            .find_by_identity(identity)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::Unauthorized);
        }

        let pair = self.issue_session(identity).await?;
        tracing::debug!(identity = %identity, "login succeeded");
        Ok(AuthSession {
            identity: identity.to_string(),
            trust: TrustDomain::Local,
            rotation: Some(pair),
        })
    }

    /// Issue a fresh pair for `identity` and write both stores through.
    ///
    /// Store failures surface as [`AuthError::Persistence`]: the caller's
    /// credentials were good, the system failed to record the new ones.
    pub async fn issue_session(&self, identity: &str) -> Result<TokenPair, AuthError> {
        let access = self.codec.issue_access(identity, self.access_ttl_seconds)?;
        let refresh = self.codec.issue_refresh(identity, self.refresh_ttl_seconds)?;

        self.sessions
            .put(identity, &access, self.access_ttl_seconds.max(0) as u64);
        self.records.upsert(identity, &refresh)?;

        Ok(TokenPair { access, refresh })
    }

    /// Drop the live session and persisted record. Idempotent: logging out
    /// an identity with no session or record succeeds.
    pub async fn logout(&self, identity: &str) -> Result<(), AuthError> {
        self.sessions.delete(identity);
        self.records.delete(identity)?;
        tracing::debug!(identity = %identity, "logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::auth::jwks::tests::{CountingFetch, TestIdp, TEST_AUDIENCE, TEST_ISSUER};
    use crate::storage::{hash_password, DirectoryResult, NewUser, Role, UserRecord};

    const ACCESS_SECRET: &str = "access-secret-for-core-tests";
    const REFRESH_SECRET: &str = "refresh-secret-for-core-tests";

    /// In-memory directory with a lookup counter.
    struct MemoryDirectory {
        users: Mutex<HashMap<String, UserRecord>>,
        lookups: AtomicUsize,
    }

    impl MemoryDirectory {
        fn new() -> Self {
            Self {
                users: Mutex::new(HashMap::new()),
                lookups: AtomicUsize::new(0),
            }
        }

        fn with_user(self, identity: &str, password: &str) -> Self {
            let record = UserRecord {
                identity: identity.to_string(),
                password_hash: hash_password(password).unwrap(),
                role: Role::Member,
                created_at: chrono::Utc::now(),
            };
            self.users
                .lock()
                .unwrap()
                .insert(identity.to_string(), record);
            self
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryDirectory {
        async fn find_by_identity(&self, identity: &str) -> DirectoryResult<Option<UserRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.users.lock().unwrap().get(identity).cloned())
        }

        async fn find_by_identity_with_role(
            &self,
            identity: &str,
        ) -> DirectoryResult<Option<UserRecord>> {
            self.find_by_identity(identity).await
        }

        async fn create(&self, identity: &str, profile: NewUser) -> DirectoryResult<UserRecord> {
            let record = UserRecord {
                identity: identity.to_string(),
                password_hash: hash_password(&profile.password)?,
                role: profile.role,
                created_at: chrono::Utc::now(),
            };
            self.users
                .lock()
                .unwrap()
                .insert(identity.to_string(), record.clone());
            Ok(record)
        }
    }

    /// Directory whose lookups always fail, to exercise the server-side
    /// failure path.
    struct BrokenDirectory;

    #[async_trait]
    impl UserDirectory for BrokenDirectory {
        async fn find_by_identity(&self, _identity: &str) -> DirectoryResult<Option<UserRecord>> {
            Err(DirectoryError::Hash)
        }

        async fn find_by_identity_with_role(
            &self,
            _identity: &str,
        ) -> DirectoryResult<Option<UserRecord>> {
            Err(DirectoryError::Hash)
        }

        async fn create(&self, _identity: &str, _profile: NewUser) -> DirectoryResult<UserRecord> {
            Err(DirectoryError::Hash)
        }
    }

    struct Fixture {
        core: AuthCore,
        sessions: Arc<SessionCache>,
        records: Arc<AuthRecordStore>,
        directory: Arc<MemoryDirectory>,
        _dir: TempDir,
    }

    fn fixture_with_remote(remote: Option<JwksResolver>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let sessions = Arc::new(SessionCache::new(64));
        let records = Arc::new(AuthRecordStore::open(&dir.path().join("records.redb")).unwrap());
        let directory = Arc::new(MemoryDirectory::new().with_user("u1@example.com", "pw-u1"));

        let core = AuthCore::new(
            TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET),
            remote,
            sessions.clone(),
            records.clone(),
            directory.clone(),
            900,
            604_800,
        );

        Fixture {
            core,
            sessions,
            records,
            directory,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_remote(None)
    }

    /// A codec sharing the fixture's secrets, for minting tokens the core
    /// did not issue (expired, foreign, etc.).
    fn outside_codec() -> TokenCodec {
        TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET)
    }

    #[tokio::test]
    async fn scenario_a_login_then_verify_without_rotation() {
        let fx = fixture();
        let session = fx.core.login("u1@example.com", "pw-u1").await.unwrap();
        let pair = session.rotation.expect("login issues a pair");

        let verdict = fx
            .core
            .verify(Credentials::from_parts(None, Some(pair.access), None))
            .await
            .unwrap();

        assert_eq!(verdict.identity, "u1@example.com");
        assert_eq!(verdict.trust, TrustDomain::Local);
        assert!(verdict.rotation.is_none(), "access path issues nothing");
    }

    #[tokio::test]
    async fn scenario_b_expired_access_valid_refresh_rotates() {
        let fx = fixture();
        let pair = fx
            .core
            .login("u1@example.com", "pw-u1")
            .await
            .unwrap()
            .rotation
            .unwrap();

        let expired_access = outside_codec().issue_access("u1@example.com", -60).unwrap();

        let verdict = fx
            .core
            .verify(Credentials::from_parts(
                None,
                Some(expired_access),
                Some(pair.refresh.clone()),
            ))
            .await
            .unwrap();
        let new_pair = verdict.rotation.expect("refresh path rotates");
        assert_ne!(new_pair.refresh, pair.refresh);

        // Old access token is no longer the live one.
        let old_access = fx
            .core
            .verify(Credentials::from_parts(None, Some(pair.access), None))
            .await;
        assert!(old_access.is_err());

        // Rotation invariant: the old refresh token is fully replaced.
        let old_refresh = fx
            .core
            .verify(Credentials::from_parts(None, None, Some(pair.refresh)))
            .await;
        assert!(matches!(old_refresh, Err(AuthError::InvalidRefreshToken)));

        // And the new pair works.
        let fresh = fx
            .core
            .verify(Credentials::from_parts(None, Some(new_pair.access), None))
            .await
            .unwrap();
        assert_eq!(fresh.identity, "u1@example.com");
    }

    #[tokio::test]
    async fn scenario_c_no_credentials_touches_no_store() {
        let fx = fixture();
        let err = fx
            .core
            .verify(Credentials::from_parts(None, None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoCredentials));
        assert_eq!(fx.directory.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(fx.records.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn scenario_d_remote_token_verifies_with_one_fetch() {
        let idp = TestIdp::generate();
        let fetch = Arc::new(CountingFetch::new(idp.jwks.clone()));
        let resolver = JwksResolver::new(fetch.clone(), TEST_ISSUER, TEST_AUDIENCE);
        let fx = fixture_with_remote(Some(resolver));

        let first = fx
            .core
            .verify(Credentials::from_parts(
                Some(idp.sign("remote-1", 3600)),
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(first.identity, "remote-1");
        assert_eq!(first.trust, TrustDomain::Remote);
        assert!(first.rotation.is_none());

        fx.core
            .verify(Credentials::from_parts(
                Some(idp.sign("remote-2", 3600)),
                None,
                None,
            ))
            .await
            .unwrap();

        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_authority_valid_token_without_cache_entry_is_rejected() {
        let fx = fixture();
        let pair = fx
            .core
            .login("u1@example.com", "pw-u1")
            .await
            .unwrap()
            .rotation
            .unwrap();

        // The token is cryptographically valid, but the cache no longer
        // agrees that it is the live one.
        fx.sessions.delete("u1@example.com");

        let err = fx
            .core
            .verify(Credentials::from_parts(None, Some(pair.access), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationFailed));
    }

    #[tokio::test]
    async fn cache_mismatch_falls_through_to_refresh() {
        let fx = fixture();
        let pair = fx
            .core
            .login("u1@example.com", "pw-u1")
            .await
            .unwrap()
            .rotation
            .unwrap();

        // A second login replaces the live access token; the first one is
        // still unexpired but must now rotate via its refresh token.
        fx.core.login("u1@example.com", "pw-u1").await.unwrap();

        let verdict = fx
            .core
            .verify(Credentials::from_parts(None, Some(pair.access), None))
            .await;
        assert!(verdict.is_err(), "stale access without refresh is rejected");
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let fx = fixture();
        fx.core.login("u1@example.com", "pw-u1").await.unwrap();

        fx.core.logout("u1@example.com").await.unwrap();
        fx.core.logout("u1@example.com").await.unwrap();

        assert!(fx.sessions.get("u1@example.com").is_none());
        assert!(fx.records.get("u1@example.com").unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_invalidates_live_access_token() {
        let fx = fixture();
        let pair = fx
            .core
            .login("u1@example.com", "pw-u1")
            .await
            .unwrap()
            .rotation
            .unwrap();

        fx.core.logout("u1@example.com").await.unwrap();

        let access = fx
            .core
            .verify(Credentials::from_parts(None, Some(pair.access), None))
            .await;
        assert!(access.is_err());

        let refresh = fx
            .core
            .verify(Credentials::from_parts(None, None, Some(pair.refresh)))
            .await;
        assert!(matches!(refresh, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let fx = fixture();

        let unknown = fx.core.login("nobody@example.com", "pw").await.unwrap_err();
        let wrong_pw = fx.core.login("u1@example.com", "wrong").await.unwrap_err();

        assert!(matches!(unknown, AuthError::Unauthorized));
        assert!(matches!(wrong_pw, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn refresh_for_unknown_user_is_rejected() {
        let fx = fixture();
        let refresh = outside_codec()
            .issue_refresh("ghost@example.com", 3600)
            .unwrap();

        let err = fx
            .core
            .verify(Credentials::from_parts(None, None, Some(refresh)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn forged_refresh_with_no_record_is_rejected() {
        let fx = fixture();
        // Known user, validly signed refresh token, but no persisted record.
        let refresh = outside_codec()
            .issue_refresh("u1@example.com", 3600)
            .unwrap();

        let err = fx
            .core
            .verify(Credentials::from_parts(None, None, Some(refresh)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn directory_failure_is_a_server_error_not_a_credential_error() {
        let fx = fixture();
        let pair = fx
            .core
            .login("u1@example.com", "pw-u1")
            .await
            .unwrap()
            .rotation
            .unwrap();

        // Same stores and secrets, but the directory is down.
        let broken = AuthCore::new(
            outside_codec(),
            None,
            fx.sessions.clone(),
            fx.records.clone(),
            Arc::new(BrokenDirectory),
            900,
            604_800,
        );

        let err = broken
            .verify(Credentials::from_parts(None, None, Some(pair.refresh)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
        assert!(!err.is_credential_failure());
    }

    #[tokio::test]
    async fn remote_bearer_without_configured_idp_is_rejected() {
        let fx = fixture();
        let err = fx
            .core
            .verify(Credentials::from_parts(
                Some("some.remote.token".to_string()),
                None,
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn credentials_resolution_is_exhaustive() {
        assert!(matches!(
            Credentials::from_parts(Some("t".into()), Some("a".into()), Some("r".into())),
            Credentials::Remote(_)
        ));
        assert!(matches!(
            Credentials::from_parts(None, Some("a".into()), None),
            Credentials::Local { .. }
        ));
        assert!(matches!(
            Credentials::from_parts(None, None, Some("r".into())),
            Credentials::Local { .. }
        ));
        assert!(matches!(
            Credentials::from_parts(None, None, None),
            Credentials::None
        ));
    }
}
