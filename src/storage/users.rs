// SPDX-License-Identifier: AGPL-3.0-or-later

//! User directory: the collaborator the auth core resolves identities against.
//!
//! The core only needs the three operations on [`UserDirectory`]; everything
//! else about user management lives outside this service. A redb-backed
//! implementation is provided so the binary runs standalone.
//!
//! ## Table Layout
//!
//! - `users`: identity → serialized UserRecord (JSON bytes)

use std::path::Path;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

/// Primary table: identity → serialized UserRecord (JSON bytes).
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("password hashing failed")]
    Hash,

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

/// A user as stored in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub identity: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Profile supplied when creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub password: String,
    pub role: Role,
}

/// The operations the auth core requires from user management.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by identity. Case-sensitive.
    async fn find_by_identity(&self, identity: &str) -> DirectoryResult<Option<UserRecord>>;

    /// Look up a user by identity, role included.
    async fn find_by_identity_with_role(
        &self,
        identity: &str,
    ) -> DirectoryResult<Option<UserRecord>>;

    /// Create a user. Fails if the identity is already taken.
    async fn create(&self, identity: &str, profile: NewUser) -> DirectoryResult<UserRecord>;
}

/// Hash a password into a PHC string (argon2id).
pub fn hash_password(password: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| DirectoryError::Hash)
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// redb-backed user directory.
pub struct RedbUserDirectory {
    db: Database,
}

impl RedbUserDirectory {
    /// Open (or create) the user database at the given path.
    pub fn open(path: &Path) -> DirectoryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn lookup(&self, identity: &str) -> DirectoryResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(identity)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserDirectory for RedbUserDirectory {
    async fn find_by_identity(&self, identity: &str) -> DirectoryResult<Option<UserRecord>> {
        self.lookup(identity)
    }

    async fn find_by_identity_with_role(
        &self,
        identity: &str,
    ) -> DirectoryResult<Option<UserRecord>> {
        // Single-table backend: the role always travels with the record.
        self.lookup(identity)
    }

    async fn create(&self, identity: &str, profile: NewUser) -> DirectoryResult<UserRecord> {
        let record = UserRecord {
            identity: identity.to_string(),
            password_hash: hash_password(&profile.password)?,
            role: profile.role,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            if table.get(identity)?.is_some() {
                return Err(DirectoryError::AlreadyExists(identity.to_string()));
            }
            table.insert(identity, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_directory() -> (RedbUserDirectory, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let users = RedbUserDirectory::open(&dir.path().join("users.redb")).expect("open");
        (users, dir)
    }

    #[tokio::test]
    async fn create_then_find() {
        let (users, _dir) = open_directory();
        users
            .create(
                "u1@example.com",
                NewUser {
                    password: "hunter2hunter2".to_string(),
                    role: Role::Member,
                },
            )
            .await
            .unwrap();

        let record = users.find_by_identity("u1@example.com").await.unwrap().unwrap();
        assert_eq!(record.identity, "u1@example.com");
        assert_eq!(record.role, Role::Member);
        // Never store the raw password.
        assert_ne!(record.password_hash, "hunter2hunter2");
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let (users, _dir) = open_directory();
        let profile = NewUser {
            password: "pw-one".to_string(),
            role: Role::Member,
        };
        users.create("u1", profile.clone()).await.unwrap();

        let err = users.create("u1", profile).await.unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn find_with_role_returns_role() {
        let (users, _dir) = open_directory();
        users
            .create(
                "admin@example.com",
                NewUser {
                    password: "pw".to_string(),
                    role: Role::Admin,
                },
            )
            .await
            .unwrap();

        let record = users
            .find_by_identity_with_role("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.role, Role::Admin);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
