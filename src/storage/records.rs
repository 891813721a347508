// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent auth records backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `auth_records`: identity → serialized AuthRecord (JSON bytes)
//!
//! One record per identity, updated in place on every rotation. redb
//! serializes writers inside the process, so the upsert's read-modify-write
//! is atomic here; two processes sharing a store would still be
//! last-writer-wins, which is the documented rotation race.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};

/// Primary table: identity → serialized AuthRecord (JSON bytes).
const AUTH_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("auth_records");

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
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

pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

/// The persisted tuple for one identity's refresh credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub identity: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable identity → refresh-token store.
pub struct AuthRecordStore {
    db: Database,
}

impl AuthRecordStore {
    /// Open (or create) the record database at the given path.
    pub fn open(path: &Path) -> RecordStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(AUTH_RECORDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Create or update the record for `identity` in one write transaction.
    ///
    /// An existing record keeps its `created_at`; the token and `updated_at`
    /// are replaced. At most one record per identity ever exists.
    pub fn upsert(&self, identity: &str, refresh_token: &str) -> RecordStoreResult<()> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTH_RECORDS)?;

            let created_at = match table.get(identity)? {
                Some(value) => serde_json::from_slice::<AuthRecord>(value.value())?.created_at,
                None => now,
            };

            let record = AuthRecord {
                identity: identity.to_string(),
                refresh_token: refresh_token.to_string(),
                created_at,
                updated_at: now,
            };
            let json = serde_json::to_vec(&record)?;
            table.insert(identity, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up the record for `identity`.
    pub fn get(&self, identity: &str) -> RecordStoreResult<Option<AuthRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTH_RECORDS)?;
        match table.get(identity)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Delete the record for `identity`. Absence is not an error.
    pub fn delete(&self, identity: &str) -> RecordStoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTH_RECORDS)?;
            table.remove(identity)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Number of stored records (test and diagnostics helper).
    pub fn len(&self) -> RecordStoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTH_RECORDS)?;
        Ok(table.len()?)
    }
}
