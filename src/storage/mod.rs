// SPDX-License-Identifier: AGPL-3.0-or-later

//! Storage tier: volatile session cache, durable auth records, user directory.

pub mod records;
pub mod session_cache;
pub mod users;

pub use records::{AuthRecord, AuthRecordStore, RecordStoreError};
pub use session_cache::SessionCache;
pub use users::{
    hash_password, verify_password, DirectoryError, DirectoryResult, NewUser, RedbUserDirectory,
    Role, UserDirectory, UserRecord,
};
