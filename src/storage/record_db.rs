// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded verification record database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `verification_records`: lowercase client address → serialized VerificationRecord
//! - `gateway_state`: key → value (watcher checkpoint)
//!
//! Every mutation is a read-modify-write inside one redb write transaction, so
//! concurrent upserts for the same client never lose an update.

use std::convert::Infallible;
use std::path::Path;

use alloy::primitives::Address;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{PresenceStatus, VerificationRecord};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: client address → serialized VerificationRecord (JSON bytes).
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("verification_records");

/// Bookkeeping: key → value bytes (e.g., "last_block" → u64 big-endian).
const GATEWAY_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("gateway_state");

/// Key of the last block processed by the event watcher.
pub const LAST_BLOCK_KEY: &str = "last_block";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
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

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn record_key(client: &Address) -> String {
    alloy::hex::encode_prefixed(client)
}

// =============================================================================
// RecordDatabase
// =============================================================================

/// Embedded ACID store of verification records.
pub struct RecordDatabase {
    db: Database,
}

impl RecordDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(GATEWAY_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Verification records
    // =========================================================================

    /// Look up the record of a client.
    pub fn get(&self, client: &Address) -> StoreResult<Option<VerificationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;
        match table.get(record_key(client).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Apply `mutate` to the client's record (a default one if absent) and store it.
    ///
    /// Returns the record as written.
    pub fn upsert<F>(&self, client: &Address, mutate: F) -> StoreResult<VerificationRecord>
    where
        F: FnOnce(&mut VerificationRecord),
    {
        let written = self.try_upsert(client, |record| {
            mutate(record);
            Ok::<(), Infallible>(())
        })?;
        match written {
            Ok(record) => Ok(record),
            Err(never) => match never {},
        }
    }

    /// Read-modify-write in one write transaction, letting `mutate` refuse.
    ///
    /// On refusal the transaction is aborted, the stored record is left as it
    /// was and the refusal is returned in the inner `Err`.
    pub fn try_upsert<F, E>(
        &self,
        client: &Address,
        mutate: F,
    ) -> StoreResult<Result<VerificationRecord, E>>
    where
        F: FnOnce(&mut VerificationRecord) -> Result<(), E>,
    {
        let key = record_key(client);
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(RECORDS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = table.get(key.as_str())?.map(|v| v.value().to_vec());
            let mut record = match existing_bytes {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => VerificationRecord::default(),
            };

            match mutate(&mut record) {
                Ok(()) => {
                    record.updated_at = chrono::Utc::now();
                    let json = serde_json::to_vec(&record)?;
                    table.insert(key.as_str(), json.as_slice())?;
                    Ok(record)
                }
                Err(refused) => Err(refused),
            }
        };

        if outcome.is_ok() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }

    /// All records currently in `status`.
    pub fn list_by_status(
        &self,
        status: PresenceStatus,
    ) -> StoreResult<Vec<(Address, VerificationRecord)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;

        let mut out = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record: VerificationRecord = serde_json::from_slice(value.value())?;
            if record.verify_presence_status != status {
                continue;
            }
            match key.value().parse::<Address>() {
                Ok(client) => out.push((client, record)),
                Err(e) => {
                    tracing::warn!(key = key.value(), error = %e, "Skipping record with bad key");
                }
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Watcher checkpoint
    // =========================================================================

    /// Last block processed under `key`, 0 if never set.
    pub fn get_last_block(&self, key: &str) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GATEWAY_STATE)?;
        let block = table
            .get(key)?
            .and_then(|v| <[u8; 8]>::try_from(v.value()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0);
        Ok(block)
    }

    /// Persist the last processed block under `key`.
    pub fn set_last_block(&self, key: &str, block: u64) -> StoreResult<()> {
        let bytes = block.to_be_bytes();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(GATEWAY_STATE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn temp_db() -> (RecordDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = RecordDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn upsert_creates_then_mutates() {
        let (db, _dir) = temp_db();
        let client = Address::repeat_byte(0xAB);
        assert!(db.get(&client).unwrap().is_none());

        db.upsert(&client, |r| r.contract_address = Some(Address::repeat_byte(1)))
            .unwrap();
        let written = db
            .upsert(&client, |r| r.begin_verification(B256::repeat_byte(2), None))
            .unwrap();

        let stored = db.get(&client).unwrap().unwrap();
        assert_eq!(stored, written);
        assert_eq!(stored.contract_address, Some(Address::repeat_byte(1)));
        assert_eq!(stored.verify_presence_status, PresenceStatus::Pending);
    }

    #[test]
    fn keys_are_case_insensitive_addresses() {
        let (db, _dir) = temp_db();
        let client: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        db.upsert(&client, |_| {}).unwrap();

        let lower: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert!(db.get(&lower).unwrap().is_some());
    }

    #[test]
    fn list_by_status_filters() {
        let (db, _dir) = temp_db();
        for i in 1..=3u8 {
            db.upsert(&Address::repeat_byte(i), |r| {
                r.begin_verification(B256::repeat_byte(i), None)
            })
            .unwrap();
        }
        db.upsert(&Address::repeat_byte(2), |r| {
            r.finish_verification(PresenceStatus::Success)
        })
        .unwrap();

        let mut pending: Vec<Address> = db
            .list_by_status(PresenceStatus::Pending)
            .unwrap()
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        pending.sort();
        assert_eq!(pending, vec![Address::repeat_byte(1), Address::repeat_byte(3)]);
    }

    #[test]
    fn refused_upsert_leaves_record_untouched() {
        let (db, _dir) = temp_db();
        let client = Address::repeat_byte(0xAB);
        db.upsert(&client, |r| r.begin_verification(B256::repeat_byte(1), None))
            .unwrap();

        let refused = db
            .try_upsert(&client, |r| {
                r.verify_presence_status = PresenceStatus::Failed;
                Err("busy")
            })
            .unwrap();
        assert_eq!(refused, Err("busy"));
        assert_eq!(
            db.get(&client).unwrap().unwrap().verify_presence_status,
            PresenceStatus::Pending
        );

        // Nothing is created for an unknown client either.
        let other = Address::repeat_byte(0xCD);
        let _ = db.try_upsert(&other, |_| Err::<(), _>("no")).unwrap();
        assert!(db.get(&other).unwrap().is_none());
    }

    #[test]
    fn last_block_checkpoint() {
        let (db, _dir) = temp_db();
        assert_eq!(db.get_last_block(LAST_BLOCK_KEY).unwrap(), 0);

        db.set_last_block(LAST_BLOCK_KEY, 99_999).unwrap();
        assert_eq!(db.get_last_block(LAST_BLOCK_KEY).unwrap(), 99_999);
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.redb");
        let client = Address::repeat_byte(7);
        {
            let db = RecordDatabase::open(&path).unwrap();
            db.upsert(&client, |r| r.authority = Some(Address::repeat_byte(8)))
                .unwrap();
        }
        let db = RecordDatabase::open(&path).unwrap();
        assert_eq!(
            db.get(&client).unwrap().unwrap().authority,
            Some(Address::repeat_byte(8))
        );
    }
}
