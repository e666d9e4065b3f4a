// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded points database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `tenants`: tenant_id → serialized Tenant
//! - `tenant_domains`: normalized domain → tenant_id
//! - `accounts`: `tenant|account` (16+16 bytes) → serialized Account
//! - `account_identities`: `tenant|provider|username` → account_id
//! - `pricing`: `tenant|resource` → serialized PricingEntry
//! - `ledger`: entry id (u64, commit order) → serialized LedgerEntry
//! - `account_ledger`: `tenant|account|entry_id_be` → entry id
//! - `tenant_ledger`: `tenant|entry_id_be` → entry id
//! - `meta`: key → u64 (ledger sequence, last ledger timestamp)
//!
//! redb allows a single write transaction at a time, so every mutation of a
//! balance happens under an exclusive writer together with its ledger append.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};

use super::tables::Tables;

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

pub(crate) const TENANT_DOMAINS: TableDefinition<&str, &str> =
    TableDefinition::new("tenant_domains");

pub(crate) const ACCOUNTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("accounts");

pub(crate) const ACCOUNT_IDENTITIES: TableDefinition<&[u8], &str> =
    TableDefinition::new("account_identities");

pub(crate) const PRICING: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pricing");

pub(crate) const LEDGER: TableDefinition<u64, &[u8]> = TableDefinition::new("ledger");

/// Key format: `tenant(16) | account(16) | entry_id_be(8)`.
pub(crate) const ACCOUNT_LEDGER: TableDefinition<&[u8], u64> =
    TableDefinition::new("account_ledger");

/// Key format: `tenant(16) | entry_id_be(8)`.
pub(crate) const TENANT_LEDGER: TableDefinition<&[u8], u64> =
    TableDefinition::new("tenant_ledger");

pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Last assigned ledger entry id.
pub(crate) const META_LEDGER_SEQ: &str = "ledger_seq";

/// Microsecond timestamp of the most recent ledger entry.
pub(crate) const META_LEDGER_LAST_MICROS: &str = "ledger_last_micros";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the failure came from another writer poisoning the store lock
    /// rather than from the data itself.
    pub fn is_contention(&self) -> bool {
        use redb::StorageError::LockPoisoned;
        matches!(
            self,
            StoreError::Storage(LockPoisoned(_))
                | StoreError::Transaction(redb::TransactionError::Storage(LockPoisoned(_)))
                | StoreError::Commit(redb::CommitError::Storage(LockPoisoned(_)))
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// PointStore
// =============================================================================

/// Handle to the points database. Shared as `Arc<PointStore>`.
pub struct PointStore {
    db: Database,
}

impl PointStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TENANTS)?;
            let _ = write_txn.open_table(TENANT_DOMAINS)?;
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(ACCOUNT_IDENTITIES)?;
            let _ = write_txn.open_table(PRICING)?;
            let _ = write_txn.open_table(LEDGER)?;
            let _ = write_txn.open_table(ACCOUNT_LEDGER)?;
            let _ = write_txn.open_table(TENANT_LEDGER)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Start a write transaction. Blocks while another writer is active.
    pub fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Start a snapshot read transaction.
    pub fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Run `f` against a consistent snapshot of every table.
    pub fn read<T, E>(&self, f: impl FnOnce(&Tables<super::tables::ReadOnly>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let txn = self.begin_read()?;
        let tables = Tables::read(&txn)?;
        f(&tables)
    }

    /// Run `f` in its own write transaction and commit when it succeeds.
    ///
    /// Errors returned by `f` abort the transaction.
    pub fn write<T, E>(
        &self,
        f: impl for<'t> FnOnce(&mut Tables<super::tables::ReadWrite<'t>>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let txn = self.begin_write()?;
        let value = {
            let mut tables = Tables::write(&txn)?;
            f(&mut tables)?
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Cheap liveness probe for readiness checks.
    pub fn ping(&self) -> StoreResult<()> {
        let txn = self.begin_read()?;
        let _ = txn.open_table(META)?;
        Ok(())
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Concatenate key segments into one composite byte key.
pub(crate) fn composite_key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut key = Vec::with_capacity(len);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (prefix is all `0xFF`).
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Decode the trailing big-endian u64 of a composite key.
pub(crate) fn trailing_u64(key: &[u8]) -> StoreResult<u64> {
    if key.len() < 8 {
        return Err(StoreError::Corrupt(format!(
            "index key of {} bytes has no sequence suffix",
            key.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (PointStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn open_creates_tables() {
        let (store, _dir) = temp_store();
        store.ping().unwrap();
        let txn = store.begin_read().unwrap();
        assert!(txn.open_table(LEDGER).is_ok());
        assert!(txn.open_table(ACCOUNT_IDENTITIES).is_ok());
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("points.redb");
        {
            let store = PointStore::open(&path).unwrap();
            let txn = store.begin_write().unwrap();
            {
                let mut meta = txn.open_table(META).unwrap();
                meta.insert(META_LEDGER_SEQ, 7u64).unwrap();
            }
            txn.commit().unwrap();
        }
        let store = PointStore::open(&path).unwrap();
        let txn = store.begin_read().unwrap();
        let meta = txn.open_table(META).unwrap();
        use redb::ReadableTable;
        assert_eq!(meta.get(META_LEDGER_SEQ).unwrap().unwrap().value(), 7);
    }

    #[test]
    fn uncommitted_write_is_rolled_back() {
        let (store, _dir) = temp_store();
        {
            let txn = store.begin_write().unwrap();
            {
                let mut meta = txn.open_table(META).unwrap();
                meta.insert(META_LEDGER_SEQ, 99u64).unwrap();
            }
            // dropped without commit
        }
        let txn = store.begin_read().unwrap();
        let meta = txn.open_table(META).unwrap();
        use redb::ReadableTable;
        assert!(meta.get(META_LEDGER_SEQ).unwrap().is_none());
    }

    #[test]
    fn prefix_upper_bound_increments_last_byte() {
        assert_eq!(prefix_upper_bound(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_upper_bound(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_upper_bound(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn trailing_u64_reads_suffix() {
        let key = composite_key(&[b"tenant", &42u64.to_be_bytes()]);
        assert_eq!(trailing_u64(&key).unwrap(), 42);
        assert!(trailing_u64(&[1, 2]).is_err());
    }
}
