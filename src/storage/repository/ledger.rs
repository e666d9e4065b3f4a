// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only point ledger.
//!
//! Entries are numbered from a persistent sequence inside the write
//! transaction that applies the balance change, so entry order is commit
//! order. Timestamps are forced to be strictly increasing for the same reason.
//! There is no update or delete path.

use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::super::database::{
    composite_key, prefix_upper_bound, trailing_u64, StoreError, StoreResult,
    META_LEDGER_LAST_MICROS, META_LEDGER_SEQ,
};
use super::super::tables::{decode, Access, ReadWrite, Tables};
use crate::models::{AccountId, LedgerAction, LedgerEntry, TenantId};

/// Ledger entry before it has been assigned an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub delta: i64,
    pub action: LedgerAction,
    pub detail: String,
    pub resource: Option<String>,
    pub balance_after: i64,
}

/// Result of replaying an account's ledger in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReplay {
    pub sum: i64,
    pub entries: u64,
}

fn account_prefix(tenant_id: &TenantId, account_id: &AccountId) -> Vec<u8> {
    composite_key(&[tenant_id.0.as_bytes(), account_id.0.as_bytes()])
}

impl<A: Access> Tables<A> {
    pub(crate) fn meta_value(&self, key: &str) -> StoreResult<u64> {
        Ok(self.meta.get(key)?.map(|v| v.value()).unwrap_or(0))
    }

    pub fn ledger_entry(&self, id: u64) -> StoreResult<Option<LedgerEntry>> {
        match self.ledger.get(id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Newest-first entries of one account.
    pub fn account_history(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
        limit: usize,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let prefix = account_prefix(tenant_id, account_id);
        self.newest_first(&self.account_ledger, &prefix, limit)
    }

    /// Newest-first entries of a whole tenant.
    pub fn tenant_history(&self, tenant_id: &TenantId, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        self.newest_first(&self.tenant_ledger, tenant_id.0.as_bytes(), limit)
    }

    /// Replay an account's ledger oldest-first and sum the deltas.
    pub fn replay_account_ledger(
        &self,
        tenant_id: &TenantId,
        account_id: &AccountId,
    ) -> StoreResult<LedgerReplay> {
        let prefix = account_prefix(tenant_id, account_id);
        let range = match prefix_upper_bound(&prefix) {
            Some(end) => self.account_ledger.range(prefix.as_slice()..end.as_slice())?,
            None => self.account_ledger.range(prefix.as_slice()..)?,
        };

        let mut replay = LedgerReplay { sum: 0, entries: 0 };
        for item in range {
            let (_, id) = item?;
            let entry = self.require_entry(id.value())?;
            replay.sum = replay.sum.checked_add(entry.delta).ok_or_else(|| {
                StoreError::Corrupt(format!("ledger sum overflow for account {account_id}"))
            })?;
            replay.entries += 1;
        }
        Ok(replay)
    }

    fn newest_first(
        &self,
        index: &A::Table<&'static [u8], u64>,
        prefix: &[u8],
        limit: usize,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let range = match prefix_upper_bound(prefix) {
            Some(end) => index.range(prefix..end.as_slice())?,
            None => index.range(prefix..)?,
        };

        let mut entries = Vec::with_capacity(limit.min(64));
        for item in range.rev().take(limit) {
            let (key, id) = item?;
            let id = id.value();
            if trailing_u64(key.value())? != id {
                return Err(StoreError::Corrupt(format!("ledger index mismatch for entry {id}")));
            }
            entries.push(self.require_entry(id)?);
        }
        Ok(entries)
    }

    fn require_entry(&self, id: u64) -> StoreResult<LedgerEntry> {
        self.ledger_entry(id)?
            .ok_or_else(|| StoreError::Corrupt(format!("ledger index points to missing entry {id}")))
    }
}

impl Tables<ReadWrite<'_>> {
    /// Append an entry, assigning the next id and a timestamp later than
    /// every previous entry.
    pub fn append_ledger(&mut self, new: NewLedgerEntry, now: DateTime<Utc>) -> StoreResult<LedgerEntry> {
        let id = self.meta_value(META_LEDGER_SEQ)? + 1;
        let last_micros = self.meta_value(META_LEDGER_LAST_MICROS)?;
        let now_micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let micros = now_micros.max(last_micros + 1);
        let created_at = i64::try_from(micros)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .ok_or_else(|| StoreError::Corrupt(format!("ledger timestamp out of range: {micros}")))?;

        let entry = LedgerEntry {
            id,
            tenant_id: new.tenant_id,
            account_id: new.account_id,
            delta: new.delta,
            action: new.action,
            detail: new.detail,
            resource: new.resource,
            balance_after: new.balance_after,
            created_at,
        };

        let json = serde_json::to_vec(&entry)?;
        self.ledger.insert(id, json.as_slice())?;

        let seq = id.to_be_bytes();
        let account_key = composite_key(&[
            entry.tenant_id.0.as_bytes(),
            entry.account_id.0.as_bytes(),
            &seq,
        ]);
        self.account_ledger.insert(account_key.as_slice(), id)?;
        let tenant_key = composite_key(&[entry.tenant_id.0.as_bytes(), &seq]);
        self.tenant_ledger.insert(tenant_key.as_slice(), id)?;

        self.meta.insert(META_LEDGER_SEQ, id)?;
        self.meta.insert(META_LEDGER_LAST_MICROS, micros)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PointStore;
    use chrono::Duration;
    use tempfile::TempDir;

    fn temp_store() -> (PointStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        (store, dir)
    }

    fn new_entry(tenant_id: TenantId, account_id: AccountId, delta: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            tenant_id,
            account_id,
            delta,
            action: LedgerAction::AdminGrant,
            detail: format!("delta {delta}"),
            resource: None,
            balance_after: 0,
        }
    }

    #[test]
    fn ids_and_timestamps_are_strictly_increasing() {
        let (store, _dir) = temp_store();
        let tenant = TenantId::new();
        let account = AccountId::new();
        let now = Utc::now();

        let first = store
            .write(|t| t.append_ledger(new_entry(tenant, account, 5), now))
            .unwrap();
        // Clock going backwards must not reorder entries.
        let second = store
            .write(|t| t.append_ledger(new_entry(tenant, account, 7), now - Duration::seconds(30)))
            .unwrap();

        assert_eq!(first.id + 1, second.id);
        assert!(second.created_at > first.created_at);
    }

    #[test]
    fn account_ledger_is_newest_first_and_limited() {
        let (store, _dir) = temp_store();
        let tenant = TenantId::new();
        let account = AccountId::new();
        let other = AccountId::new();
        for delta in 1..=5 {
            store
                .write(|t| t.append_ledger(new_entry(tenant, account, delta), Utc::now()))
                .unwrap();
            store
                .write(|t| t.append_ledger(new_entry(tenant, other, 100), Utc::now()))
                .unwrap();
        }

        let page = store.read(|t| t.account_history(&tenant, &account, 3)).unwrap();
        let deltas: Vec<i64> = page.iter().map(|e| e.delta).collect();
        assert_eq!(deltas, vec![5, 4, 3]);

        let all = store.read(|t| t.tenant_history(&tenant, 50)).unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn replay_sums_only_the_account() {
        let (store, _dir) = temp_store();
        let tenant = TenantId::new();
        let account = AccountId::new();
        for delta in [50, -30, 12] {
            store
                .write(|t| t.append_ledger(new_entry(tenant, account, delta), Utc::now()))
                .unwrap();
        }
        store
            .write(|t| t.append_ledger(new_entry(TenantId::new(), account, 999), Utc::now()))
            .unwrap();

        let replay = store
            .read(|t| t.replay_account_ledger(&tenant, &account))
            .unwrap();
        assert_eq!(replay, LedgerReplay { sum: 32, entries: 3 });
    }

    #[test]
    fn tenant_ledger_is_isolated() {
        let (store, _dir) = temp_store();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        store
            .write(|t| t.append_ledger(new_entry(tenant_a, AccountId::new(), 1), Utc::now()))
            .unwrap();
        assert!(store.read(|t| t.tenant_history(&tenant_b, 50)).unwrap().is_empty());
    }
}
