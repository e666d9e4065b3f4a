// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account records, keyed under their tenant.
//!
//! Every lookup requires the tenant ID: account rows live under a
//! `tenant|account` key and identities under `tenant|provider|username`, so a
//! query scoped to one tenant can never reach another tenant's rows.

use redb::ReadableTable;
use uuid::Uuid;

use super::super::database::{composite_key, prefix_upper_bound, StoreError, StoreResult};
use super::super::tables::{decode, Access, ReadWrite, Tables};
use crate::models::{Account, AccountId, AccountIdentity, TenantId};

fn account_key(tenant_id: &TenantId, account_id: &AccountId) -> Vec<u8> {
    composite_key(&[tenant_id.0.as_bytes(), account_id.0.as_bytes()])
}

fn identity_key(tenant_id: &TenantId, identity: &AccountIdentity) -> Vec<u8> {
    composite_key(&[
        tenant_id.0.as_bytes(),
        identity.provider.as_str().as_bytes(),
        b"|",
        identity.username.as_bytes(),
    ])
}

impl<A: Access> Tables<A> {
    /// Get an account by ID within a tenant.
    pub fn account(&self, tenant_id: &TenantId, account_id: &AccountId) -> StoreResult<Option<Account>> {
        let key = account_key(tenant_id, account_id);
        match self.accounts.get(key.as_slice())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an account by external identity within a tenant.
    pub fn account_by_identity(
        &self,
        tenant_id: &TenantId,
        identity: &AccountIdentity,
    ) -> StoreResult<Option<Account>> {
        let key = identity_key(tenant_id, identity);
        let account_id = match self.account_identities.get(key.as_slice())? {
            Some(value) => Uuid::parse_str(value.value())
                .map(AccountId)
                .map_err(|e| StoreError::Corrupt(format!("identity index value: {e}")))?,
            None => return Ok(None),
        };
        match self.account(tenant_id, &account_id)? {
            Some(account) => Ok(Some(account)),
            None => Err(StoreError::Corrupt(format!(
                "identity {identity} points to missing account {account_id}"
            ))),
        }
    }

    /// List every account of a tenant, ordered by username.
    pub fn list_accounts(&self, tenant_id: &TenantId) -> StoreResult<Vec<Account>> {
        let prefix = tenant_id.0.as_bytes().as_slice();
        let range = match prefix_upper_bound(prefix) {
            Some(end) => self.accounts.range(prefix..end.as_slice())?,
            None => self.accounts.range(prefix..)?,
        };

        let mut accounts = Vec::new();
        for entry in range {
            let (_, value) = entry?;
            accounts.push(decode::<Account>(value.value())?);
        }
        accounts.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.provider.as_str().cmp(b.provider.as_str()))
        });
        Ok(accounts)
    }
}

impl Tables<ReadWrite<'_>> {
    /// Insert or update an account and its identity index entry.
    pub fn put_account(&mut self, account: &Account) -> StoreResult<()> {
        let key = account_key(&account.tenant_id, &account.id);
        let json = serde_json::to_vec(account)?;
        self.accounts.insert(key.as_slice(), json.as_slice())?;

        let identity = identity_key(&account.tenant_id, &account.identity());
        let account_id = account.id.to_string();
        self.account_identities
            .insert(identity.as_slice(), account_id.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use crate::storage::PointStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn temp_store() -> (PointStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn identity_lookup_is_tenant_scoped() {
        let (store, _dir) = temp_store();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let alice = AccountIdentity::local("alice");

        let account = Account::new(tenant_a, &alice, Utc::now());
        store.write(|t| t.put_account(&account)).unwrap();

        let found = store
            .read(|t| t.account_by_identity(&tenant_a, &alice))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);

        assert!(store
            .read(|t| t.account_by_identity(&tenant_b, &alice))
            .unwrap()
            .is_none());
        assert!(store
            .read(|t| t.account(&tenant_b, &account.id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn provider_is_part_of_identity() {
        let (store, _dir) = temp_store();
        let tenant = TenantId::new();
        let local = Account::new(tenant, &AccountIdentity::local("bob"), Utc::now());
        store.write(|t| t.put_account(&local)).unwrap();

        let github = AccountIdentity::new("bob", Provider::Github);
        assert!(store
            .read(|t| t.account_by_identity(&tenant, &github))
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_accounts_only_returns_tenant_rows() {
        let (store, _dir) = temp_store();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        for name in ["carol", "alice"] {
            let account = Account::new(tenant_a, &AccountIdentity::local(name), Utc::now());
            store.write(|t| t.put_account(&account)).unwrap();
        }
        let other = Account::new(tenant_b, &AccountIdentity::local("alice"), Utc::now());
        store.write(|t| t.put_account(&other)).unwrap();

        let listed = store.read(|t| t.list_accounts(&tenant_a)).unwrap();
        let names: Vec<&str> = listed.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert!(listed.iter().all(|a| a.tenant_id == tenant_a));
    }

    #[test]
    fn put_account_overwrites_balance() {
        let (store, _dir) = temp_store();
        let tenant = TenantId::new();
        let mut account = Account::new(tenant, &AccountIdentity::local("dave"), Utc::now());
        store.write(|t| t.put_account(&account)).unwrap();
        account.balance = 40;
        store.write(|t| t.put_account(&account)).unwrap();

        let stored = store.read(|t| t.account(&tenant, &account.id)).unwrap().unwrap();
        assert_eq!(stored.balance, 40);
        assert_eq!(store.read(|t| t.list_accounts(&tenant)).unwrap().len(), 1);
    }
}
