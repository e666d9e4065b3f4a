// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed view over every table of one redb transaction.
//!
//! [`Tables<ReadOnly>`] wraps a snapshot read transaction and
//! [`Tables<ReadWrite>`] a write transaction. Query methods are shared by
//! both (see the `repository` modules); mutations only exist on the write
//! side. A write view borrows its transaction and must be dropped before the
//! transaction commits.

use std::marker::PhantomData;

use redb::{Key, ReadOnlyTable, ReadTransaction, ReadableTable, Table, Value, WriteTransaction};
use serde::de::DeserializeOwned;

use super::database::{
    StoreResult, ACCOUNTS, ACCOUNT_IDENTITIES, ACCOUNT_LEDGER, LEDGER, META, PRICING,
    TENANTS, TENANT_DOMAINS, TENANT_LEDGER,
};

/// Selects the concrete redb table type of a transaction kind.
pub trait Access {
    type Table<K: Key + 'static, V: Value + 'static>: ReadableTable<K, V>;
}

/// Snapshot read access.
pub struct ReadOnly;

impl Access for ReadOnly {
    type Table<K: Key + 'static, V: Value + 'static> = ReadOnlyTable<K, V>;
}

/// Exclusive write access within one transaction.
pub struct ReadWrite<'txn>(PhantomData<&'txn ()>);

impl<'txn> Access for ReadWrite<'txn> {
    type Table<K: Key + 'static, V: Value + 'static> = Table<'txn, K, V>;
}

/// All tables of the points database, opened once per transaction.
pub struct Tables<A: Access> {
    pub(crate) tenants: A::Table<&'static str, &'static [u8]>,
    pub(crate) tenant_domains: A::Table<&'static str, &'static str>,
    pub(crate) accounts: A::Table<&'static [u8], &'static [u8]>,
    pub(crate) account_identities: A::Table<&'static [u8], &'static str>,
    pub(crate) pricing: A::Table<&'static [u8], &'static [u8]>,
    pub(crate) ledger: A::Table<u64, &'static [u8]>,
    pub(crate) account_ledger: A::Table<&'static [u8], u64>,
    pub(crate) tenant_ledger: A::Table<&'static [u8], u64>,
    pub(crate) meta: A::Table<&'static str, u64>,
}

impl Tables<ReadOnly> {
    pub fn read(txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            tenants: txn.open_table(TENANTS)?,
            tenant_domains: txn.open_table(TENANT_DOMAINS)?,
            accounts: txn.open_table(ACCOUNTS)?,
            account_identities: txn.open_table(ACCOUNT_IDENTITIES)?,
            pricing: txn.open_table(PRICING)?,
            ledger: txn.open_table(LEDGER)?,
            account_ledger: txn.open_table(ACCOUNT_LEDGER)?,
            tenant_ledger: txn.open_table(TENANT_LEDGER)?,
            meta: txn.open_table(META)?,
        })
    }
}

impl<'txn> Tables<ReadWrite<'txn>> {
    pub fn write(txn: &'txn WriteTransaction) -> StoreResult<Self> {
        Ok(Self {
            tenants: txn.open_table(TENANTS)?,
            tenant_domains: txn.open_table(TENANT_DOMAINS)?,
            accounts: txn.open_table(ACCOUNTS)?,
            account_identities: txn.open_table(ACCOUNT_IDENTITIES)?,
            pricing: txn.open_table(PRICING)?,
            ledger: txn.open_table(LEDGER)?,
            account_ledger: txn.open_table(ACCOUNT_LEDGER)?,
            tenant_ledger: txn.open_table(TENANT_LEDGER)?,
            meta: txn.open_table(META)?,
        })
    }
}

/// Deserialize a JSON record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}
