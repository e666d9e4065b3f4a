// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the gateway lives in a single redb file
//! (`$DATA_DIR/points.redb`): tenants, accounts, pricing and the point
//! ledger. There is no other durable state.
//!
//! ## Transactions
//!
//! - [`PointStore::read`] runs a closure against a consistent snapshot
//! - [`PointStore::write`] runs a closure inside the single redb writer and
//!   commits only if the closure succeeds
//! - The transaction engine drives write transactions directly when it needs
//!   to decide at the last moment whether to commit

pub mod database;
pub mod repository;
pub mod tables;

pub use database::{PointStore, StoreError, StoreResult};
pub use repository::{LedgerReplay, NewLedgerEntry};
pub use tables::{Access, ReadOnly, ReadWrite, Tables};
