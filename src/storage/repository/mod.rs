// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the points database.
//!
//! Each module adds the queries for one entity type to [`Tables`], so a
//! single transaction can read and write several entities atomically.
//!
//! [`Tables`]: super::tables::Tables

pub mod accounts;
pub mod ledger;
pub mod pricing;
pub mod tenants;

pub use ledger::{LedgerReplay, NewLedgerEntry};
