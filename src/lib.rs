// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Points Gateway - Multi-tenant points ledger gating file downloads
//!
//! Users spend points to unlock downloads; site administrators price
//! resources and grant points. Every balance change is one ACID transaction
//! that also appends to an append-only ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer tokens, site scope and operator key extractors
//! - `download` - Signed download links for unlocked resources
//! - `engine` - Spend, grant, pricing and ledger transactions
//! - `storage` - Embedded ledger database (redb)
//! - `tenant` - Site registry and origin resolution

pub mod api;
pub mod auth;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
pub mod tenant;
