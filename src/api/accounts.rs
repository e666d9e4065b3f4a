// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller-facing account endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Caller,
    error::ApiError,
    models::{Account, AccountId, LedgerEntry, Provider, TenantId},
    state::AppState,
};

/// Public view of an account (no credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountView {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub username: String,
    pub provider: Provider,
    pub balance: i64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            tenant_id: account.tenant_id,
            username: account.username,
            provider: account.provider,
            balance: account.balance,
            is_admin: account.is_admin,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Query parameters for ledger pages.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LedgerQuery {
    /// Maximum number of entries, newest first (default 50).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerResponse {
    /// Entries, newest first.
    pub entries: Vec<LedgerEntry>,
    pub count: usize,
}

impl From<Vec<LedgerEntry>> for LedgerResponse {
    fn from(entries: Vec<LedgerEntry>) -> Self {
        Self {
            count: entries.len(),
            entries,
        }
    }
}

/// Get the caller's account.
///
/// The account is created with a zero balance on the first authenticated
/// request.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Account",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller account", body = AccountView),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Site not configured")
    )
)]
pub async fn me(caller: Caller) -> Json<AccountView> {
    Json(caller.account.into())
}

/// Get the caller's ledger, newest first.
#[utoipa::path(
    get,
    path = "/v1/me/ledger",
    tag = "Account",
    security(("bearer_auth" = [])),
    params(LedgerQuery),
    responses(
        (status = 200, description = "Ledger entries", body = LedgerResponse),
        (status = 400, description = "Invalid limit"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_ledger(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let entries = state
        .engine
        .ledger(&caller.tenant, Some(caller.account.id), query.limit)
        .await?;
    Ok(Json(entries.into()))
}
