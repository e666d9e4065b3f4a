// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints of a site.
//!
//! These endpoints require an account with the admin flag on the addressed
//! site and provide:
//! - Resource pricing
//! - Point grants
//! - Account overview and ledger queries
//! - Ledger reconciliation

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::accounts::{AccountView, LedgerResponse},
    auth::AdminOnly,
    error::ApiError,
    models::{AccountId, AccountIdentity, PricingEntry, Provider, Reconciliation},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct PricingRequest {
    pub resource: String,
    /// Points charged per download. Must not be negative.
    pub cost: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PricingListResponse {
    pub pricing: Vec<PricingEntry>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRequest {
    pub username: String,
    /// Defaults to `local`.
    #[serde(default)]
    pub provider: Provider,
    /// Points to add (negative to deduct). Must not be zero.
    pub delta: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    pub account: AccountView,
    /// Delta actually applied (differs from the request only when clamped).
    pub applied: i64,
    pub ledger_entry_id: u64,
    /// Whether the account was created by this grant.
    pub created: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountListResponse {
    pub accounts: Vec<AccountView>,
    pub total: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LookupQuery {
    pub username: String,
    /// Defaults to `local`.
    #[serde(default)]
    pub provider: Provider,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminLedgerQuery {
    /// Restrict to one account; whole site otherwise.
    pub account_id: Option<AccountId>,
    /// Maximum number of entries, newest first (default 50).
    pub limit: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the site's pricing entries.
#[utoipa::path(
    get,
    path = "/v1/admin/pricing",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pricing entries", body = PricingListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_pricing(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<PricingListResponse>, ApiError> {
    let pricing = state.engine.list_pricing(&admin.tenant).await?;
    Ok(Json(PricingListResponse {
        total: pricing.len(),
        pricing,
    }))
}

/// Set the price of a resource.
///
/// Creates the entry or updates its cost and description in place.
#[utoipa::path(
    put,
    path = "/v1/admin/pricing",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = PricingRequest,
    responses(
        (status = 200, description = "Stored pricing entry", body = PricingEntry),
        (status = 400, description = "Empty resource or negative cost"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn configure_pricing(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<PricingRequest>,
) -> Result<Json<PricingEntry>, ApiError> {
    let entry = state
        .engine
        .configure(&admin.tenant, &request.resource, request.cost, &request.description)
        .await?;
    info!(admin = %admin.account.id, resource = %entry.resource, cost = entry.cost, "pricing set by admin");
    Ok(Json(entry))
}

/// Grant (or deduct) points.
///
/// Creates the account if the identity has never been seen on this site.
#[utoipa::path(
    post,
    path = "/v1/admin/grants",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Grant applied", body = GrantResponse),
        (status = 400, description = "Empty username or zero delta"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 422, description = "Deduction exceeds balance")
    )
)]
pub async fn grant(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let identity = AccountIdentity::new(&request.username, request.provider);
    let receipt = state
        .engine
        .grant(&admin.tenant, identity, request.delta, &request.description)
        .await?;
    info!(
        admin = %admin.account.id,
        account_id = %receipt.account.id,
        applied = receipt.applied,
        "points granted by admin"
    );
    Ok(Json(GrantResponse {
        account: receipt.account.into(),
        applied: receipt.applied,
        ledger_entry_id: receipt.ledger_entry_id,
        created: receipt.created,
    }))
}

/// List all accounts of the site.
#[utoipa::path(
    get,
    path = "/v1/admin/accounts",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Accounts", body = AccountListResponse),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_accounts(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let accounts: Vec<AccountView> = state
        .engine
        .list_accounts(&admin.tenant)
        .await?
        .into_iter()
        .map(AccountView::from)
        .collect();
    Ok(Json(AccountListResponse {
        total: accounts.len(),
        accounts,
    }))
}

/// Find an account by username and provider.
#[utoipa::path(
    get,
    path = "/v1/admin/accounts/lookup",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(LookupQuery),
    responses(
        (status = 200, description = "Account", body = AccountView),
        (status = 404, description = "Account not found")
    )
)]
pub async fn lookup_account(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<AccountView>, ApiError> {
    let account = state
        .engine
        .find_account(&admin.tenant, AccountIdentity::new(&query.username, query.provider))
        .await?;
    Ok(Json(account.into()))
}

/// Get an account's balance.
#[utoipa::path(
    get,
    path = "/v1/admin/accounts/{account_id}/balance",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("account_id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Balance", body = BalanceResponse),
        (status = 404, description = "Account not found")
    )
)]
pub async fn account_balance(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.engine.balance(&admin.tenant, account_id).await?;
    Ok(Json(BalanceResponse { account_id, balance }))
}

/// Replay an account's ledger against its balance.
#[utoipa::path(
    get,
    path = "/v1/admin/accounts/{account_id}/reconcile",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("account_id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Reconciliation report", body = Reconciliation),
        (status = 404, description = "Account not found")
    )
)]
pub async fn reconcile_account(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Reconciliation>, ApiError> {
    let report = state.engine.reconcile(&admin.tenant, account_id).await?;
    Ok(Json(report))
}

/// Query the site ledger, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/ledger",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(AdminLedgerQuery),
    responses(
        (status = 200, description = "Ledger entries", body = LedgerResponse),
        (status = 400, description = "Invalid limit"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn ledger(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AdminLedgerQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let entries = state
        .engine
        .ledger(&admin.tenant, query.account_id, query.limit)
        .await?;
    Ok(Json(entries.into()))
}
