// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Persistent entities of the points gateway. Entities are stored as JSON in
//! redb; everything except [`Account`] is also returned as-is by the REST API.
//!
//! ## Ownership
//!
//! - **Tenant**: isolation boundary, addressed by a unique routing domain
//! - **Account**: owned by one tenant, unique per (username, provider)
//! - **PricingEntry**: owned by one tenant, unique per resource
//! - **LedgerEntry**: immutable, owned by one account

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Tenant (site) identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        TenantId(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(value: Uuid) -> Self {
        TenantId(value)
    }
}

/// Account identifier, unique across tenants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        AccountId(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AccountId {
    fn from(value: Uuid) -> Self {
        AccountId(value)
    }
}

// =============================================================================
// Tenant
// =============================================================================

/// An isolated site, selected by the origin of inbound requests.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Tenant {
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Normalized routing key (host, optionally with port). Globally unique.
    pub domain: String,
    /// Per-site fallback cost for unpriced resources. Falls back to the
    /// process-wide `DEFAULT_POINTS` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cost: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a request origin or configured domain into a routing key.
///
/// Trims whitespace, lowercases, and drops a trailing root dot. Ports are
/// kept so `example.com:8080` and `example.com` can be different sites.
pub fn normalize_domain(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}:{}", host.trim_end_matches('.'), port)
        }
        _ => lowered.trim_end_matches('.').to_string(),
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Identity provider that vouched for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Username/password managed by this service.
    #[default]
    Local,
    Google,
    Github,
    Wechat,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Wechat => "wechat",
        }
    }

    /// Parse a provider tag (case-insensitive).
    pub fn parse(s: &str) -> Option<Provider> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(Provider::Local),
            "google" => Some(Provider::Google),
            "github" => Some(Provider::Github),
            "wechat" => Some(Provider::Wechat),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External identity of a caller within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AccountIdentity {
    pub username: String,
    #[serde(default)]
    pub provider: Provider,
}

impl AccountIdentity {
    pub fn new(username: impl AsRef<str>, provider: Provider) -> Self {
        Self {
            username: normalize_username(username.as_ref()),
            provider,
        }
    }

    pub fn local(username: impl AsRef<str>) -> Self {
        Self::new(username, Provider::Local)
    }
}

impl fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.provider)
    }
}

/// Canonical form of an external username: trimmed, Unicode NFC.
///
/// Case is preserved; providers treat usernames as case-sensitive.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().nfc().collect()
}

/// A user's point-bearing identity within one tenant.
///
/// Carries credential material, so handlers return
/// [`AccountView`](crate::api::accounts::AccountView) instead of this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub username: String,
    pub provider: Provider,
    /// Password hash, local provider only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Current balance. Never negative after a committed transaction.
    pub balance: i64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(tenant_id: TenantId, identity: &AccountIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            tenant_id,
            username: identity.username.clone(),
            provider: identity.provider,
            credential: None,
            balance: 0,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity(&self) -> AccountIdentity {
        AccountIdentity {
            username: self.username.clone(),
            provider: self.provider,
        }
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// Point cost of unlocking one resource within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PricingEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Normalized resource path (no leading `/`).
    pub resource: String,
    pub cost: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a resource identifier: trim whitespace and drop leading `/`.
pub fn normalize_resource(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_string()
}

/// Why a normalized resource id cannot name a downloadable file, if it can't.
///
/// Ids are relative paths; empty, `.` and `..` segments are refused.
pub fn resource_path_problem(resource: &str) -> Option<&'static str> {
    if resource.is_empty() {
        return Some("empty resource");
    }
    if resource
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Some("empty or relative path segment");
    }
    None
}

/// Price information for a resource as seen by a prospective buyer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Quote {
    pub resource: String,
    /// Last path segment of the resource.
    pub file_name: String,
    pub cost: i64,
    pub description: String,
    /// False when the tenant default cost applies.
    pub priced: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// Kind of balance change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// Debit for unlocking a resource.
    ResourceAccess,
    /// Administrative credit or debit.
    AdminGrant,
}

/// Immutable record of one balance change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Monotonic sequence number; commit order.
    pub id: u64,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub delta: i64,
    pub action: LedgerAction,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Account balance right after this entry was applied.
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operation results
// =============================================================================

/// Outcome of a committed spend.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SpendReceipt {
    pub account_id: AccountId,
    pub resource: String,
    pub cost: i64,
    pub new_balance: i64,
    pub ledger_entry_id: u64,
}

/// Outcome of a committed grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReceipt {
    pub account: Account,
    /// Delta actually applied (differs from the request under clamping).
    pub applied: i64,
    pub ledger_entry_id: u64,
    /// True when the grant created the account.
    pub created: bool,
}

/// Ledger replay result for one account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub balance: i64,
    pub ledger_sum: i64,
    pub entries: u64,
    pub consistent: bool,
}
