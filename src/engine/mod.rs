// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Engine
//!
//! Every balance change goes through [`PointEngine`]. A spend or grant reads
//! the account, decides, writes the new balance and appends the ledger entry
//! inside one redb write transaction. redb admits a single writer at a time,
//! so two requests against the same account can never interleave between the
//! balance check and the update.
//!
//! ## Invariants
//!
//! - An account balance is never negative after a commit
//! - The sum of an account's ledger deltas equals its balance
//! - Ledger ids and timestamps follow commit order
//! - Every query carries the tenant id; nothing crosses tenants
//!
//! All operations run under the configured transaction deadline (see
//! [`txn`]). Nothing is retried here; [`LedgerError::is_retryable`] tells the
//! caller when a retry is safe.

pub mod error;
pub mod txn;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use error::{LedgerError, LedgerResult};
pub use txn::{CommitGate, TxnRunner};

use crate::models::{
    normalize_resource, resource_path_problem, Account, AccountId, AccountIdentity, GrantReceipt,
    LedgerAction, LedgerEntry, PricingEntry, Provider, Quote, Reconciliation, SpendReceipt, Tenant,
    TenantId,
};
use crate::storage::{Access, NewLedgerEntry, PointStore, Tables};
use txn::{read_gated, write_gated};

/// Page size used when the caller does not pass a ledger limit.
pub const DEFAULT_LEDGER_LIMIT: usize = 50;

/// What an administrative grant does when it would drive a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeGrantPolicy {
    /// Fail with `InsufficientPoints`, like a spend.
    #[default]
    Reject,
    /// Apply only as much of the debit as the balance covers.
    ClampToZero,
}

impl FromStr for NegativeGrantPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(NegativeGrantPolicy::Reject),
            "clamp" | "clamp_to_zero" => Ok(NegativeGrantPolicy::ClampToZero),
            other => Err(format!("unknown negative grant policy: {other}")),
        }
    }
}

/// Engine tunables, taken from [`AppConfig`](crate::config::AppConfig).
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Cost of resources without a pricing entry, unless the tenant overrides it.
    pub default_cost: i64,
    pub transaction_timeout: Duration,
    pub negative_grant: NegativeGrantPolicy,
    /// Upper clamp for ledger pages.
    pub max_ledger_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_cost: 0,
            transaction_timeout: Duration::from_secs(5),
            negative_grant: NegativeGrantPolicy::Reject,
            max_ledger_limit: 500,
        }
    }
}

/// The point-ledger transaction core.
#[derive(Clone)]
pub struct PointEngine {
    store: Arc<PointStore>,
    settings: EngineSettings,
    runner: TxnRunner,
}

impl PointEngine {
    pub fn new(store: Arc<PointStore>, settings: EngineSettings) -> Self {
        let runner = TxnRunner::new(settings.transaction_timeout);
        Self {
            store,
            settings,
            runner,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    // =========================================================================
    // Spend
    // =========================================================================

    /// Charge `account_id` for unlocking `resource`.
    ///
    /// Unpriced resources cost the tenant default. On success the balance is
    /// lower by the cost and exactly one ledger entry was appended.
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id, account_id = %account_id))]
    pub async fn spend(
        &self,
        tenant: &Tenant,
        account_id: AccountId,
        resource: &str,
    ) -> LedgerResult<SpendReceipt> {
        let resource = require_resource(resource)?;
        let store = Arc::clone(&self.store);
        let tenant_id = tenant.id;
        let fallback_cost = self.settings.default_cost;

        let result = self
            .runner
            .run("spend", move |gate| {
                write_gated(&store, gate, |tables| {
                    let tenant = require_tenant(tables, &tenant_id)?;
                    let cost = match tables.pricing_entry(&tenant_id, &resource)? {
                        Some(entry) => entry.cost,
                        None => tenant.default_cost.unwrap_or(fallback_cost),
                    };

                    let mut account = require_account(tables, &tenant_id, &account_id)?;
                    if account.balance < cost {
                        return Err(LedgerError::InsufficientPoints {
                            tenant_id,
                            resource: Some(resource.clone()),
                            cost,
                            balance: account.balance,
                        });
                    }

                    let now = Utc::now();
                    account.balance -= cost;
                    account.updated_at = now;
                    tables.put_account(&account)?;

                    let entry = tables.append_ledger(
                        NewLedgerEntry {
                            tenant_id,
                            account_id,
                            delta: -cost,
                            action: LedgerAction::ResourceAccess,
                            detail: format!("download {resource}"),
                            resource: Some(resource.clone()),
                            balance_after: account.balance,
                        },
                        now,
                    )?;

                    Ok(SpendReceipt {
                        account_id,
                        resource: resource.clone(),
                        cost,
                        new_balance: account.balance,
                        ledger_entry_id: entry.id,
                    })
                })
            })
            .await;

        match &result {
            Ok(receipt) => info!(
                resource = %receipt.resource,
                cost = receipt.cost,
                balance = receipt.new_balance,
                entry_id = receipt.ledger_entry_id,
                "points spent"
            ),
            Err(LedgerError::InsufficientPoints { cost, balance, .. }) => {
                info!(cost, balance, "spend refused: insufficient points")
            }
            Err(err) => warn!(error = %err, "spend failed"),
        }
        result
    }

    // =========================================================================
    // Grant
    // =========================================================================

    /// Credit (or debit) an account, creating it if the identity is new.
    ///
    /// A negative delta larger than the balance follows
    /// [`EngineSettings::negative_grant`].
    #[instrument(skip(self, tenant, description), fields(tenant_id = %tenant.id, identity = %identity))]
    pub async fn grant(
        &self,
        tenant: &Tenant,
        identity: AccountIdentity,
        delta: i64,
        description: &str,
    ) -> LedgerResult<GrantReceipt> {
        require_username(&identity)?;
        if delta == 0 {
            return Err(LedgerError::invalid("grant delta must not be zero"));
        }
        if delta == i64::MIN {
            return Err(LedgerError::invalid("grant delta out of range"));
        }
        let detail = match description.trim() {
            "" => "admin grant".to_string(),
            text => text.to_string(),
        };
        let store = Arc::clone(&self.store);
        let tenant_id = tenant.id;
        let policy = self.settings.negative_grant;

        let result = self
            .runner
            .run("grant", move |gate| {
                write_gated(&store, gate, |tables| {
                    require_tenant(tables, &tenant_id)?;
                    let now = Utc::now();
                    let (mut account, created) = match tables.account_by_identity(&tenant_id, &identity)? {
                        Some(account) => (account, false),
                        None => (Account::new(tenant_id, &identity, now), true),
                    };

                    let target = account
                        .balance
                        .checked_add(delta)
                        .ok_or_else(|| LedgerError::invalid("grant would overflow the balance"))?;
                    let applied = if target >= 0 {
                        delta
                    } else {
                        match policy {
                            NegativeGrantPolicy::Reject => {
                                return Err(LedgerError::InsufficientPoints {
                                    tenant_id,
                                    resource: None,
                                    cost: delta.saturating_neg(),
                                    balance: account.balance,
                                })
                            }
                            NegativeGrantPolicy::ClampToZero => -account.balance,
                        }
                    };

                    account.balance += applied;
                    account.updated_at = now;
                    tables.put_account(&account)?;

                    let entry = tables.append_ledger(
                        NewLedgerEntry {
                            tenant_id,
                            account_id: account.id,
                            delta: applied,
                            action: LedgerAction::AdminGrant,
                            detail: detail.clone(),
                            resource: None,
                            balance_after: account.balance,
                        },
                        now,
                    )?;

                    Ok(GrantReceipt {
                        account,
                        applied,
                        ledger_entry_id: entry.id,
                        created,
                    })
                })
            })
            .await;

        match &result {
            Ok(receipt) => info!(
                account_id = %receipt.account.id,
                requested = delta,
                applied = receipt.applied,
                balance = receipt.account.balance,
                created = receipt.created,
                entry_id = receipt.ledger_entry_id,
                "points granted"
            ),
            Err(err) => warn!(requested = delta, error = %err, "grant failed"),
        }
        result
    }

    // =========================================================================
    // Pricing
    // =========================================================================

    /// Upsert the price of a resource.
    ///
    /// Re-applying identical arguments leaves the stored entry untouched,
    /// including its timestamps.
    #[instrument(skip(self, tenant, description), fields(tenant_id = %tenant.id))]
    pub async fn configure(
        &self,
        tenant: &Tenant,
        resource: &str,
        cost: i64,
        description: &str,
    ) -> LedgerResult<PricingEntry> {
        let resource = require_resource(resource)?;
        if cost < 0 {
            return Err(LedgerError::invalid("cost must not be negative"));
        }
        let description = description.trim().to_string();
        let store = Arc::clone(&self.store);
        let tenant_id = tenant.id;

        let entry = self
            .runner
            .run("configure", move |gate| {
                write_gated(&store, gate, |tables| {
                    require_tenant(tables, &tenant_id)?;
                    let now = Utc::now();
                    let entry = match tables.pricing_entry(&tenant_id, &resource)? {
                        Some(existing) if existing.cost == cost && existing.description == description => {
                            return Ok(existing);
                        }
                        Some(existing) => PricingEntry {
                            cost,
                            description: description.clone(),
                            updated_at: now,
                            ..existing
                        },
                        None => PricingEntry {
                            id: Uuid::new_v4(),
                            tenant_id,
                            resource: resource.clone(),
                            cost,
                            description: description.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    };
                    tables.put_pricing(&entry)?;
                    Ok(entry)
                })
            })
            .await?;

        info!(resource = %entry.resource, cost = entry.cost, "pricing configured");
        Ok(entry)
    }

    /// All pricing entries of a tenant.
    pub async fn list_pricing(&self, tenant: &Tenant) -> LedgerResult<Vec<PricingEntry>> {
        let tenant_id = tenant.id;
        self.read("list_pricing", move |tables| {
            require_tenant(tables, &tenant_id)?;
            Ok(tables.list_pricing(&tenant_id)?)
        })
        .await
    }

    /// Price of a resource as a spend would compute it.
    pub async fn quote(&self, tenant: &Tenant, resource: &str) -> LedgerResult<Quote> {
        let resource = require_resource(resource)?;
        let tenant_id = tenant.id;
        let fallback_cost = self.settings.default_cost;
        self.read("quote", move |tables| {
            let tenant = require_tenant(tables, &tenant_id)?;
            let file_name = resource
                .rsplit('/')
                .next()
                .unwrap_or(resource.as_str())
                .to_string();
            let quote = match tables.pricing_entry(&tenant_id, &resource)? {
                Some(entry) => Quote {
                    resource: entry.resource,
                    file_name,
                    cost: entry.cost,
                    description: entry.description,
                    priced: true,
                },
                None => Quote {
                    resource: resource.clone(),
                    file_name,
                    cost: tenant.default_cost.unwrap_or(fallback_cost),
                    description: String::new(),
                    priced: false,
                },
            };
            Ok(quote)
        })
        .await
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Current balance of an account.
    pub async fn balance(&self, tenant: &Tenant, account_id: AccountId) -> LedgerResult<i64> {
        Ok(self.account(tenant, account_id).await?.balance)
    }

    pub async fn account(&self, tenant: &Tenant, account_id: AccountId) -> LedgerResult<Account> {
        let tenant_id = tenant.id;
        self.read("get_account", move |tables| {
            require_tenant(tables, &tenant_id)?;
            require_account(tables, &tenant_id, &account_id)
        })
        .await
    }

    /// Look up an account by external identity.
    pub async fn find_account(&self, tenant: &Tenant, identity: AccountIdentity) -> LedgerResult<Account> {
        require_username(&identity)?;
        let tenant_id = tenant.id;
        self.read("find_account", move |tables| {
            require_tenant(tables, &tenant_id)?;
            tables
                .account_by_identity(&tenant_id, &identity)?
                .ok_or_else(|| LedgerError::AccountNotFound {
                    tenant_id,
                    account: identity.to_string(),
                })
        })
        .await
    }

    /// Find the account of an authenticated identity, creating it with a zero
    /// balance on first sight. Returns whether it was created.
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id, identity = %identity))]
    pub async fn find_or_create_account(
        &self,
        tenant: &Tenant,
        identity: AccountIdentity,
    ) -> LedgerResult<(Account, bool)> {
        require_username(&identity)?;
        let tenant_id = tenant.id;

        // Fast path on a snapshot; most callers already have an account.
        let lookup = identity.clone();
        let existing = self
            .read("find_account", move |tables| {
                require_tenant(tables, &tenant_id)?;
                Ok(tables.account_by_identity(&tenant_id, &lookup)?)
            })
            .await?;
        if let Some(account) = existing {
            return Ok((account, false));
        }

        let store = Arc::clone(&self.store);
        let (account, created) = self
            .runner
            .run("create_account", move |gate| {
                write_gated(&store, gate, |tables| {
                    require_tenant(tables, &tenant_id)?;
                    if let Some(account) = tables.account_by_identity(&tenant_id, &identity)? {
                        return Ok((account, false));
                    }
                    let account = Account::new(tenant_id, &identity, Utc::now());
                    tables.put_account(&account)?;
                    Ok((account, true))
                })
            })
            .await?;
        if created {
            info!(account_id = %account.id, "account created");
        }
        Ok((account, created))
    }

    /// Find-or-create an account and mark it as administrator.
    pub async fn promote_admin(&self, tenant: &Tenant, identity: AccountIdentity) -> LedgerResult<Account> {
        require_username(&identity)?;
        let store = Arc::clone(&self.store);
        let tenant_id = tenant.id;
        let account = self
            .runner
            .run("promote_admin", move |gate| {
                write_gated(&store, gate, |tables| {
                    require_tenant(tables, &tenant_id)?;
                    let now = Utc::now();
                    let mut account = tables
                        .account_by_identity(&tenant_id, &identity)?
                        .unwrap_or_else(|| Account::new(tenant_id, &identity, now));
                    if !account.is_admin {
                        account.is_admin = true;
                        account.updated_at = now;
                    }
                    tables.put_account(&account)?;
                    Ok(account)
                })
            })
            .await?;
        info!(tenant_id = %tenant_id, account_id = %account.id, "account promoted to admin");
        Ok(account)
    }

    /// Attach a password hash to a local account, creating the account if
    /// needed. Returns whether it was created.
    ///
    /// An account that already carries a credential is `AccountExists`; one
    /// created by a grant before its owner registered is claimed.
    #[instrument(skip(self, tenant, credential), fields(tenant_id = %tenant.id, identity = %identity))]
    pub async fn register_local(
        &self,
        tenant: &Tenant,
        identity: AccountIdentity,
        credential: String,
    ) -> LedgerResult<(Account, bool)> {
        require_username(&identity)?;
        if identity.provider != Provider::Local {
            return Err(LedgerError::invalid("only local accounts carry a password"));
        }
        let store = Arc::clone(&self.store);
        let tenant_id = tenant.id;
        let (account, created) = self
            .runner
            .run("register_local", move |gate| {
                write_gated(&store, gate, |tables| {
                    require_tenant(tables, &tenant_id)?;
                    let now = Utc::now();
                    let (mut account, created) = match tables.account_by_identity(&tenant_id, &identity)? {
                        Some(account) if account.credential.is_some() => {
                            return Err(LedgerError::AccountExists(identity.to_string()));
                        }
                        Some(account) => (account, false),
                        None => (Account::new(tenant_id, &identity, now), true),
                    };
                    account.credential = Some(credential);
                    account.updated_at = now;
                    tables.put_account(&account)?;
                    Ok((account, created))
                })
            })
            .await?;
        info!(account_id = %account.id, created, "local account registered");
        Ok((account, created))
    }

    /// All accounts of a tenant.
    pub async fn list_accounts(&self, tenant: &Tenant) -> LedgerResult<Vec<Account>> {
        let tenant_id = tenant.id;
        self.read("list_accounts", move |tables| {
            require_tenant(tables, &tenant_id)?;
            Ok(tables.list_accounts(&tenant_id)?)
        })
        .await
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Newest-first ledger of one account, or of the whole tenant when
    /// `account_id` is `None`.
    ///
    /// `limit` defaults to [`DEFAULT_LEDGER_LIMIT`], must be positive, and is
    /// clamped to [`EngineSettings::max_ledger_limit`].
    pub async fn ledger(
        &self,
        tenant: &Tenant,
        account_id: Option<AccountId>,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let limit = resolve_limit(limit, self.settings.max_ledger_limit)?;
        let tenant_id = tenant.id;
        self.read("get_ledger", move |tables| {
            require_tenant(tables, &tenant_id)?;
            match account_id {
                Some(account_id) => {
                    require_account(tables, &tenant_id, &account_id)?;
                    Ok(tables.account_history(&tenant_id, &account_id, limit)?)
                }
                None => Ok(tables.tenant_history(&tenant_id, limit)?),
            }
        })
        .await
    }

    /// Replay an account's ledger against its stored balance.
    pub async fn reconcile(&self, tenant: &Tenant, account_id: AccountId) -> LedgerResult<Reconciliation> {
        let tenant_id = tenant.id;
        let report = self
            .read("reconcile", move |tables| {
                require_tenant(tables, &tenant_id)?;
                let account = require_account(tables, &tenant_id, &account_id)?;
                let replay = tables.replay_account_ledger(&tenant_id, &account_id)?;
                Ok(Reconciliation {
                    account_id,
                    balance: account.balance,
                    ledger_sum: replay.sum,
                    entries: replay.entries,
                    consistent: replay.sum == account.balance,
                })
            })
            .await?;
        if !report.consistent {
            warn!(
                tenant_id = %tenant_id,
                account_id = %account_id,
                balance = report.balance,
                ledger_sum = report.ledger_sum,
                "ledger does not reconcile with balance"
            );
        }
        Ok(report)
    }

    async fn read<T, F>(&self, operation: &'static str, body: F) -> LedgerResult<T>
    where
        F: FnOnce(&Tables<crate::storage::ReadOnly>) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.runner
            .run(operation, move |gate| read_gated(&store, gate, body))
            .await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn require_tenant<A: Access>(tables: &Tables<A>, tenant_id: &TenantId) -> LedgerResult<Tenant> {
    tables
        .tenant(tenant_id)?
        .ok_or_else(|| LedgerError::TenantNotFound(tenant_id.to_string()))
}

fn require_account<A: Access>(
    tables: &Tables<A>,
    tenant_id: &TenantId,
    account_id: &AccountId,
) -> LedgerResult<Account> {
    tables
        .account(tenant_id, account_id)?
        .ok_or_else(|| LedgerError::AccountNotFound {
            tenant_id: *tenant_id,
            account: account_id.to_string(),
        })
}

fn require_resource(raw: &str) -> LedgerResult<String> {
    let resource = normalize_resource(raw);
    if let Some(problem) = resource_path_problem(&resource) {
        return Err(LedgerError::invalid(format!("resource id {raw:?}: {problem}")));
    }
    Ok(resource)
}

fn require_username(identity: &AccountIdentity) -> LedgerResult<()> {
    if identity.username.is_empty() {
        return Err(LedgerError::invalid("username must not be empty"));
    }
    Ok(())
}

fn resolve_limit(limit: Option<i64>, max: usize) -> LedgerResult<usize> {
    match limit {
        None => Ok(DEFAULT_LEDGER_LIMIT.min(max.max(1))),
        Some(n) if n <= 0 => Err(LedgerError::invalid(format!(
            "limit must be positive, got {n}"
        ))),
        Some(n) => Ok(usize::try_from(n).unwrap_or(usize::MAX).min(max.max(1))),
    }
}
