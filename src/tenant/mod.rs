// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Tenant Resolution
//!
//! Maps the origin of an inbound request to the [`Tenant`] that scopes every
//! ledger operation, and manages the tenant records themselves.
//!
//! ## Resolution
//!
//! 1. Normalize the origin (lowercase, no trailing dot, port kept)
//! 2. Serve from the LRU cache when fresh
//! 3. Look up the domain index in redb
//! 4. Unknown origin: `TenantNotFound`, or in development mode a
//!    `Default Site` is provisioned for it

pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::engine::{LedgerError, LedgerResult};
use crate::models::{normalize_domain, Tenant, TenantId};
use crate::storage::PointStore;

pub use cache::TenantCache;

/// Display name of tenants provisioned automatically in development mode.
pub const DEFAULT_SITE_NAME: &str = "Default Site";

const CACHE_CAPACITY: usize = 1024;
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolves a request origin to its tenant.
pub trait TenantResolver: Send + Sync {
    fn resolve_tenant(&self, origin: &str) -> LedgerResult<Tenant>;
}

/// Fields of a new tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub domain: String,
    pub default_cost: Option<i64>,
}

/// Partial update of an existing tenant. The domain is immutable.
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the override.
    pub default_cost: Option<Option<i64>>,
}

/// Store-backed tenant directory and resolver.
pub struct TenantRegistry {
    store: Arc<PointStore>,
    cache: TenantCache,
    dev_mode: bool,
}

impl TenantRegistry {
    pub fn new(store: Arc<PointStore>, dev_mode: bool) -> Self {
        Self {
            store,
            cache: TenantCache::new(CACHE_CAPACITY, CACHE_TTL),
            dev_mode,
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Run `work` against this registry on the blocking pool.
    ///
    /// Registry calls hit redb directly; async callers go through here.
    pub async fn blocking<T, F>(self: &Arc<Self>, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&TenantRegistry) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = Arc::clone(self);
        settle(tokio::task::spawn_blocking(move || work(&registry)).await)
    }

    /// Register a new tenant. Fails with `TenantExists` if the domain is taken.
    pub fn create(&self, new: NewTenant) -> LedgerResult<Tenant> {
        let name = new.name.trim().to_string();
        let domain = normalize_domain(&new.domain);
        if name.is_empty() {
            return Err(LedgerError::invalid("site name must not be empty"));
        }
        if domain.is_empty() {
            return Err(LedgerError::invalid("site domain must not be empty"));
        }
        validate_default_cost(new.default_cost)?;

        let tenant = self.store.write(|tables| {
            if tables.tenant_by_domain(&domain)?.is_some() {
                return Err(LedgerError::TenantExists(domain.clone()));
            }
            let now = Utc::now();
            let tenant = Tenant {
                id: TenantId::new(),
                name: name.clone(),
                domain: domain.clone(),
                default_cost: new.default_cost,
                created_at: now,
                updated_at: now,
            };
            tables.put_tenant(&tenant)?;
            Ok::<_, LedgerError>(tenant)
        })?;

        info!(tenant_id = %tenant.id, domain = %tenant.domain, "site created");
        self.cache.put(&tenant);
        Ok(tenant)
    }

    pub fn get(&self, tenant_id: &TenantId) -> LedgerResult<Tenant> {
        self.store
            .read(|tables| Ok::<_, LedgerError>(tables.tenant(tenant_id)?))?
            .ok_or_else(|| LedgerError::TenantNotFound(tenant_id.to_string()))
    }

    pub fn list(&self) -> LedgerResult<Vec<Tenant>> {
        self.store.read(|tables| Ok(tables.list_tenants()?))
    }

    pub fn update(&self, tenant_id: &TenantId, update: TenantUpdate) -> LedgerResult<Tenant> {
        if let Some(cost) = update.default_cost {
            validate_default_cost(cost)?;
        }
        let name = match update.name.as_deref().map(str::trim) {
            Some("") => return Err(LedgerError::invalid("site name must not be empty")),
            other => other.map(str::to_string),
        };

        let tenant = self.store.write(|tables| {
            let mut tenant = tables
                .tenant(tenant_id)?
                .ok_or_else(|| LedgerError::TenantNotFound(tenant_id.to_string()))?;
            if let Some(name) = name {
                tenant.name = name;
            }
            if let Some(cost) = update.default_cost {
                tenant.default_cost = cost;
            }
            tenant.updated_at = Utc::now();
            tables.put_tenant(&tenant)?;
            Ok::<_, LedgerError>(tenant)
        })?;

        self.cache.invalidate_tenant(tenant_id);
        info!(tenant_id = %tenant.id, "site updated");
        Ok(tenant)
    }

    fn provision_default(&self, domain: &str) -> LedgerResult<Tenant> {
        let created = self.create(NewTenant {
            name: DEFAULT_SITE_NAME.to_string(),
            domain: domain.to_string(),
            default_cost: None,
        });
        match created {
            Ok(tenant) => {
                warn!(domain, tenant_id = %tenant.id, "development mode: provisioned default site");
                Ok(tenant)
            }
            // Another request provisioned it first.
            Err(LedgerError::TenantExists(_)) => self.lookup(domain)?.ok_or_else(|| {
                LedgerError::TenantNotFound(domain.to_string())
            }),
            Err(err) => Err(err),
        }
    }

    fn lookup(&self, domain: &str) -> LedgerResult<Option<Tenant>> {
        if let Some(tenant) = self.cache.get(domain) {
            return Ok(Some(tenant));
        }
        let tenant = self
            .store
            .read(|tables| Ok::<_, LedgerError>(tables.tenant_by_domain(domain)?))?;
        if let Some(tenant) = &tenant {
            self.cache.put(tenant);
        }
        Ok(tenant)
    }
}

impl TenantResolver for TenantRegistry {
    fn resolve_tenant(&self, origin: &str) -> LedgerResult<Tenant> {
        let domain = normalize_domain(origin);
        if domain.is_empty() {
            return Err(LedgerError::TenantNotFound("<empty origin>".to_string()));
        }
        match self.lookup(&domain)? {
            Some(tenant) => Ok(tenant),
            None if self.dev_mode => self.provision_default(&domain),
            None => Err(LedgerError::TenantNotFound(domain)),
        }
    }
}

/// Resolve `origin` on the blocking pool.
///
/// A cache miss reads redb, and development mode may write a new tenant.
pub async fn resolve_blocking(resolver: &Arc<dyn TenantResolver>, origin: String) -> LedgerResult<Tenant> {
    let resolver = Arc::clone(resolver);
    settle(tokio::task::spawn_blocking(move || resolver.resolve_tenant(&origin)).await)
}

fn settle<T>(joined: Result<LedgerResult<T>, JoinError>) -> LedgerResult<T> {
    joined.map_err(|e| {
        error!(error = %e, "tenant registry worker failed");
        LedgerError::PersistenceFailure(format!("tenant registry worker failed: {e}"))
    })?
}

fn validate_default_cost(cost: Option<i64>) -> LedgerResult<()> {
    match cost {
        Some(cost) if cost < 0 => Err(LedgerError::invalid("default cost must not be negative")),
        _ => Ok(()),
    }
}
