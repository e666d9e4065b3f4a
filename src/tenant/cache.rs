// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for origin → tenant lookups.
//!
//! Every request resolves its tenant from the `Host` header, so the hot
//! domains are kept in memory to avoid a redb read per request.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::models::{Tenant, TenantId};

/// Cached entry: tenant + insertion timestamp.
struct CacheEntry {
    tenant: Tenant,
    inserted_at: Instant,
}

/// In-process LRU cache keyed by normalized domain.
pub struct TenantCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl TenantCache {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// - `capacity`: Max number of domains to cache.
    /// - `ttl`: Time-to-live for each cache entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Returns `None` if not cached or expired.
    pub fn get(&self, domain: &str) -> Option<Tenant> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(domain) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.tenant.clone());
            }
            // Expired, drop it
            cache.pop(domain);
        }
        None
    }

    pub fn put(&self, tenant: &Tenant) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                tenant.domain.clone(),
                CacheEntry {
                    tenant: tenant.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every entry routing to `tenant_id`.
    pub fn invalidate_tenant(&self, tenant_id: &TenantId) {
        if let Ok(mut cache) = self.cache.lock() {
            let stale: Vec<String> = cache
                .iter()
                .filter(|(_, entry)| &entry.tenant.id == tenant_id)
                .map(|(domain, _)| domain.clone())
                .collect();
            for domain in stale {
                cache.pop(&domain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn site(domain: &str) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: TenantId::new(),
            name: "Site".into(),
            domain: domain.into(),
            default_cost: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cache_put_and_get() {
        let cache = TenantCache::new(10, Duration::from_secs(300));
        assert!(cache.get("a.example").is_none());

        let tenant = site("a.example");
        cache.put(&tenant);
        assert_eq!(cache.get("a.example").unwrap().id, tenant.id);
    }

    #[test]
    fn cache_invalidate_by_tenant() {
        let cache = TenantCache::new(10, Duration::from_secs(300));
        let tenant = site("a.example");
        cache.put(&tenant);
        cache.put(&site("b.example"));

        cache.invalidate_tenant(&tenant.id);
        assert!(cache.get("a.example").is_none());
        assert!(cache.get("b.example").is_some());
    }

    #[test]
    fn cache_ttl_expiry() {
        let cache = TenantCache::new(10, Duration::from_millis(1));
        cache.put(&site("a.example"));

        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("a.example").is_none());
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = TenantCache::new(1, Duration::from_secs(300));
        cache.put(&site("a.example"));
        cache.put(&site("b.example"));
        assert!(cache.get("a.example").is_none());
        assert!(cache.get("b.example").is_some());
    }
}
