// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant records and the domain routing index.

use redb::ReadableTable;

use super::super::database::{StoreError, StoreResult};
use super::super::tables::{decode, Access, ReadWrite, Tables};
use crate::models::{Tenant, TenantId};

impl<A: Access> Tables<A> {
    /// Get a tenant by ID.
    pub fn tenant(&self, id: &TenantId) -> StoreResult<Option<Tenant>> {
        let key = id.to_string();
        match self.tenants.get(key.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get the tenant routed from a normalized domain.
    pub fn tenant_by_domain(&self, domain: &str) -> StoreResult<Option<Tenant>> {
        let tenant_id = match self.tenant_domains.get(domain)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        match self.tenants.get(tenant_id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Err(StoreError::Corrupt(format!(
                "domain {domain} routes to missing tenant {tenant_id}"
            ))),
        }
    }

    /// List all tenants ordered by domain.
    pub fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let mut tenants = Vec::new();
        for entry in self.tenants.iter()? {
            let (_, value) = entry?;
            tenants.push(decode::<Tenant>(value.value())?);
        }
        tenants.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(tenants)
    }
}

impl Tables<ReadWrite<'_>> {
    /// Insert or update a tenant and its routing entry.
    ///
    /// The caller checks domain uniqueness; a changed domain releases the
    /// previous routing key.
    pub fn put_tenant(&mut self, tenant: &Tenant) -> StoreResult<()> {
        let key = tenant.id.to_string();
        let previous_domain = match self.tenants.get(key.as_str())? {
            Some(value) => Some(decode::<Tenant>(value.value())?.domain),
            None => None,
        };
        if let Some(previous) = previous_domain.filter(|d| d != &tenant.domain) {
            self.tenant_domains.remove(previous.as_str())?;
        }

        let json = serde_json::to_vec(tenant)?;
        self.tenants.insert(key.as_str(), json.as_slice())?;
        self.tenant_domains
            .insert(tenant.domain.as_str(), key.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PointStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn temp_store() -> (PointStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        (store, dir)
    }

    fn tenant(domain: &str) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: TenantId::new(),
            name: format!("Site {domain}"),
            domain: domain.to_string(),
            default_cost: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn put_and_lookup_by_id_and_domain() {
        let (store, _dir) = temp_store();
        let site = tenant("a.example.com");
        store
            .write(|t| t.put_tenant(&site))
            .unwrap();

        let by_id = store.read(|t| t.tenant(&site.id)).unwrap().unwrap();
        assert_eq!(by_id, site);
        let by_domain = store
            .read(|t| t.tenant_by_domain("a.example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_domain.id, site.id);
        assert!(store
            .read(|t| t.tenant_by_domain("b.example.com"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn domain_change_releases_old_route() {
        let (store, _dir) = temp_store();
        let mut site = tenant("old.example.com");
        store.write(|t| t.put_tenant(&site)).unwrap();

        site.domain = "new.example.com".to_string();
        store.write(|t| t.put_tenant(&site)).unwrap();

        assert!(store
            .read(|t| t.tenant_by_domain("old.example.com"))
            .unwrap()
            .is_none());
        assert!(store
            .read(|t| t.tenant_by_domain("new.example.com"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn list_is_sorted_by_domain() {
        let (store, _dir) = temp_store();
        for domain in ["z.example", "a.example", "m.example"] {
            let site = tenant(domain);
            store.write(|t| t.put_tenant(&site)).unwrap();
        }
        let domains: Vec<String> = store
            .read(|t| t.list_tenants())
            .unwrap()
            .into_iter()
            .map(|t| t.domain)
            .collect();
        assert_eq!(domains, vec!["a.example", "m.example", "z.example"]);
    }
}
