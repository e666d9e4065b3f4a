// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-tenant resource pricing. Key format: `tenant(16) | resource`.

use redb::ReadableTable;

use super::super::database::{composite_key, prefix_upper_bound, StoreResult};
use super::super::tables::{decode, Access, ReadWrite, Tables};
use crate::models::{PricingEntry, TenantId};

fn pricing_key(tenant_id: &TenantId, resource: &str) -> Vec<u8> {
    composite_key(&[tenant_id.0.as_bytes(), resource.as_bytes()])
}

impl<A: Access> Tables<A> {
    /// Get the pricing entry for a normalized resource.
    pub fn pricing_entry(&self, tenant_id: &TenantId, resource: &str) -> StoreResult<Option<PricingEntry>> {
        let key = pricing_key(tenant_id, resource);
        match self.pricing.get(key.as_slice())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// All pricing entries of a tenant, ordered by resource.
    pub fn list_pricing(&self, tenant_id: &TenantId) -> StoreResult<Vec<PricingEntry>> {
        let prefix = tenant_id.0.as_bytes().as_slice();
        let range = match prefix_upper_bound(prefix) {
            Some(end) => self.pricing.range(prefix..end.as_slice())?,
            None => self.pricing.range(prefix..)?,
        };

        let mut entries = Vec::new();
        for entry in range {
            let (_, value) = entry?;
            entries.push(decode::<PricingEntry>(value.value())?);
        }
        Ok(entries)
    }
}

impl Tables<ReadWrite<'_>> {
    pub fn put_pricing(&mut self, entry: &PricingEntry) -> StoreResult<()> {
        let key = pricing_key(&entry.tenant_id, &entry.resource);
        let json = serde_json::to_vec(entry)?;
        self.pricing.insert(key.as_slice(), json.as_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PointStore;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(tenant_id: TenantId, resource: &str, cost: i64) -> PricingEntry {
        let now = Utc::now();
        PricingEntry {
            id: Uuid::new_v4(),
            tenant_id,
            resource: resource.to_string(),
            cost,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn same_resource_in_two_tenants_is_isolated() {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let priced = entry(tenant_a, "a.zip", 5);
        store.write(|t| t.put_pricing(&priced)).unwrap();

        assert_eq!(
            store.read(|t| t.pricing_entry(&tenant_a, "a.zip")).unwrap().unwrap().cost,
            5
        );
        assert!(store.read(|t| t.pricing_entry(&tenant_b, "a.zip")).unwrap().is_none());
        assert!(store.read(|t| t.list_pricing(&tenant_b)).unwrap().is_empty());
    }

    #[test]
    fn list_is_ordered_by_resource() {
        let dir = TempDir::new().unwrap();
        let store = PointStore::open(&dir.path().join("points.redb")).unwrap();
        let tenant = TenantId::new();
        for (resource, cost) in [("b/2.zip", 2), ("a/1.zip", 1), ("c.iso", 3)] {
            let priced = entry(tenant, resource, cost);
            store.write(|t| t.put_pricing(&priced)).unwrap();
        }
        let resources: Vec<String> = store
            .read(|t| t.list_pricing(&tenant))
            .unwrap()
            .into_iter()
            .map(|e| e.resource)
            .collect();
        assert_eq!(resources, vec!["a/1.zip", "b/2.zip", "c.iso"]);
    }
}
