// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves `(instance_id, system_name)` to a stable `(system_id, site_id)`,
//! backed by a read-mostly cache consistent with the store.

use parking_lot::RwLock;
use relay_core::domain::{InstanceId, SiteId, SystemId, SystemKind};
use relay_storage::{IdentityCacheRow, Store, StoreError};
use std::collections::HashMap;
use std::sync::Arc;

type CacheKey = (InstanceId, String);

/// Many-reader/single-writer identity cache in front of the store.
pub struct IdentityResolver {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<CacheKey, (SystemId, SiteId)>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, cache: RwLock::new(HashMap::new()) }
    }

    /// Populate the cache from the store. Returns `true` if any rows were
    /// found — a fresh install has none, which the Warmup Gate uses to
    /// decide whether to buffer.
    pub async fn load_cache(&self) -> Result<bool, StoreError> {
        let rows: Vec<IdentityCacheRow> = self.store.load_identity_cache().await?;
        let found = !rows.is_empty();
        let mut cache = self.cache.write();
        for row in rows {
            cache.insert((row.instance_id, row.system_name), (row.system_id, row.site_id));
        }
        Ok(found)
    }

    /// Resolve `(instance_id, system_name)`, creating the system/site rows
    /// on first sight. `kind` carries any `(sysid, wacn)` the caller
    /// observed, used for the P25 matching rule.
    pub async fn resolve(
        &self,
        instance_id: &InstanceId,
        system_name: &str,
        kind: SystemKind,
    ) -> Result<(SystemId, SiteId), StoreError> {
        let key = (instance_id.clone(), system_name.to_string());
        if let Some(ids) = self.cache.read().get(&key).copied() {
            return Ok(ids);
        }

        // Miss path: upsert instance, resolve/create system, resolve/create
        // site, then double-check the cache before inserting (another
        // writer may have beaten us to it).
        self.store.upsert_instance(instance_id, 0).await?;
        let system_id = self.store.resolve_system(instance_id, system_name, kind).await?;
        let site_id = self.store.resolve_site(system_id, instance_id, system_name).await?;

        let mut cache = self.cache.write();
        let ids = *cache.entry(key).or_insert((system_id, site_id));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::MemStore;

    fn instance() -> InstanceId {
        InstanceId::from("site-a")
    }

    #[tokio::test]
    async fn resolve_is_idempotent_for_same_instance_and_name() {
        let store: Arc<dyn Store> = Arc::new(MemStore::in_memory());
        let resolver = IdentityResolver::new(store);

        let kind = SystemKind::P25Trunked { sysid: Some(1), wacn: Some(2) };
        let (sys1, site1) = resolver.resolve(&instance(), "metro", kind.clone()).await.unwrap();
        let (sys2, site2) = resolver.resolve(&instance(), "metro", kind).await.unwrap();
        assert_eq!(sys1, sys2);
        assert_eq!(site1, site2);
    }

    #[tokio::test]
    async fn load_cache_reports_whether_any_rows_existed() {
        let store: Arc<dyn Store> = Arc::new(MemStore::in_memory());
        let resolver = IdentityResolver::new(Arc::clone(&store));
        assert!(!resolver.load_cache().await.unwrap());

        resolver.resolve(&instance(), "metro", SystemKind::Conventional).await.unwrap();

        let resolver2 = IdentityResolver::new(store);
        assert!(resolver2.load_cache().await.unwrap());
    }
}
