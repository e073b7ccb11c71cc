//! Marker lifecycle: create, delete, load, and the lookups presentation and
//! command layers call.
//!
//! Writes go to the store first; the cache only changes once the store has
//! accepted them.

use std::sync::Arc;

use crate::cache::RewardCache;
use crate::claims::{ClaimCoordinator, ClaimOutcome};
use crate::error::{Result, TreasureError};
use crate::store::{SaveOutcome, StoreHandle};
use crate::types::{Actor, BlockLocation, ClaimEntry, Marker};

/// Facade over the cache, the store and the claim coordinator
#[derive(Debug, Clone)]
pub struct MarkerService {
    cache: Arc<RewardCache>,
    store: StoreHandle,
    claims: ClaimCoordinator,
}

impl MarkerService {
    pub fn new(cache: Arc<RewardCache>, store: StoreHandle, claims: ClaimCoordinator) -> Self {
        Self {
            cache,
            store,
            claims,
        }
    }

    pub fn cache(&self) -> &Arc<RewardCache> {
        &self.cache
    }

    pub fn claims(&self) -> &ClaimCoordinator {
        &self.claims
    }

    /// Replace the cache with the store's full marker set; returns the count
    pub async fn load(&self) -> Result<usize> {
        let markers = self.store.load_all_markers().await?;
        let count = markers.len();
        self.cache.replace_all(markers);
        tracing::info!("Loaded {} markers", count);
        Ok(count)
    }

    /// Operator-requested full reload
    pub async fn reload(&self) -> Result<usize> {
        tracing::info!("Reloading markers from store");
        self.load().await
    }

    /// Create and persist a marker.
    ///
    /// The cache checks are a fast path; the store's keys decide, and a
    /// rejection there is `AlreadyExists` rather than a store failure.
    pub async fn create(
        &self,
        id: &str,
        location: BlockLocation,
        action: &str,
    ) -> Result<Arc<Marker>> {
        let marker = Marker::new(id, location, action)?;

        if self.cache.exists(id) {
            return Err(TreasureError::AlreadyExists(format!("marker '{}'", id)));
        }
        if let Some(occupant) = self.cache.get_by_location(marker.location()) {
            return Err(TreasureError::AlreadyExists(format!(
                "location {} is taken by '{}'",
                marker.location(),
                occupant.id()
            )));
        }

        match self.store.save_marker(marker.clone()).await? {
            SaveOutcome::Saved => {
                let marker = Arc::new(marker);
                self.cache.put(marker.clone());
                tracing::info!("Created {}", marker);
                Ok(marker)
            }
            SaveOutcome::AlreadyExists => {
                tracing::debug!("Store rejected {}: id or location taken", marker);
                Err(TreasureError::AlreadyExists(format!(
                    "marker '{}' or location {} in store",
                    id,
                    marker.location()
                )))
            }
        }
    }

    /// Delete a marker and, by cascade, its claims.
    ///
    /// If another process deleted it first, the local entry is evicted and
    /// `NotFound` is returned.
    pub async fn delete(&self, id: &str) -> Result<Arc<Marker>> {
        let cached = self
            .cache
            .get_by_id(id)
            .ok_or_else(|| TreasureError::NotFound(format!("marker '{}'", id)))?;

        let deleted = self.store.delete_marker(cached.id()).await?;
        self.cache.remove_if_current(&cached);

        if deleted {
            tracing::info!("Deleted {}", cached);
            Ok(cached)
        } else {
            tracing::debug!("{} was already gone from the store", cached);
            Err(TreasureError::NotFound(format!(
                "marker '{}' was deleted elsewhere",
                id
            )))
        }
    }

    pub async fn claim(&self, actor: &Actor, marker: &Marker) -> ClaimOutcome {
        self.claims.claim(actor, marker).await
    }

    pub async fn list_claims(&self, id: &str) -> Result<Vec<ClaimEntry>> {
        self.claims.list_claims(id).await
    }

    pub async fn claim_count(&self, id: &str) -> Result<usize> {
        self.claims.claim_count(id).await
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Marker>> {
        self.cache.get_by_id(id)
    }

    pub fn get_by_location(&self, location: &BlockLocation) -> Option<Arc<Marker>> {
        self.cache.get_by_location(location)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.cache.exists(id)
    }

    pub fn all(&self) -> Vec<Arc<Marker>> {
        self.cache.all()
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarkerStore, MemoryStore};
    use std::time::Duration;

    fn service(store: Arc<MemoryStore>) -> MarkerService {
        let handle = StoreHandle::new(store, 4, Duration::from_secs(5));
        MarkerService::new(
            Arc::new(RewardCache::new()),
            handle.clone(),
            ClaimCoordinator::new(handle).with_log_claims(false),
        )
    }

    fn spot(x: i32) -> BlockLocation {
        BlockLocation::new("overworld", x, 64, -5)
    }

    #[tokio::test]
    async fn test_create_is_visible_through_both_lookups() {
        let svc = service(Arc::new(MemoryStore::new()));
        let created = svc.create("gold1", spot(10), "give %player% gold").await.unwrap();

        let by_id = svc.get_by_id("GOLD1").unwrap();
        let by_loc = svc.get_by_location(&spot(10)).unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_loc));
        assert!(created.same_fields(&by_id));
        assert_eq!(svc.count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let svc = service(Arc::new(MemoryStore::new()));
        svc.create("gold1", spot(10), "x").await.unwrap();

        let same_id = svc.create("Gold1", spot(11), "x").await.unwrap_err();
        assert!(matches!(same_id, TreasureError::AlreadyExists(_)));

        let same_spot = svc.create("silver1", spot(10), "x").await.unwrap_err();
        assert!(matches!(same_spot, TreasureError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_ids_the_store_cannot_fold() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());

        for id in ["Ärz", "gold 1"] {
            let err = svc.create(id, spot(10), "x").await.unwrap_err();
            assert!(matches!(err, TreasureError::InvalidInput(_)), "{id:?}");
        }
        assert_eq!(svc.count(), 0);
        assert_eq!(store.marker_count(), 0);
    }

    #[tokio::test]
    async fn test_create_race_lost_in_store_is_already_exists() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        // Another process created it; our cache has not caught up
        store
            .save_marker(&Marker::new("gold1", spot(1), "x").unwrap())
            .unwrap();

        let err = svc.create("gold1", spot(10), "x").await.unwrap_err();
        assert!(matches!(err, TreasureError::AlreadyExists(_)));
        assert!(!svc.exists("gold1"));
    }

    #[tokio::test]
    async fn test_create_with_store_down_leaves_cache_alone() {
        let store = Arc::new(MemoryStore::new());
        store.set_online(false);
        let svc = service(store);

        let err = svc.create("gold1", spot(10), "x").await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(svc.count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_marker_and_claims() {
        let svc = service(Arc::new(MemoryStore::new()));
        let marker = svc.create("gold1", spot(10), "x").await.unwrap();
        assert!(svc.claim(&Actor::new("u1", "Steve"), &marker).await.is_success());

        svc.delete("GOLD1").await.unwrap();
        assert!(svc.get_by_id("gold1").is_none());
        assert!(svc.get_by_location(&spot(10)).is_none());
        assert!(svc.list_claims("gold1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let svc = service(Arc::new(MemoryStore::new()));
        assert!(matches!(
            svc.delete("nope").await.unwrap_err(),
            TreasureError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_after_remote_delete_evicts_local_entry() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        svc.create("gold1", spot(10), "x").await.unwrap();
        store.delete_marker("gold1").unwrap();

        let err = svc.delete("gold1").await.unwrap_err();
        assert!(matches!(err, TreasureError::NotFound(_)));
        assert!(!svc.exists("gold1"));
    }

    #[tokio::test]
    async fn test_reload_replaces_cache() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        svc.create("gold1", spot(10), "x").await.unwrap();
        store
            .save_marker(&Marker::new("remote", spot(20), "x").unwrap())
            .unwrap();

        assert_eq!(svc.reload().await.unwrap(), 2);
        assert!(svc.exists("remote"));
        assert_eq!(store.load_count(), 1);
    }
}
