//! Reward cache - the process-local dual index over markers
//!
//! Both indices live in one struct behind one `RwLock`, so a reader sees
//! either the state before a mutation or the state after it, never one index
//! updated without the other. Readers share the lock; writers hold it only
//! for the time needed to swap entries.
//!
//! The cache never talks to the store.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::{marker_key, BlockLocation, Marker};

#[derive(Debug, Default)]
struct Indices {
    /// Lowercased id -> marker
    by_id: HashMap<String, Arc<Marker>>,
    /// Block -> marker
    by_location: HashMap<BlockLocation, Arc<Marker>>,
}

impl Indices {
    fn remove_key(&mut self, key: &str) -> Option<Arc<Marker>> {
        let marker = self.by_id.remove(key)?;
        // Only drop the location entry if it still belongs to this marker
        if self
            .by_location
            .get(marker.location())
            .is_some_and(|m| m.key() == key)
        {
            self.by_location.remove(marker.location());
        }
        Some(marker)
    }

    fn insert(&mut self, marker: Arc<Marker>) -> Vec<Arc<Marker>> {
        let mut displaced = Vec::new();
        let key = marker.key();

        if let Some(old) = self.remove_key(&key) {
            displaced.push(old);
        }
        if let Some(occupant) = self.by_location.get(marker.location()).cloned() {
            self.remove_key(&occupant.key());
            displaced.push(occupant);
        }

        self.by_location
            .insert(marker.location().clone(), marker.clone());
        self.by_id.insert(key, marker);
        displaced
    }
}

/// Concurrency-safe index of markers by identifier and by location
#[derive(Debug, Default)]
pub struct RewardCache {
    inner: RwLock<Indices>,
}

impl RewardCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker at the exact block, if any
    pub fn get_by_location(&self, location: &BlockLocation) -> Option<Arc<Marker>> {
        self.inner.read().by_location.get(location).cloned()
    }

    /// Marker at `world x y z`, if any
    pub fn get_at(&self, world: &str, x: i32, y: i32, z: i32) -> Option<Arc<Marker>> {
        self.get_by_location(&BlockLocation::new(world, x, y, z))
    }

    /// Marker by identifier (case-insensitive)
    pub fn get_by_id(&self, id: &str) -> Option<Arc<Marker>> {
        self.inner.read().by_id.get(&marker_key(id)).cloned()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(&marker_key(id))
    }

    /// Point-in-time copy of every marker, ordered by identifier
    pub fn all(&self) -> Vec<Arc<Marker>> {
        let mut markers: Vec<Arc<Marker>> = self.inner.read().by_id.values().cloned().collect();
        markers.sort_by_key(|m| m.key());
        markers
    }

    /// Snapshot of the lowercased identifiers
    pub fn ids(&self) -> HashSet<String> {
        self.inner.read().by_id.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Insert a marker into both indices.
    ///
    /// An entry with the same identifier, or any marker occupying the same
    /// block, is evicted first and returned.
    pub fn put(&self, marker: impl Into<Arc<Marker>>) -> Vec<Arc<Marker>> {
        let marker = marker.into();
        let displaced = self.inner.write().insert(marker.clone());
        if !displaced.is_empty() {
            tracing::debug!(
                "Cache put {} displaced {} entr{}",
                marker.id(),
                displaced.len(),
                if displaced.len() == 1 { "y" } else { "ies" }
            );
        }
        displaced
    }

    /// Remove a marker from both indices; true if it was present
    pub fn remove(&self, marker: &Marker) -> bool {
        self.remove_by_id(marker.id()).is_some()
    }

    /// Remove by identifier (case-insensitive)
    pub fn remove_by_id(&self, id: &str) -> Option<Arc<Marker>> {
        self.inner.write().remove_key(&marker_key(id))
    }

    /// Remove `marker` only if the cache still holds this very entry.
    ///
    /// Used by reconciliation so an entry put after its snapshot survives.
    pub fn remove_if_current(&self, marker: &Arc<Marker>) -> bool {
        let mut inner = self.inner.write();
        let current = inner
            .by_id
            .get(&marker.key())
            .is_some_and(|m| Arc::ptr_eq(m, marker));
        if current {
            inner.remove_key(&marker.key());
        }
        current
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.by_location.clear();
    }

    /// Swap the whole content for `markers` in one step
    pub fn replace_all<I>(&self, markers: I)
    where
        I: IntoIterator<Item = Marker>,
    {
        let mut fresh = Indices::default();
        for marker in markers {
            fresh.insert(Arc::new(marker));
        }
        *self.inner.write() = fresh;
    }

    /// Both indices agree on membership and content
    pub fn is_consistent(&self) -> bool {
        let inner = self.inner.read();
        inner.by_id.len() == inner.by_location.len()
            && inner.by_id.iter().all(|(key, marker)| {
                *key == marker.key()
                    && inner
                        .by_location
                        .get(marker.location())
                        .is_some_and(|m| Arc::ptr_eq(m, marker))
            })
    }
}
