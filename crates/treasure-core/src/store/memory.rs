//! In-memory [`MarkerStore`] for tests and single-node experiments
//!
//! Enforces the same constraints as the SQLite schema (unique id, unique
//! block, unique claim pair, cascading delete) and can be switched offline
//! to exercise the failure paths.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{ClaimInsert, MarkerStore, SaveOutcome};
use crate::error::{Result, TreasureError};
use crate::types::{self, marker_key, ActorId, ClaimEntry, Marker};

#[derive(Debug, Default)]
struct Tables {
    /// Lowercased id -> marker
    markers: BTreeMap<String, Marker>,
    /// (lowercased marker id, actor, claimed at) in insertion order
    claims: Vec<(String, ActorId, types::Timestamp)>,
}

/// Store held entirely in process memory
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    online: AtomicBool,
    loads: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            online: AtomicBool::new(true),
            loads: AtomicUsize::new(0),
        }
    }

    /// Store pre-populated with markers
    pub fn with_markers<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = Marker>,
    {
        let store = Self::new();
        {
            let mut tables = store.tables.lock();
            for marker in markers {
                tables.markers.insert(marker.key(), marker);
            }
        }
        store
    }

    /// Take the store offline (every call fails) or bring it back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// How many full loads have been served
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn marker_count(&self) -> usize {
        self.tables.lock().markers.len()
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TreasureError::StoreUnavailable(
                "memory store is offline".to_string(),
            ))
        }
    }
}

impl MarkerStore for MemoryStore {
    fn load_all_markers(&self) -> Result<Vec<Marker>> {
        self.check_online()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.lock().markers.values().cloned().collect())
    }

    fn save_marker(&self, marker: &Marker) -> Result<SaveOutcome> {
        self.check_online()?;
        let mut tables = self.tables.lock();
        let taken = tables.markers.contains_key(&marker.key())
            || tables
                .markers
                .values()
                .any(|m| m.location() == marker.location());
        if taken {
            return Ok(SaveOutcome::AlreadyExists);
        }
        tables.markers.insert(marker.key(), marker.clone());
        Ok(SaveOutcome::Saved)
    }

    fn delete_marker(&self, id: &str) -> Result<bool> {
        self.check_online()?;
        let key = marker_key(id);
        let mut tables = self.tables.lock();
        let removed = tables.markers.remove(&key).is_some();
        if removed {
            tables.claims.retain(|(marker, _, _)| *marker != key);
        }
        Ok(removed)
    }

    fn has_claim(&self, actor: &ActorId, marker_id: &str) -> Result<bool> {
        self.check_online()?;
        let key = marker_key(marker_id);
        Ok(self
            .tables
            .lock()
            .claims
            .iter()
            .any(|(marker, a, _)| *marker == key && a == actor))
    }

    fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert> {
        self.check_online()?;
        let key = marker_key(marker_id);
        let mut tables = self.tables.lock();
        if !tables.markers.contains_key(&key) {
            return Err(TreasureError::NotFound(format!("marker '{}'", marker_id)));
        }
        if tables
            .claims
            .iter()
            .any(|(marker, a, _)| *marker == key && a == actor)
        {
            return Ok(ClaimInsert::Duplicate);
        }
        tables.claims.push((key, actor.clone(), types::now()));
        Ok(ClaimInsert::Inserted)
    }

    fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
        self.check_online()?;
        let key = marker_key(marker_id);
        let mut entries: Vec<ClaimEntry> = self
            .tables
            .lock()
            .claims
            .iter()
            .filter(|(marker, _, _)| *marker == key)
            .map(|(_, actor, at)| ClaimEntry {
                actor_id: actor.clone(),
                claimed_at: *at,
            })
            .collect();
        // Stable: equal timestamps keep insertion order
        entries.sort_by_key(|c| c.claimed_at);
        Ok(entries)
    }
}
