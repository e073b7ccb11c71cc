//! Persistent Store - the source of truth shared by every node
//!
//! The core only sees the [`MarkerStore`] trait. Store calls block on I/O, so
//! they never run on the event path: [`StoreHandle`] ships each call to
//! tokio's blocking pool, bounded by a semaphore sized like the connection
//! pool and by the configured timeout, and hands back a future.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  ClaimCoordinator / MarkerService / Reconciler       │
//! └───────────────────────┬──────────────────────────────┘
//!                         │ async
//!              ┌──────────▼──────────┐
//!              │     StoreHandle     │  semaphore + timeout
//!              └──────────┬──────────┘
//!                         │ spawn_blocking
//!              ┌──────────▼──────────┐
//!              │  dyn MarkerStore    │  SqliteStore / MemoryStore
//!              └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use treasure_core::store::{SqliteStore, StoreHandle, StoreSettings};
//!
//! # async fn example() -> treasure_core::Result<()> {
//! let settings = StoreSettings::default();
//! let store = SqliteStore::open(&settings)?;
//! let handle = StoreHandle::from_settings(Arc::new(store), &settings);
//! let markers = handle.load_all_markers().await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod settings;
pub mod sqlite;

pub use memory::MemoryStore;
pub use settings::{PoolSettings, StoreSettings, TableNames};
pub use sqlite::SqliteStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{Result, TreasureError};
use crate::types::{ActorId, ClaimEntry, Marker};

/// Outcome of persisting a new marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The identifier or the block is already taken in the store
    AlreadyExists,
}

/// Outcome of recording a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimInsert {
    Inserted,
    /// The (marker, actor) pair already has a record
    Duplicate,
}

/// Operations the core needs from the persistent store.
///
/// Implementations block; call them through [`StoreHandle`]. Write rejections
/// caused by constraints are reported as outcomes, and `Err` is reserved for
/// the store itself failing.
pub trait MarkerStore: Send + Sync + 'static {
    /// Every marker row
    fn load_all_markers(&self) -> Result<Vec<Marker>>;

    /// Insert a new marker row
    fn save_marker(&self, marker: &Marker) -> Result<SaveOutcome>;

    /// Delete a marker row and, by cascade, its claims. False if no row matched.
    fn delete_marker(&self, id: &str) -> Result<bool>;

    fn has_claim(&self, actor: &ActorId, marker_id: &str) -> Result<bool>;

    /// Insert a claim record; the uniqueness constraint decides who wins
    fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert>;

    /// Claims for a marker, oldest first
    fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>>;

    fn claim_count(&self, marker_id: &str) -> Result<usize> {
        Ok(self.list_claims(marker_id)?.len())
    }
}

/// Async front of a [`MarkerStore`]: every call runs on the blocking pool
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn MarkerStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("workers_free", &self.permits.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StoreHandle {
    pub fn new(store: Arc<dyn MarkerStore>, workers: usize, timeout: Duration) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Worker count and timeout taken from the pool settings
    pub fn from_settings(store: Arc<dyn MarkerStore>, settings: &StoreSettings) -> Self {
        Self::new(
            store,
            settings.pool.max_size as usize,
            settings.pool.connection_timeout(),
        )
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MarkerStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let permits = self.permits.clone();

        let call = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TreasureError::StoreUnavailable("store workers closed".to_string()))?;
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                f(store.as_ref())
            });
            task.await?
        };

        // A call that times out may still complete in the background; the
        // store stays the judge of what happened.
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| e.context(op)),
            Err(_) => Err(TreasureError::StoreUnavailable(format!(
                "{} timed out after {}ms",
                op,
                self.timeout.as_millis()
            ))),
        }
    }

    pub async fn load_all_markers(&self) -> Result<Vec<Marker>> {
        self.run("load markers", |s| s.load_all_markers()).await
    }

    pub async fn save_marker(&self, marker: Marker) -> Result<SaveOutcome> {
        self.run("save marker", move |s| s.save_marker(&marker)).await
    }

    pub async fn delete_marker(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run("delete marker", move |s| s.delete_marker(&id)).await
    }

    pub async fn has_claim(&self, actor: &ActorId, marker_id: &str) -> Result<bool> {
        let (actor, marker_id) = (actor.clone(), marker_id.to_string());
        self.run("check claim", move |s| s.has_claim(&actor, &marker_id))
            .await
    }

    pub async fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert> {
        let (actor, marker_id) = (actor.clone(), marker_id.to_string());
        self.run("insert claim", move |s| s.insert_claim(&actor, &marker_id))
            .await
    }

    pub async fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
        let marker_id = marker_id.to_string();
        self.run("list claims", move |s| s.list_claims(&marker_id))
            .await
    }

    pub async fn claim_count(&self, marker_id: &str) -> Result<usize> {
        let marker_id = marker_id.to_string();
        self.run("count claims", move |s| s.claim_count(&marker_id))
            .await
    }
}
