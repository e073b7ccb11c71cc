//! Reconciliation Engine
//!
//! Periodically diffs the store's marker set against the [`RewardCache`] and
//! applies the difference, so markers created or deleted by other processes
//! show up here within one interval.
//!
//! One tick:
//! 1. Snapshot the cache and load every marker from the store.
//! 2. Store markers missing from the cache are put and announced as
//!    [`CacheEvent::Added`].
//! 3. Snapshot entries missing from the store are removed and announced as
//!    [`CacheEvent::Removed`].
//! 4. Everything else is left alone.
//!
//! A tick that finds another one still running is skipped, never queued. A
//! failed load leaves the cache untouched until the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cache::RewardCache;
use crate::error::{Result, TreasureError};
use crate::store::StoreHandle;
use crate::task::PeriodicTask;
use crate::types::Marker;

/// Capacity of the cache event channel; slow subscribers miss old events
const EVENT_CAPACITY: usize = 256;

/// A change applied to the cache by reconciliation
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Added(Arc<Marker>),
    Removed(Arc<Marker>),
}

impl CacheEvent {
    pub fn marker(&self) -> &Arc<Marker> {
        match self {
            CacheEvent::Added(m) | CacheEvent::Removed(m) => m,
        }
    }
}

/// What one tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Identifiers put into the cache
    pub added: Vec<String>,
    /// Identifiers removed from the cache
    pub removed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Interval for a configured number of seconds; zero or negative disables
pub fn sync_interval(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Keeps the cache eventually consistent with the store
pub struct Reconciler {
    cache: Arc<RewardCache>,
    store: StoreHandle,
    events: broadcast::Sender<CacheEvent>,
    running: AtomicBool,
    task: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

/// Clears the running flag when a tick ends, even on early return
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Reconciler {
    pub fn new(cache: Arc<RewardCache>, store: StoreHandle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            store,
            events,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Receive every add/remove applied from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Run one tick now.
    ///
    /// Fails with `InvalidState` if a tick is already running, or with the
    /// store error if the load failed; the cache is untouched in both cases.
    pub async fn reconcile_now(&self) -> Result<ReconcileReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TreasureError::InvalidState(
                "reconciliation already running".to_string(),
            ));
        }
        let _guard = TickGuard(&self.running);

        let before = self.cache.all();
        let stored = self.store.load_all_markers().await?;
        Ok(self.apply(before, stored))
    }

    fn apply(&self, before: Vec<Arc<Marker>>, stored: Vec<Marker>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut stored: HashMap<String, Marker> =
            stored.into_iter().map(|m| (m.key(), m)).collect();

        // Definitions that changed under the same id were deleted and
        // re-created elsewhere; treat them as a remove plus an add.
        let mut gone = Vec::new();
        for cached in before {
            match stored.get(&cached.key()) {
                Some(row) if row.same_fields(&cached) => {
                    stored.remove(&cached.key());
                }
                _ => gone.push(cached),
            }
        }

        let mut additions: Vec<Marker> = stored
            .into_values()
            .filter(|m| {
                self.cache
                    .get_by_id(m.id())
                    .map_or(true, |current| !current.same_fields(m))
            })
            .collect();
        additions.sort_by_key(|m| m.key());

        for marker in additions {
            let marker = Arc::new(marker);
            for displaced in self.cache.put(marker.clone()) {
                report.removed.push(displaced.id().to_string());
                self.emit(CacheEvent::Removed(displaced));
            }
            report.added.push(marker.id().to_string());
            self.emit(CacheEvent::Added(marker));
        }

        for marker in gone {
            if self.cache.remove_if_current(&marker) {
                report.removed.push(marker.id().to_string());
                self.emit(CacheEvent::Removed(marker));
            }
        }

        if report.is_empty() {
            tracing::debug!("Reconciliation: cache in sync ({} markers)", self.cache.count());
        } else {
            tracing::info!(
                "Reconciliation: +{} -{} ({} markers)",
                report.added.len(),
                report.removed.len(),
                self.cache.count()
            );
        }
        report
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// One scheduled tick: overlap and load failures are logged, not raised
    async fn tick(&self) {
        match self.reconcile_now().await {
            Ok(_) => {}
            Err(TreasureError::InvalidState(_)) => {
                tracing::debug!("Reconciliation tick skipped: previous tick still running");
            }
            Err(e) => {
                tracing::warn!("Reconciliation failed, retrying next tick: {}", e);
            }
        }
    }

    /// Start the periodic task. Returns false if `period` is `None`
    /// (reconciliation disabled) or the task is already running.
    pub fn start(self: &Arc<Self>, period: Option<Duration>) -> bool {
        let Some(period) = period else {
            tracing::info!("Reconciliation disabled");
            return false;
        };

        let mut task = self.task.lock();
        if task.is_some() {
            return false;
        }

        let this = Arc::downgrade(self);
        *task = Some(PeriodicTask::spawn("reconciliation", period, move || {
            let this = this.clone();
            async move {
                if let Some(this) = this.upgrade() {
                    this.tick().await;
                }
            }
        }));
        tracing::info!("Reconciliation every {:?}", period);
        true
    }

    /// Stop the periodic task, waiting for a running tick to finish
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
            tracing::info!("Reconciliation stopped");
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
