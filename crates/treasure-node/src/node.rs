//! Node: one server process wired to the shared store
//!
//! Services are built once at start and handed to each other; nothing is
//! global. Background work (reconciliation, selection sweep, event logging)
//! stops on [`Node::shutdown`].

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use treasure_core::store::{MarkerStore, SqliteStore, StoreHandle};
use treasure_core::{CacheEvent, ClaimCoordinator, MarkerService, Reconciler, RewardCache};

use crate::config::NodeConfig;
use crate::interaction::{ActionExecutor, InteractionHandler};
use crate::selection::{SelectionTracker, SWEEP_INTERVAL};
use crate::Result;

/// A running node
pub struct Node {
    config: NodeConfig,
    service: MarkerService,
    reconciler: Arc<Reconciler>,
    selections: Arc<SelectionTracker>,
    interactions: InteractionHandler,
    shutdown_tx: broadcast::Sender<()>,
    event_log: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("markers", &self.service.count())
            .field("selections", &self.selections.len())
            .field("reconciling", &self.reconciler.is_scheduled())
            .finish()
    }
}

impl Node {
    /// Open the configured SQLite store and start
    pub async fn start(config: NodeConfig, executor: Arc<dyn ActionExecutor>) -> Result<Self> {
        config.validate()?;
        let settings = config.database.clone();
        let store = tokio::task::spawn_blocking(move || SqliteStore::open(&settings))
            .await
            .map_err(treasure_core::TreasureError::from)??;
        tracing::info!("Store open at {}", config.database.path.display());
        Self::with_store(config, Arc::new(store), executor).await
    }

    /// Start on an already opened store
    pub async fn with_store(
        config: NodeConfig,
        store: Arc<dyn MarkerStore>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let store = StoreHandle::from_settings(store, &config.database);
        let cache = Arc::new(RewardCache::new());

        let claims = ClaimCoordinator::new(store.clone()).with_log_claims(config.settings.log_claims);
        let service = MarkerService::new(cache.clone(), store.clone(), claims);
        service.load().await?;

        let reconciler = Arc::new(Reconciler::new(cache, store));
        let selections = Arc::new(SelectionTracker::new(config.selection_timeout()));
        let interactions =
            InteractionHandler::new(service.clone(), selections.clone(), executor);
        let (shutdown_tx, _) = broadcast::channel(1);

        let node = Self {
            config,
            service,
            reconciler,
            selections,
            interactions,
            shutdown_tx,
            event_log: Mutex::new(None),
        };

        *node.event_log.lock() = Some(node.spawn_event_log());
        node.reconciler.start(node.config.sync_interval());
        node.selections.start_sweeper(SWEEP_INTERVAL);

        tracing::info!("Node started with {} markers", node.service.count());
        Ok(node)
    }

    fn spawn_event_log(&self) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut cache_events = self.reconciler.subscribe();
        let mut expired = self.selections.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    event = cache_events.recv() => match event {
                        Ok(CacheEvent::Added(m)) => tracing::info!("Marker appeared: {}", m),
                        Ok(CacheEvent::Removed(m)) => tracing::info!("Marker removed: {}", m),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("Event log skipped {} cache events", n)
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = expired.recv() => match event {
                        Ok(e) => tracing::info!(
                            "Selection of {} for '{}' expired",
                            e.actor,
                            e.marker_id
                        ),
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn service(&self) -> &MarkerService {
        &self.service
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn selections(&self) -> &Arc<SelectionTracker> {
        &self.selections
    }

    pub fn interactions(&self) -> &InteractionHandler {
        &self.interactions
    }

    /// Stop background work and drop every selection
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        tracing::info!("Node shutdown initiated");

        self.reconciler.stop().await;
        self.selections.shutdown().await;

        let event_log = self.event_log.lock().take();
        if let Some(handle) = event_log {
            let _ = handle.await;
        }
        tracing::info!("Node stopped");
    }
}
