//! Interaction dispatch: what happens when an actor uses a block
//!
//! An actor with a live selection places the pending marker on the block.
//! Anyone else using a marker's block tries to claim it, and the marker's
//! action runs once per granted claim.

use async_trait::async_trait;
use std::sync::Arc;

use treasure_core::{
    Actor, ActorId, BlockLocation, ClaimOutcome, Marker, MarkerService, TreasureError,
};

use crate::selection::{SelectionSession, SelectionTracker};
use crate::{NodeError, Result};

/// Runs a claimed marker's action (the host's command dispatcher)
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// `command` is the marker's action with the actor placeholder filled in
    async fn execute(&self, actor: &Actor, marker: &Marker, command: &str) -> Result<()>;
}

/// Executor that only logs the rendered command
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

#[async_trait]
impl ActionExecutor for LoggingExecutor {
    async fn execute(&self, actor: &Actor, marker: &Marker, command: &str) -> Result<()> {
        tracing::info!("[{}] {} -> {}", marker.id(), actor.name, command);
        Ok(())
    }
}

/// What an interaction did
#[derive(Debug)]
pub enum InteractionOutcome {
    /// A pending selection placed this marker
    Created(Arc<Marker>),
    /// A pending selection was consumed but the marker could not be created
    CreateFailed(TreasureError),
    /// A pending selection hit a block that already holds this marker
    LocationOccupied(Arc<Marker>),
    /// The claim was granted and the action ran
    Claimed(Arc<Marker>),
    AlreadyClaimed(Arc<Marker>),
    ClaimFailed(Arc<Marker>, TreasureError),
    /// Not a marker block and no selection pending
    Ignored,
}

/// Routes interactions to marker creation or claiming
#[derive(Clone)]
pub struct InteractionHandler {
    service: MarkerService,
    selections: Arc<SelectionTracker>,
    executor: Arc<dyn ActionExecutor>,
}

impl std::fmt::Debug for InteractionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHandler")
            .field("selections", &self.selections.len())
            .finish()
    }
}

impl InteractionHandler {
    pub fn new(
        service: MarkerService,
        selections: Arc<SelectionTracker>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            service,
            selections,
            executor,
        }
    }

    /// Operator starts creating `marker_id`; the next block they use places it
    pub fn begin_create(&self, actor: &ActorId, marker_id: &str, action: &str) -> Result<SelectionSession> {
        // Validate up front so the operator hears about a bad id now
        Marker::new(marker_id, BlockLocation::new("_", 0, 0, 0), action)?;
        if self.service.exists(marker_id) {
            return Err(NodeError::Core(TreasureError::AlreadyExists(format!(
                "marker '{}'",
                marker_id
            ))));
        }
        Ok(self.selections.start(actor, marker_id, action))
    }

    pub async fn on_interact(&self, actor: &Actor, location: &BlockLocation) -> InteractionOutcome {
        if let Some(selection) = self.selections.take(&actor.id) {
            return self.place(actor, location, selection).await;
        }

        let Some(marker) = self.service.get_by_location(location) else {
            return InteractionOutcome::Ignored;
        };

        match self.service.claim(actor, &marker).await {
            ClaimOutcome::Success => {
                let command = marker.render_action(&actor.name);
                if let Err(e) = self.executor.execute(actor, &marker, &command).await {
                    // The claim is recorded; the reward is not retried
                    tracing::error!("Action for {} on {} failed: {}", actor.id, marker.id(), e);
                }
                InteractionOutcome::Claimed(marker)
            }
            ClaimOutcome::AlreadyClaimed => InteractionOutcome::AlreadyClaimed(marker),
            ClaimOutcome::Error(e) => InteractionOutcome::ClaimFailed(marker, e),
        }
    }

    async fn place(
        &self,
        actor: &Actor,
        location: &BlockLocation,
        selection: SelectionSession,
    ) -> InteractionOutcome {
        if let Some(occupant) = self.service.get_by_location(location) {
            tracing::debug!("{} picked occupied block {}", actor.id, location);
            return InteractionOutcome::LocationOccupied(occupant);
        }

        match self
            .service
            .create(&selection.marker_id, location.clone(), &selection.action)
            .await
        {
            Ok(marker) => InteractionOutcome::Created(marker),
            Err(e) => {
                tracing::warn!("Creating '{}' for {} failed: {}", selection.marker_id, actor.id, e);
                InteractionOutcome::CreateFailed(e)
            }
        }
    }

    /// Actor left: forget their selection
    pub fn on_disconnect(&self, actor: &ActorId) -> bool {
        self.selections.cancel(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use treasure_core::store::{MemoryStore, StoreHandle};
    use treasure_core::{ClaimCoordinator, RewardCache};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ActionExecutor for Recorder {
        async fn execute(&self, _: &Actor, _: &Marker, command: &str) -> Result<()> {
            self.0.lock().push(command.to_string());
            Ok(())
        }
    }

    fn handler() -> (InteractionHandler, Arc<Recorder>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let handle = StoreHandle::new(store.clone(), 2, Duration::from_secs(5));
        let service = MarkerService::new(
            Arc::new(RewardCache::new()),
            handle.clone(),
            ClaimCoordinator::new(handle).with_log_claims(false),
        );
        let recorder = Arc::new(Recorder::default());
        let handler = InteractionHandler::new(
            service,
            Arc::new(SelectionTracker::new(Duration::from_secs(30))),
            recorder.clone(),
        );
        (handler, recorder, store)
    }

    fn spot() -> BlockLocation {
        BlockLocation::new("overworld", 10, 64, -5)
    }

    #[tokio::test]
    async fn test_select_then_claim() {
        let (handler, recorder, _) = handler();
        let admin = Actor::new("admin", "Admin");
        let steve = Actor::new("u1", "Steve");

        handler
            .begin_create(&admin.id, "gold1", "give %player% gold")
            .unwrap();
        assert!(matches!(
            handler.on_interact(&admin, &spot()).await,
            InteractionOutcome::Created(_)
        ));

        assert!(matches!(
            handler.on_interact(&steve, &spot()).await,
            InteractionOutcome::Claimed(_)
        ));
        assert!(matches!(
            handler.on_interact(&steve, &spot()).await,
            InteractionOutcome::AlreadyClaimed(_)
        ));
        assert_eq!(*recorder.0.lock(), vec!["give Steve gold".to_string()]);
    }

    #[tokio::test]
    async fn test_selection_on_occupied_block() {
        let (handler, _, _) = handler();
        let admin = Actor::new("admin", "Admin");

        handler.begin_create(&admin.id, "gold1", "x").unwrap();
        handler.on_interact(&admin, &spot()).await;
        handler.begin_create(&admin.id, "gold2", "x").unwrap();

        match handler.on_interact(&admin, &spot()).await {
            InteractionOutcome::LocationOccupied(m) => assert_eq!(m.id(), "gold1"),
            other => panic!("unexpected outcome {:?}", other),
        }
        // The selection was consumed
        assert!(matches!(
            handler.on_interact(&admin, &BlockLocation::new("overworld", 0, 0, 0)).await,
            InteractionOutcome::Ignored
        ));
    }

    #[tokio::test]
    async fn test_begin_create_rejects_known_id() {
        let (handler, _, _) = handler();
        let admin = Actor::new("admin", "Admin");
        handler.begin_create(&admin.id, "gold1", "x").unwrap();
        handler.on_interact(&admin, &spot()).await;

        assert!(handler.begin_create(&admin.id, "GOLD1", "x").is_err());
        assert!(handler.begin_create(&admin.id, "", "x").is_err());
    }

    #[tokio::test]
    async fn test_claim_failure_runs_no_action() {
        let (handler, recorder, store) = handler();
        let admin = Actor::new("admin", "Admin");
        handler.begin_create(&admin.id, "gold1", "x").unwrap();
        handler.on_interact(&admin, &spot()).await;

        store.set_online(false);
        assert!(matches!(
            handler.on_interact(&Actor::new("u1", "Steve"), &spot()).await,
            InteractionOutcome::ClaimFailed(..)
        ));
        assert!(recorder.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let (handler, _, store) = handler();
        let admin = Actor::new("admin", "Admin");
        handler.begin_create(&admin.id, "gold1", "x").unwrap();

        store.set_online(false);
        assert!(matches!(
            handler.on_interact(&admin, &spot()).await,
            InteractionOutcome::CreateFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_selection() {
        let (handler, _, _) = handler();
        let admin = Actor::new("admin", "Admin");
        handler.begin_create(&admin.id, "gold1", "x").unwrap();

        assert!(handler.on_disconnect(&admin.id));
        assert!(matches!(
            handler.on_interact(&admin, &spot()).await,
            InteractionOutcome::Ignored
        ));
    }
}
