//! Claim Coordinator: at-most-once redemption
//!
//! The existence check is only a fast path that saves a write. The claim
//! insert is what decides: the store's uniqueness constraint on
//! `(marker, actor)` lets exactly one insert through, whichever process it
//! comes from, and every loser is told `AlreadyClaimed`.

use crate::error::TreasureError;
use crate::store::{ClaimInsert, StoreHandle};
use crate::types::{Actor, ClaimEntry, Marker};
use crate::Result;

/// Result of a claim attempt
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The reward is granted; run its one-time side effects now
    Success,
    /// A claim record already exists for this actor
    AlreadyClaimed,
    /// The store could not decide; nothing was granted
    Error(TreasureError),
}

impl ClaimOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClaimOutcome::Success)
    }
}

/// Runs the claim protocol against the shared store
#[derive(Debug, Clone)]
pub struct ClaimCoordinator {
    store: StoreHandle,
    log_claims: bool,
}

impl ClaimCoordinator {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            log_claims: true,
        }
    }

    /// Log every granted claim at info level
    pub fn with_log_claims(mut self, log_claims: bool) -> Self {
        self.log_claims = log_claims;
        self
    }

    /// Try to redeem `marker` for `actor`.
    ///
    /// An actor with bypass skips the existence check and goes straight to
    /// the insert. `Success` is only returned when a new record was written.
    pub async fn claim(&self, actor: &Actor, marker: &Marker) -> ClaimOutcome {
        if !actor.bypass {
            match self.store.has_claim(&actor.id, marker.id()).await {
                Ok(true) => return ClaimOutcome::AlreadyClaimed,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Claim check for {} on {} failed: {}", actor.id, marker.id(), e);
                    return ClaimOutcome::Error(e);
                }
            }
        }

        match self.store.insert_claim(&actor.id, marker.id()).await {
            Ok(ClaimInsert::Inserted) => self.granted(actor, marker),
            // Another process won the race, or a bypass actor already holds it
            Ok(ClaimInsert::Duplicate) => {
                tracing::debug!("Claim on {} rejected for {}: record exists", marker.id(), actor.id);
                ClaimOutcome::AlreadyClaimed
            }
            Err(e) if e.is_constraint_violation() => ClaimOutcome::AlreadyClaimed,
            Err(e) => {
                tracing::warn!("Claim insert for {} on {} failed: {}", actor.id, marker.id(), e);
                ClaimOutcome::Error(e)
            }
        }
    }

    fn granted(&self, actor: &Actor, marker: &Marker) -> ClaimOutcome {
        if self.log_claims {
            tracing::info!(
                "{} ({}) claimed {} at {}{}",
                actor.name,
                actor.id,
                marker.id(),
                marker.location(),
                if actor.bypass { " [bypass]" } else { "" }
            );
        }
        ClaimOutcome::Success
    }

    /// Everyone who claimed `marker_id`, oldest first
    pub async fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
        self.store.list_claims(marker_id).await
    }

    pub async fn claim_count(&self, marker_id: &str) -> Result<usize> {
        self.store.claim_count(marker_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarkerStore, MemoryStore, SaveOutcome};
    use crate::types::{ActorId, BlockLocation};
    use std::sync::Arc;
    use std::time::Duration;

    /// Always answers "no claim yet", like a check that raced another process
    struct StaleCheck(MemoryStore);

    impl MarkerStore for StaleCheck {
        fn load_all_markers(&self) -> Result<Vec<Marker>> {
            self.0.load_all_markers()
        }
        fn save_marker(&self, marker: &Marker) -> Result<SaveOutcome> {
            self.0.save_marker(marker)
        }
        fn delete_marker(&self, id: &str) -> Result<bool> {
            self.0.delete_marker(id)
        }
        fn has_claim(&self, _: &ActorId, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert> {
            self.0.insert_claim(actor, marker_id)
        }
        fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
            self.0.list_claims(marker_id)
        }
    }

    fn gold() -> Marker {
        Marker::new("gold1", BlockLocation::new("overworld", 10, 64, -5), "give %player% gold")
            .unwrap()
    }

    fn coordinator(store: Arc<dyn MarkerStore>) -> ClaimCoordinator {
        ClaimCoordinator::new(StoreHandle::new(store, 4, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_first_claim_wins_repeat_is_rejected() {
        let store = Arc::new(MemoryStore::with_markers([gold()]));
        let claims = coordinator(store);
        let u1 = Actor::new("u1", "Steve");

        assert!(claims.claim(&u1, &gold()).await.is_success());
        assert!(matches!(
            claims.claim(&u1, &gold()).await,
            ClaimOutcome::AlreadyClaimed
        ));
        assert_eq!(claims.claim_count("gold1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_decides_when_check_is_stale() {
        let claims = coordinator(Arc::new(StaleCheck(MemoryStore::with_markers([gold()]))));
        let u1 = Actor::new("u1", "Steve");

        assert!(claims.claim(&u1, &gold()).await.is_success());
        assert!(matches!(
            claims.claim(&u1, &gold()).await,
            ClaimOutcome::AlreadyClaimed
        ));
        assert_eq!(claims.list_claims("gold1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_grant_once() {
        let claims = coordinator(Arc::new(StaleCheck(MemoryStore::with_markers([gold()]))));
        let u1 = Actor::new("u1", "Steve");

        let attempts = (0..16).map(|_| {
            let claims = claims.clone();
            let u1 = u1.clone();
            tokio::spawn(async move { claims.claim(&u1, &gold()).await.is_success() })
        });
        let granted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_distinct_actors_each_claim_once() {
        let claims = coordinator(Arc::new(MemoryStore::with_markers([gold()])));

        assert!(claims.claim(&Actor::new("u1", "a"), &gold()).await.is_success());
        assert!(claims.claim(&Actor::new("u2", "b"), &gold()).await.is_success());

        let listed: Vec<String> = claims
            .list_claims("gold1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.actor_id.0)
            .collect();
        assert_eq!(listed, vec!["u1", "u2"]);
    }

    /// Fails the test if the existence check is consulted
    struct NoCheck(MemoryStore);

    impl MarkerStore for NoCheck {
        fn load_all_markers(&self) -> Result<Vec<Marker>> {
            self.0.load_all_markers()
        }
        fn save_marker(&self, marker: &Marker) -> Result<SaveOutcome> {
            self.0.save_marker(marker)
        }
        fn delete_marker(&self, id: &str) -> Result<bool> {
            self.0.delete_marker(id)
        }
        fn has_claim(&self, _: &ActorId, _: &str) -> Result<bool> {
            Err(TreasureError::InvalidState("existence check consulted".to_string()))
        }
        fn insert_claim(&self, actor: &ActorId, marker_id: &str) -> Result<ClaimInsert> {
            self.0.insert_claim(actor, marker_id)
        }
        fn list_claims(&self, marker_id: &str) -> Result<Vec<ClaimEntry>> {
            self.0.list_claims(marker_id)
        }
    }

    #[tokio::test]
    async fn test_bypass_repeat_claim_is_already_claimed() {
        let claims = coordinator(Arc::new(MemoryStore::with_markers([gold()])));
        let admin = Actor::new("u1", "Admin").with_bypass(true);

        assert!(claims.claim(&admin, &gold()).await.is_success());
        assert!(matches!(
            claims.claim(&admin, &gold()).await,
            ClaimOutcome::AlreadyClaimed
        ));
        assert_eq!(claims.claim_count("gold1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bypass_skips_only_the_existence_check() {
        let claims = coordinator(Arc::new(NoCheck(MemoryStore::with_markers([gold()]))));
        let admin = Actor::new("u1", "Admin").with_bypass(true);

        assert!(claims.claim(&admin, &gold()).await.is_success());
        assert!(matches!(
            claims.claim(&admin, &gold()).await,
            ClaimOutcome::AlreadyClaimed
        ));

        // Without bypass the check runs, and its failure is reported
        match claims.claim(&Actor::new("u2", "Steve"), &gold()).await {
            ClaimOutcome::Error(e) => assert!(matches!(e.root(), TreasureError::InvalidState(_))),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(claims.claim_count("gold1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let store = Arc::new(MemoryStore::with_markers([gold()]));
        store.set_online(false);
        let claims = coordinator(store);

        match claims.claim(&Actor::new("u1", "Steve"), &gold()).await {
            ClaimOutcome::Error(e) => assert!(e.is_store_unavailable()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_claim_on_deleted_marker_is_an_error() {
        let claims = coordinator(Arc::new(MemoryStore::new()));

        match claims.claim(&Actor::new("u1", "Steve"), &gold()).await {
            ClaimOutcome::Error(e) => assert!(matches!(e.root(), TreasureError::NotFound(_))),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
