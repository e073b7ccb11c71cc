//! Selection sessions: operators who started creating a marker and still
//! have to pick its block
//!
//! One session per actor; starting a new one replaces the old. Sessions
//! expire after the configured timeout and are swept every second.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use treasure_core::{ActorId, PeriodicTask};

/// How often expired sessions are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A pending marker creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSession {
    pub marker_id: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
}

impl SelectionSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Sent when a session is swept after timing out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionExpired {
    pub actor: ActorId,
    pub marker_id: String,
}

/// Tracks selection sessions per actor
#[derive(Debug)]
pub struct SelectionTracker {
    sessions: DashMap<ActorId, SelectionSession>,
    timeout: Duration,
    expired_tx: broadcast::Sender<SelectionExpired>,
    sweeper: Mutex<Option<PeriodicTask>>,
}

impl SelectionTracker {
    pub fn new(timeout: Duration) -> Self {
        let (expired_tx, _) = broadcast::channel(64);
        Self {
            sessions: DashMap::new(),
            timeout,
            expired_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Notifications for swept sessions
    pub fn subscribe(&self) -> broadcast::Receiver<SelectionExpired> {
        self.expired_tx.subscribe()
    }

    /// Begin a selection, replacing any the actor already had
    pub fn start(&self, actor: &ActorId, marker_id: &str, action: &str) -> SelectionSession {
        // Timeouts past chrono's range never expire
        let expires_at = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let session = SelectionSession {
            marker_id: marker_id.to_string(),
            action: action.to_string(),
            expires_at,
        };

        if let Some(previous) = self.sessions.insert(actor.clone(), session.clone()) {
            tracing::debug!(
                "Selection for {} replaced ('{}' -> '{}')",
                actor,
                previous.marker_id,
                marker_id
            );
        }
        tracing::debug!("Selection started by {} for '{}'", actor, marker_id);
        session
    }

    /// Whether the actor has a live session; an expired one is dropped
    pub fn is_selecting(&self, actor: &ActorId) -> bool {
        self.sessions.remove_if(actor, |_, s| s.is_expired());
        self.sessions.contains_key(actor)
    }

    /// Consume the actor's live session
    pub fn take(&self, actor: &ActorId) -> Option<SelectionSession> {
        let (_, session) = self.sessions.remove(actor)?;
        (!session.is_expired()).then_some(session)
    }

    /// Drop the actor's session; true if there was one
    pub fn cancel(&self, actor: &ActorId) -> bool {
        let cancelled = self.sessions.remove(actor).is_some();
        if cancelled {
            tracing::debug!("Selection cancelled for {}", actor);
        }
        cancelled
    }

    /// Remove expired sessions and announce each one
    pub fn sweep_expired(&self) -> usize {
        let expired: Vec<ActorId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for actor in expired {
            // Re-checked: the actor may have started a fresh session meanwhile
            if let Some((actor, session)) = self.sessions.remove_if(&actor, |_, s| s.is_expired()) {
                count += 1;
                let _ = self.expired_tx.send(SelectionExpired {
                    actor,
                    marker_id: session.marker_id,
                });
            }
        }

        if count > 0 {
            tracing::debug!("Swept {} expired selection(s)", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start sweeping every `period`; false if already sweeping
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> bool {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return false;
        }
        let this = Arc::downgrade(self);
        *sweeper = Some(PeriodicTask::spawn("selection sweep", period, move || {
            let this = this.clone();
            async move {
                if let Some(this) = this.upgrade() {
                    this.sweep_expired();
                }
            }
        }));
        true
    }

    /// Stop sweeping and forget every session
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
        self.sessions.clear();
    }
}
