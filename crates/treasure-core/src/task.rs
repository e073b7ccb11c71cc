//! Cancellable periodic background tasks

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A task that runs a body on a fixed interval until stopped.
///
/// The next tick is not started while the body is still running; missed
/// ticks are skipped rather than queued.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `body` every `period`. The first run happens one period after start.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut body: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => body().await,
                }
            }
            tracing::debug!("{} task stopped", name);
        });

        tracing::debug!("{} task started, every {:?}", name, period);
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait for the current run, if any, to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!("{} task ended abnormally: {}", self.name, e);
        }
    }
}
