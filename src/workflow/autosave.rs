//! Periodic draft flush for sessions whose last write failed, followed by
//! eviction of sessions that no longer need to stay in memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SessionRegistry;

/// Running autosave timer. Dropping it leaves the task running until the
/// runtime shuts down; call `shutdown` for a final flush.
pub struct AutosaveHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub fn spawn_autosave(registry: Arc<SessionRegistry>, every: Duration) -> AutosaveHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let written = registry.flush_all();
                    if written > 0 {
                        tracing::info!(written, "Autosave flushed pending drafts");
                    }
                    let evicted = registry.evict_idle();
                    if evicted > 0 {
                        tracing::debug!(evicted, "Dropped finished or idle sessions");
                    }
                }
                _ = &mut shutdown_rx => {
                    let written = registry.flush_all();
                    tracing::info!(written, "Autosave stopped");
                    break;
                }
            }
        }
    });

    tracing::debug!(interval_ms = every.as_millis() as u64, "Autosave timer started");
    AutosaveHandle { shutdown_tx, task }
}

impl AutosaveHandle {
    /// Stop the timer after one last flush.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Autosave task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DraftStore;
    use crate::models::enums::ReviewStep;
    use crate::pipeline::validation::ValidationContext;
    use crate::workflow::session::test_support::FlakyStore;
    use crate::workflow::WorkflowMessage;

    #[tokio::test]
    async fn timer_retries_failed_writes() {
        let store = Arc::new(FlakyStore::new());
        let registry = Arc::new(SessionRegistry::new(store.clone(), ValidationContext::default()));
        let session = registry.open("s1").unwrap();

        store.set_failing(true);
        session.dispatch(WorkflowMessage::Next).unwrap();
        store.set_failing(false);

        let handle = spawn_autosave(registry, Duration::from_millis(10));
        for _ in 0..100 {
            if !session.is_dirty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        assert!(!session.is_dirty());
        assert_eq!(store.get_draft("s1").unwrap().unwrap().step, ReviewStep::PatientInfo);
    }

    #[tokio::test]
    async fn timer_evicts_idle_sessions() {
        let store = Arc::new(FlakyStore::new());
        let registry = Arc::new(
            SessionRegistry::new(store, ValidationContext::default())
                .with_idle_timeout(Duration::ZERO),
        );
        registry.open("s1").unwrap();

        let handle = spawn_autosave(registry.clone(), Duration::from_millis(10));
        for _ in 0..100 {
            if registry.get("s1").unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        assert!(registry.get("s1").unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_does_a_final_flush() {
        let store = Arc::new(FlakyStore::new());
        let registry = Arc::new(SessionRegistry::new(store.clone(), ValidationContext::default()));
        let session = registry.open("s1").unwrap();
        let handle = spawn_autosave(registry, Duration::from_secs(3600));

        store.set_failing(true);
        session.dispatch(WorkflowMessage::Next).unwrap();
        store.set_failing(false);

        handle.shutdown().await;
        assert!(!session.is_dirty());
    }
}
