// src/batcher/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{Batcher, CheckOutcome};

const MIN_RECHECK: Duration = Duration::from_secs(1);

impl Batcher {
    /// Sleeps until the thread's next deadline and re-checks, flushing as often
    /// as needed, until the buffer is empty. At most one watcher per lead;
    /// `None` if one is already running, in which case that watcher will see
    /// the new message before it exits.
    pub fn spawn_recheck(self: &Arc<Self>, lead_id: Uuid) -> Option<JoinHandle<()>> {
        if !self.watch(lead_id) {
            return None;
        }
        let batcher = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match batcher.check_thread(lead_id, Utc::now()).await {
                    Ok(CheckOutcome::Waiting { recheck_at }) => {
                        let delay = (recheck_at - Utc::now())
                            .to_std()
                            .unwrap_or(MIN_RECHECK)
                            .max(MIN_RECHECK);
                        tokio::time::sleep(delay).await;
                    }
                    // messages may have landed while the thread was processing
                    Ok(CheckOutcome::Flushed(_)) => continue,
                    Ok(CheckOutcome::Empty) => {
                        if batcher.release_if_idle(lead_id) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "batcher", lead_id = %lead_id, error = %e, "re-check failed");
                        batcher.unwatch(lead_id);
                        break;
                    }
                }
            }
        }))
    }

    /// Periodic safety net for threads whose watcher was lost (e.g. restart).
    pub fn spawn_sweep(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let batcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = batcher.sweep_stale(Utc::now()).await {
                    tracing::warn!(target: "batcher", error = %e, "sweep failed");
                }
            }
        })
    }
}
