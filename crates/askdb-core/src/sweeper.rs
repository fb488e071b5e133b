//! Background eviction of idle sessions.

use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to the periodic sweep task.
pub struct SessionSweeper {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    /// Start sweeping `store` every `interval`, evicting sessions idle longer
    /// than `timeout`. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<SessionStore>, interval: Duration, timeout: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep(timeout);
                        debug!(
                            target: "askdb::session",
                            "Sweep finished: {} removed, {} live",
                            removed,
                            store.len()
                        );
                    }
                    _ = &mut shutdown_rx => {
                        debug!(target: "askdb::session", "Session sweeper stopping");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(target: "askdb::session", "Session sweeper task failed: {}", e);
        }
    }
}
