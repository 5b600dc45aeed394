//! Background maintenance: the periodic age sweep over the file store.

use crate::error::Result;
use crate::store::FileStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle owning a running sweeper. Dropping the handle closes the
/// shutdown channel and stops the task; [`SweeperHandle::shutdown`] also
/// waits for it to finish.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "sweeper task did not shut down cleanly");
        }
    }
}

/// Spawns the periodic sweeper. The first pass runs immediately, then one
/// pass per `interval` until shutdown. Sweep failures are logged and never
/// kill the task.
pub fn spawn_sweeper(
    store: Arc<dyn FileStore>,
    interval: Duration,
    max_age: Duration,
) -> SweeperHandle {
    let (tx, mut rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), max_age_secs = max_age.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.sweep(max_age).await {
                        Ok(0) => debug!("sweep pass found nothing to remove"),
                        Ok(n) => info!(deleted = n, "sweep pass removed expired files"),
                        Err(e) => warn!(error = %e, "sweep pass failed"),
                    }
                }
                _ = rx.changed() => {
                    info!("sweeper shutting down");
                    break;
                }
            }
        }
    });

    SweeperHandle { shutdown: tx, handle }
}

/// One sweep pass, for process-start or CLI use.
pub async fn sweep_once(store: &dyn FileStore, max_age: Duration) -> Result<usize> {
    store.sweep(max_age).await
}
