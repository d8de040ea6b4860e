use crate::metrics::PluginMetrics;
use crate::zone::{RecordStore, ZoneCache};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Background task that reloads the zone list on a fixed interval
pub struct ZoneRefresher {
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl ZoneRefresher {
    /// Start refreshing `cache` from `store` every `interval`.
    ///
    /// The first reload happens one full interval after spawning. A zero
    /// interval starts nothing.
    pub fn spawn(
        cache: Arc<ZoneCache>,
        store: Arc<dyn RecordStore>,
        metrics: Arc<PluginMetrics>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        if interval.is_zero() {
            info!("Zone refresh disabled");
            return Self {
                shutdown_tx,
                handle: Mutex::new(None),
                interval,
            };
        }

        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Completes immediately; setup already loaded the zones
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.refresh(store.as_ref()).await {
                            Ok(snapshot) => metrics.record_refresh(Some(snapshot.len())),
                            Err(_) => metrics.record_refresh(None),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Zone refresher received shutdown signal");
                        break;
                    }
                }
            }
        });

        info!("Zone refresh every {:?}", interval);
        Self {
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the task and wait for it to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Zone refresher exited abnormally: {}", e);
            }
        }
    }
}

impl Drop for ZoneRefresher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
