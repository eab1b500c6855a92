//! Background eviction of expired memory-cache entries
//!
//! Expired entries are already ignored on read; the sweep only keeps keys
//! nobody asks for again from piling up in a long-running process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::MemoryCache;
use crate::clock::Clock;

/// Handle for stopping the background sweep
#[derive(Debug)]
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Spawns a task that evicts expired entries every `interval`
    pub fn spawn(memory: Arc<MemoryCache>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = memory.evict_expired(clock.now());
                        if evicted > 0 {
                            debug!(evicted, remaining = memory.len(), "swept memory cache");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Stops the sweep and waits for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
