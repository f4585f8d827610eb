//! Downstream propagation of committed changes
//!
//! The [`SyncWorker`] drains the reconciler's change feed and pushes every
//! [`ZoneChange`] to a [`ZoneSync`] target. Failed pushes are retried with a
//! short delay; a change that still fails is parked in a backlog and re-pushed
//! every `resync_interval` until the target accepts it. Later changes of a
//! domain with parked changes queue behind them, so each domain is pushed in
//! commit order. On success the domain's `published` timestamp is advanced.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::traits::{RrsetStore, ZoneChange, ZoneSync};

/// Background consumer of the change feed
pub struct SyncWorker {
    changes: UnboundedReceiverStream<ZoneChange>,
    publisher: Publisher,
    resync_interval: Duration,
}

struct Publisher {
    sync: Arc<dyn ZoneSync>,
    store: Arc<dyn RrsetStore>,
    max_retries: usize,
    retry_delay: Duration,
    /// Changes the target refused, oldest first
    backlog: VecDeque<ZoneChange>,
}

impl SyncWorker {
    /// Create a worker for the receiver returned by `Reconciler::new`
    pub fn new(
        changes: mpsc::UnboundedReceiver<ZoneChange>,
        sync: Arc<dyn ZoneSync>,
        store: Arc<dyn RrsetStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            changes: UnboundedReceiverStream::new(changes),
            publisher: Publisher {
                sync,
                store,
                max_retries: config.max_retries,
                retry_delay: config.retry_delay(),
                backlog: VecDeque::new(),
            },
            resync_interval: config.resync_interval(),
        }
    }

    /// Run until every sender is gone
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run until every sender is gone or `shutdown_rx` fires
    ///
    /// Changes already queued when the signal arrives are still pushed, and
    /// the backlog gets one last round of retries before the worker stops.
    pub async fn run_with_shutdown(self, mut shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let SyncWorker {
            mut changes,
            mut publisher,
            resync_interval,
        } = self;
        info!("Sync worker started (target: {})", publisher.sync.name());

        let mut resync = tokio::time::interval_at(Instant::now() + resync_interval, resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                change = changes.next() => match change {
                    Some(change) => publisher.accept(change).await,
                    None => break,
                },

                _ = resync.tick(), if !publisher.backlog.is_empty() => {
                    publisher.resync(0).await;
                }

                _ = shutdown_signal(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                    changes.close();
                    while let Some(change) = changes.next().await {
                        publisher.accept(change).await;
                    }
                    break;
                }
            }
        }

        publisher.resync(publisher.max_retries).await;
        if !publisher.backlog.is_empty() {
            error!(
                "Sync worker stopping with {} change(s) not accepted by {}",
                publisher.backlog.len(),
                publisher.sync.name()
            );
        }

        publisher.store.flush().await?;
        info!("Sync worker stopped");
        Ok(())
    }
}

/// Resolves once the signal fires; never without a receiver
async fn shutdown_signal(rx: &mut Option<oneshot::Receiver<()>>) {
    match rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => std::future::pending().await,
    }
}

impl Publisher {
    /// Push a fresh change, or queue it behind its domain's parked changes
    async fn accept(&mut self, change: ZoneChange) {
        if self.backlog.iter().any(|parked| parked.domain == change.domain) {
            debug!(domain = %change.domain, "Queued behind unpublished changes");
            self.backlog.push_back(change);
            return;
        }

        if !self.publish(&change, self.max_retries).await {
            warn!(
                domain = %change.domain,
                "Parking change after {} retries, will re-push", self.max_retries
            );
            self.backlog.push_back(change);
        }
    }

    /// Re-push the backlog in order, keeping whatever still fails
    async fn resync(&mut self, retries: usize) {
        let pending = std::mem::take(&mut self.backlog);
        let mut blocked = HashSet::new();

        for change in pending {
            if blocked.contains(&change.domain) || !self.publish(&change, retries).await {
                blocked.insert(change.domain.clone());
                self.backlog.push_back(change);
            }
        }

        if !self.backlog.is_empty() {
            debug!(parked = self.backlog.len(), "Backlog still pending");
        }
    }

    /// Returns whether the target accepted the change
    async fn publish(&self, change: &ZoneChange, retries: usize) -> bool {
        let mut last_error: Option<Error> = None;
        for attempt in 0..=retries {
            match self.sync.push(change).await {
                Ok(()) => {
                    debug!(
                        domain = %change.domain,
                        changes = change.changes.len(),
                        "Pushed to {}", self.sync.name()
                    );
                    // the domain may have been deleted since
                    if let Err(e) = self.store.mark_published(&change.domain, change.committed_at).await {
                        debug!(domain = %change.domain, "Not marking published: {}", e);
                    }
                    return true;
                }
                Err(e) => {
                    warn!(domain = %change.domain, "Push attempt {} failed: {}", attempt, e);
                    last_error = Some(e);

                    if attempt < retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        if let Some(e) = last_error {
            debug!(domain = %change.domain, "Push gave up after {} retries: {}", retries, e);
        }
        false
    }
}
