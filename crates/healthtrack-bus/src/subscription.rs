//! Handle over the worker tasks of one subscription.

use std::time::Duration;

use healthtrack_core::Category;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Running subscription: one worker task per topic.
#[derive(Debug)]
pub struct Subscription {
    topics: Vec<Category>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        topics: Vec<Category>,
        shutdown: watch::Sender<bool>,
        workers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            topics,
            shutdown,
            workers,
        }
    }

    /// A subscription that is registered but never delivers.
    pub(crate) fn idle(topics: Vec<Category>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self::new(topics, shutdown, Vec::new())
    }

    /// Topics this subscription covers.
    #[must_use]
    pub fn topics(&self) -> &[Category] {
        &self.topics
    }

    /// Number of worker tasks still attached.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker to stop, waits up to `grace` for them to finish
    /// their current envelope, then aborts the rest. Returns how many workers
    /// had to be aborted.
    pub async fn close(self, grace: Duration) -> usize {
        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;

        for mut worker in self.workers {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                worker.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            warn!(aborted, "subscription workers aborted after grace period");
        } else {
            info!(topics = self.topics.len(), "subscription closed");
        }
        aborted
    }
}
