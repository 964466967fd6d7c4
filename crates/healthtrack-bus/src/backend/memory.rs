//! In-process broker: one `tokio::sync::broadcast` channel per topic.
//!
//! Suitable for single-process deployments and tests. Envelopes published
//! while a topic has no subscriber are dropped and reported as undelivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use healthtrack_core::{Category, Envelope};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::handler::EnvelopeHandler;
use crate::subscription::Subscription;

/// Broadcast-channel broker.
#[derive(Debug)]
pub struct InMemoryBroker {
    channels: HashMap<Category, broadcast::Sender<Envelope>>,
    sequence: AtomicU64,
}

impl InMemoryBroker {
    /// Creates one channel of `capacity` envelopes per topic.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let channels = Category::ALL
            .into_iter()
            .map(|category| (category, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self {
            channels,
            sequence: AtomicU64::new(0),
        }
    }

    /// Hands the envelope to the topic's subscribers. Returns the assigned
    /// offset and the number of receivers.
    pub fn publish(&self, envelope: &Envelope) -> (u64, usize) {
        let offset = self.sequence.fetch_add(1, Ordering::Relaxed);
        let Some(sender) = self.channels.get(&envelope.topic) else {
            return (offset, 0);
        };
        match sender.send(envelope.clone()) {
            Ok(receivers) => {
                debug!(topic = envelope.topic.topic(), key = %envelope.key, receivers, "envelope broadcast");
                (offset, receivers)
            }
            Err(_) => {
                warn!(topic = envelope.topic.topic(), key = %envelope.key, "envelope dropped (no subscribers)");
                (offset, 0)
            }
        }
    }

    /// Number of live receivers on a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Category) -> usize {
        self.channels
            .get(&topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Spawns one worker per topic that feeds `handler` sequentially.
    pub fn subscribe(
        &self,
        topics: &[Category],
        handler: &Arc<dyn EnvelopeHandler>,
    ) -> Subscription {
        let (shutdown, _) = watch::channel(false);
        let workers = topics
            .iter()
            .filter_map(|topic| {
                let receiver = self.channels.get(topic)?.subscribe();
                Some(tokio::spawn(run_worker(
                    *topic,
                    receiver,
                    Arc::clone(handler),
                    shutdown.subscribe(),
                )))
            })
            .collect();
        Subscription::new(topics.to_vec(), shutdown, workers)
    }
}

async fn run_worker(
    topic: Category,
    mut receiver: broadcast::Receiver<Envelope>,
    handler: Arc<dyn EnvelopeHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = receiver.recv() => message,
        };
        match message {
            Ok(envelope) => handler.handle(envelope).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(topic = topic.topic(), skipped, "subscriber lagged, envelopes skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!(topic = topic.topic(), "in-process worker stopped");
}
