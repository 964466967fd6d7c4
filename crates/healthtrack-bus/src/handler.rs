//! Subscriber callback.

use async_trait::async_trait;
use healthtrack_core::Envelope;

/// Receives envelopes from a subscription.
///
/// Each topic worker awaits `handle` before fetching its next envelope, so a
/// handler sees the envelopes of one topic strictly in order. Handlers own
/// their error handling; the bus acknowledges the envelope once `handle`
/// returns.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync + 'static {
    /// Processes one envelope.
    async fn handle(&self, envelope: Envelope);
}
