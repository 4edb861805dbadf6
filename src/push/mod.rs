//! Real-time change notifications.
//!
//! A push channel tells subscribers that "something relevant changed" and
//! nothing more. Events carry no payload; the synchronizer answers them with
//! a re-fetch, never by patching its current page. Connection state is
//! reported separately and a disconnect is never a fetch failure.

mod broadcast;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use broadcast::BroadcastPushChannel;

/// Event delivered to a push subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    /// Data may have changed upstream.
    Changed,
    /// The channel's connection went up (`true`) or down (`false`).
    ConnectionChanged(bool),
}

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Contract for a real-time notification source.
pub trait PushChannel: Send + Sync {
    /// Register `sink` for events and return its handle.
    fn subscribe(&self, sink: mpsc::UnboundedSender<PushEvent>) -> SubscriptionId;

    /// Release a handle. Unknown handles are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    fn is_connected(&self) -> bool;
}

/// Scoped subscription: the handle is released exactly once, when the guard
/// is released or dropped, whichever comes first.
pub struct PushSubscription {
    channel: Arc<dyn PushChannel>,
    id: Option<SubscriptionId>,
}

impl PushSubscription {
    pub fn open(channel: Arc<dyn PushChannel>, sink: mpsc::UnboundedSender<PushEvent>) -> Self {
        let id = channel.subscribe(sink);
        tracing::debug!(subscription = id.0, "push subscription opened");
        Self {
            channel,
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Release the handle now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(id) = self.id.take() {
            self.channel.unsubscribe(id);
            tracing::debug!(subscription = id.0, "push subscription released");
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSubscription")
            .field("id", &self.id)
            .finish()
    }
}
