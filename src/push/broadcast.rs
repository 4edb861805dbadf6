//! In-process push channel.
//!
//! Fans events out to every subscriber. Hosts with a real transport
//! (websocket, SSE, database listen/notify) bridge it in by calling
//! `notify_changed` and `set_connected`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{PushChannel, PushEvent, SubscriptionId};

#[derive(Debug, Default)]
pub struct BroadcastPushChannel {
    subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<PushEvent>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    released: AtomicUsize,
}

impl BroadcastPushChannel {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            ..Default::default()
        }
    }

    /// Tell every subscriber that data may have changed.
    pub fn notify_changed(&self) {
        self.broadcast(PushEvent::Changed);
    }

    /// Record a connection transition. Repeating the current state is a no-op.
    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            tracing::info!(connected, "push channel connection changed");
            self.broadcast(PushEvent::ConnectionChanged(connected));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of handles released through `unsubscribe` so far.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn broadcast(&self, event: PushEvent) {
        // Subscribers whose receiver is gone are pruned on the way.
        self.subscribers
            .retain(|_, sink| sink.send(event).is_ok());
    }
}

impl PushChannel for BroadcastPushChannel {
    fn subscribe(&self, sink: mpsc::UnboundedSender<PushEvent>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.insert(id, sink);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.remove(&id).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
        } else {
            tracing::warn!(subscription = id.0, "unsubscribe for unknown push subscription");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_prune() {
        let channel = BroadcastPushChannel::new(false);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        channel.subscribe(tx1);
        channel.subscribe(tx2);
        drop(rx2);

        channel.notify_changed();
        assert_eq!(rx1.try_recv().unwrap(), PushEvent::Changed);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn test_connection_transitions_are_deduplicated() {
        let channel = BroadcastPushChannel::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.subscribe(tx);

        channel.set_connected(true);
        channel.set_connected(true);
        channel.set_connected(false);

        assert_eq!(rx.try_recv().unwrap(), PushEvent::ConnectionChanged(true));
        assert_eq!(rx.try_recv().unwrap(), PushEvent::ConnectionChanged(false));
        assert!(rx.try_recv().is_err());
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_unknown_unsubscribe_is_ignored() {
        let channel = BroadcastPushChannel::new(true);
        channel.unsubscribe(SubscriptionId(42));
        assert_eq!(channel.released_count(), 0);
    }
}
