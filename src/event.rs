//! Multicast event publisher with per-subscriber bounded backpressure
//! buffering (spec §4.5, §5, §9 "Event publisher").
//!
//! The teacher hands back a single `UnboundedReceiver<IncomingEvent>` per
//! node (`Node::connect`'s return value in
//! `examples/twilight-rs-twilight/lavalink/src/node.rs`) — one consumer,
//! unbounded. Our spec needs fan-out to many subscribers per node *and* a
//! second fan-out at the client level republishing every node's events, with
//! a bounded buffer and synchronous emission-failure reporting rather than
//! unbounded growth. Extracted into its own reusable type for that reason.

use dashmap::DashMap;
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Handle identifying one subscription, returned from
/// [`Publisher::subscribe`] and used to [`Publisher::unsubscribe`] later.
pub type SubscriberId = u64;

/// Raised when [`Publisher::publish`] could not deliver to every subscriber
/// because their buffer was full.
///
/// Ref: spec §5 "emission failures are reported synchronously to the
/// caller".
#[derive(Debug)]
pub struct PublishError {
    /// Subscribers whose buffer was full when the event was published.
    pub lagging_subscribers: Vec<SubscriberId>,
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} subscriber(s) could not accept the event: buffer full",
            self.lagging_subscribers.len()
        )
    }
}

impl std::error::Error for PublishError {}

/// A multicast channel: every subscriber gets its own bounded buffer, so a
/// slow subscriber can't block delivery to the others or to the publisher
/// itself.
pub struct Publisher<T> {
    subscribers: DashMap<SubscriberId, Sender<T>>,
    next_id: AtomicU64,
}

impl<T> Debug for Publisher<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Publisher").field("subscribers", &self.subscribers.len()).finish()
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Publisher<T> {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new(), next_id: AtomicU64::new(0) }
    }

    /// Register a new subscriber with the given bounded buffer size.
    pub fn subscribe(&self, buffer: usize) -> (SubscriberId, Receiver<T>) {
        let (tx, rx) = mpsc::channel(buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    /// Drop a single subscription.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned silently. Subscribers
    /// whose buffer is currently full are *not* retried or dropped — they are
    /// reported back to the caller via [`PublishError`] so emission failures
    /// surface synchronously rather than blocking the publisher (spec §5).
    pub fn publish(&self, event: T) -> Result<(), PublishError> {
        let mut lagging = Vec::new();
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => lagging.push(*entry.key()),
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
        }

        if lagging.is_empty() {
            Ok(())
        } else {
            Err(PublishError { lagging_subscribers: lagging })
        }
    }

    /// Drop every subscription, closing their receivers. Idempotent.
    pub fn close(&self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Publisher;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Publisher<u8>: Send, Sync);

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let publisher = Publisher::new();
        let (_id_a, mut rx_a) = publisher.subscribe(4);
        let (_id_b, mut rx_b) = publisher.subscribe(4);

        publisher.publish("hello").unwrap();

        assert_eq!(rx_a.recv().await, Some("hello"));
        assert_eq!(rx_b.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn full_buffer_is_reported_without_blocking() {
        let publisher = Publisher::new();
        let (_id, _rx) = publisher.subscribe(1);

        publisher.publish(1).unwrap();
        let err = publisher.publish(2).unwrap_err();

        assert_eq!(err.lagging_subscribers.len(), 1);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned_on_next_publish() {
        let publisher = Publisher::new();
        let (_id, rx) = publisher.subscribe(4);
        drop(rx);

        assert_eq!(publisher.subscriber_count(), 1);
        publisher.publish(1).unwrap();
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscription() {
        let publisher = Publisher::new();
        let (id, _rx) = publisher.subscribe(4);
        publisher.unsubscribe(id);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let publisher: Publisher<u8> = Publisher::new();
        publisher.subscribe(1);
        publisher.close();
        publisher.close();
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
