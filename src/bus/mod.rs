//! Topic-based publish/subscribe transport
//!
//! The fan-out engine and the event publisher only talk to [`Transport`], so the
//! in-process [`LocalTransport`] can be swapped for a networked broker without
//! touching them. Delivery is fire-and-forget: nothing is persisted and a subscriber
//! only sees messages published after it subscribed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::BusError;

/// A message as delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe transport. Implementations must be safe to share between tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` to every current subscriber of `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Open a subscription on `topic`
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;
}

/// Removes a subscription from its transport
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, topic: &str, id: u64);
}

/// Cloneable handle used to tear a subscription down from another task
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    topic: String,
    registry: Arc<dyn Unsubscribe>,
    active: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery for this subscription. Idempotent.
    ///
    /// Messages already queued are still readable; after them the receiver ends.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.registry.unsubscribe(&self.topic, self.id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

/// An open subscription: the message queue plus its handle
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<BusMessage>, handle: SubscriptionHandle) -> Self {
        Self { receiver, handle }
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Wait for the next message; `None` once unsubscribed and drained
    pub async fn next_message(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Split into the receiving half and the handle
    pub fn split(self) -> (mpsc::UnboundedReceiver<BusMessage>, SubscriptionHandle) {
        (self.receiver, self.handle)
    }
}

type TopicSubscribers = HashMap<u64, mpsc::UnboundedSender<BusMessage>>;

#[derive(Default)]
struct Registry {
    topics: RwLock<HashMap<String, TopicSubscribers>>,
}

impl Unsubscribe for Registry {
    fn unsubscribe(&self, topic: &str, id: u64) {
        let mut topics = self.topics.write();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

/// In-process transport. Each subscription owns an unbounded queue so publishers
/// never wait on slow consumers and per-subscriber order equals publish order.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<Registry>,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl LocalTransport {
    /// Create a connected transport
    pub fn connect() -> Self {
        tracing::info!("Local pub/sub transport connected");
        Self {
            registry: Arc::new(Registry::default()),
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close the transport, ending every open subscription
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.topics.write().clear();
            tracing::info!("Local pub/sub transport closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .topics
            .read()
            .get(topic)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn validate_topic(topic: &str) -> Result<(), BusError> {
        if topic.is_empty() || topic.chars().any(char::is_whitespace) {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Self::validate_topic(topic)?;

        let topics = self.registry.topics.read();
        let Some(subscribers) = topics.get(topic) else {
            tracing::trace!(topic, "Published with no subscribers");
            return Ok(());
        };

        for (id, sender) in subscribers {
            let message = BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if sender.send(message).is_err() {
                // Receiver dropped without unsubscribing; pruned on next unsubscribe
                tracing::trace!(topic, subscription_id = id, "Subscriber queue gone");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Self::validate_topic(topic)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            // close() flips the flag before clearing under this lock
            let mut topics = self.registry.topics.write();
            if self.is_closed() {
                return Err(BusError::Closed);
            }
            topics.entry(topic.to_string()).or_default().insert(id, tx);
        }

        tracing::debug!(topic, subscription_id = id, "Subscribed");

        let handle = SubscriptionHandle {
            id,
            topic: topic.to_string(),
            registry: self.registry.clone(),
            active: Arc::new(AtomicBool::new(true)),
        };
        Ok(Subscription::new(rx, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let bus = LocalTransport::connect();
        let mut a = bus.subscribe("create").await.unwrap();
        let mut b = bus.subscribe("create").await.unwrap();

        bus.publish("create", b"one".to_vec()).await.unwrap();
        bus.publish("create", b"two".to_vec()).await.unwrap();

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.next_message().await.unwrap().payload, b"one".to_vec());
            assert_eq!(sub.next_message().await.unwrap().payload, b"two".to_vec());
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = LocalTransport::connect();
        let mut create = bus.subscribe("create").await.unwrap();
        bus.publish("delete", b"x".to_vec()).await.unwrap();
        bus.publish("create", b"y".to_vec()).await.unwrap();

        let msg = create.next_message().await.unwrap();
        assert_eq!(msg.topic, "create");
        assert_eq!(msg.payload, b"y".to_vec());
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_messages() {
        let bus = LocalTransport::connect();
        bus.publish("create", b"early".to_vec()).await.unwrap();

        let mut sub = bus.subscribe("create").await.unwrap();
        bus.publish("create", b"late".to_vec()).await.unwrap();

        assert_eq!(sub.next_message().await.unwrap().payload, b"late".to_vec());
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream_after_drain() {
        let bus = LocalTransport::connect();
        let mut sub = bus.subscribe("create").await.unwrap();
        bus.publish("create", b"queued".to_vec()).await.unwrap();

        let handle = sub.handle().clone();
        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert_eq!(bus.subscriber_count("create"), 0);

        bus.publish("create", b"after".to_vec()).await.unwrap();
        assert_eq!(sub.next_message().await.unwrap().payload, b"queued".to_vec());
        assert!(sub.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let bus = LocalTransport::connect();
        let mut sub = bus.subscribe("create").await.unwrap();
        bus.close();

        assert_eq!(
            bus.publish("create", Vec::new()).await.unwrap_err(),
            BusError::Closed
        );
        assert!(bus.subscribe("create").await.is_err());
        assert!(sub.next_message().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_racing_close_never_leaks_a_live_subscription() {
        for _ in 0..50 {
            let bus = LocalTransport::connect();
            let subscribers: Vec<_> = (0..8)
                .map(|_| {
                    let bus = bus.clone();
                    tokio::spawn(async move { bus.subscribe("create").await })
                })
                .collect();
            bus.close();

            for task in subscribers {
                if let Ok(mut sub) = task.await.unwrap() {
                    let ended =
                        tokio::time::timeout(std::time::Duration::from_secs(1), sub.next_message())
                            .await
                            .unwrap();
                    assert!(ended.is_none());
                }
            }
            assert_eq!(bus.subscriber_count("create"), 0);
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_topic() {
        let bus = LocalTransport::connect();
        assert!(matches!(
            bus.subscribe("").await,
            Err(BusError::InvalidTopic(_))
        ));
        assert!(bus.publish("two words", Vec::new()).await.is_err());
    }
}
