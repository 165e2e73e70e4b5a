//! Subscription fan-out engine
//!
//! Every open subscription gets its own transport subscription and two tasks:
//!
//! - the **listener** decodes bus messages and pushes them into a bounded channel
//!   with `try_send`; a full channel drops the event, so the listener never blocks;
//! - the **watcher** waits on the subscription's cancellation token and unsubscribes
//!   from the transport when it fires.
//!
//! Teardown order: cancel -> listener stops and drops its sender -> watcher
//! unsubscribes -> the output stream yields `None`. Dropping a [`SubscriberStream`]
//! cancels it, which is how a client disconnect reaches the tasks.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bus::{BusMessage, SubscriptionHandle, Transport};
use crate::error::BusError;
use crate::services::events::decode_event;

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Opens per-connection subscriber streams over a shared transport
#[derive(Clone)]
pub struct SubscriptionFanout {
    transport: Arc<dyn Transport>,
    buffer: usize,
}

impl SubscriptionFanout {
    pub fn new(transport: Arc<dyn Transport>, buffer: usize) -> Self {
        Self {
            transport,
            buffer: buffer.max(1),
        }
    }

    /// Open a stream of decoded `T` events on `topic`
    pub async fn open<T>(&self, topic: &str) -> Result<SubscriberStream<T>, BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.open_with_cancel(topic, CancellationToken::new()).await
    }

    /// Open a stream bound to an existing cancellation token, e.g. a child of the
    /// server shutdown token
    pub async fn open_with_cancel<T>(
        &self,
        topic: &str,
        cancel: CancellationToken,
    ) -> Result<SubscriberStream<T>, BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (messages, handle) = self.transport.subscribe(topic).await?.split();
        let (tx, rx) = mpsc::channel(self.buffer);

        let span = tracing::info_span!(
            "subscriber",
            topic = %topic,
            subscription_id = handle.id()
        );

        tokio::spawn(
            listen::<T>(messages, tx, cancel.clone(), handle.clone()).instrument(span.clone()),
        );
        tokio::spawn(watch(cancel.clone(), handle.clone()).instrument(span));

        tracing::debug!(topic, subscription_id = handle.id(), "Subscriber opened");

        Ok(SubscriberStream {
            receiver: rx,
            cancel,
            handle,
            _marker: PhantomData,
        })
    }
}

async fn listen<T>(
    mut messages: mpsc::UnboundedReceiver<BusMessage>,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
    handle: SubscriptionHandle,
) where
    T: DeserializeOwned + Send + 'static,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = messages.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let entity = match decode_event::<T>(&message.payload) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable event");
                continue;
            }
        };

        match tx.try_send(entity) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Subscriber buffer full; dropping event");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    // Either side may end first; make sure the transport stops feeding us
    handle.unsubscribe();
    tracing::debug!("Listener stopped");
}

async fn watch(cancel: CancellationToken, handle: SubscriptionHandle) {
    cancel.cancelled().await;
    handle.unsubscribe();
    tracing::debug!("Subscription cancelled");
}

/// Output stream of one subscriber. Dropping it cancels the subscription.
pub struct SubscriberStream<T> {
    receiver: mpsc::Receiver<T>,
    cancel: CancellationToken,
    handle: SubscriptionHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SubscriberStream<T> {
    /// Cancel delivery; the stream ends and nothing further is yielded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl<T> Stream for SubscriberStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            this.receiver.close();
            return Poll::Ready(None);
        }
        this.receiver.poll_recv(cx)
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalTransport;
    use crate::services::events::{CREATE_TOPIC, EventPublisher};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entity {
        name: String,
        points: f64,
    }

    fn entity(name: &str, points: f64) -> Entity {
        Entity {
            name: name.to_string(),
            points,
        }
    }

    fn setup(buffer: usize) -> (LocalTransport, SubscriptionFanout, EventPublisher) {
        let bus = LocalTransport::connect();
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        (
            bus,
            SubscriptionFanout::new(transport.clone(), buffer),
            EventPublisher::new(transport),
        )
    }

    async fn wait_for_subscribers(bus: &LocalTransport, topic: &str, expected: usize) {
        for _ in 0..200 {
            if bus.subscriber_count(topic) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {expected} subscribers on {topic}, found {}",
            bus.subscriber_count(topic)
        );
    }

    async fn next_within<T>(stream: &mut SubscriberStream<T>) -> Option<T> {
        tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_subscriber_receives_exactly_one_published_entity() {
        let (_bus, fanout, publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        publisher.publish(CREATE_TOPIC, &entity("X", 10.0)).await;

        assert_eq!(next_within(&mut stream).await, Some(entity("X", 10.0)));
        let extra = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(extra.is_err(), "unexpected second event");
    }

    #[tokio::test]
    async fn test_delivery_preserves_publish_order() {
        let (_bus, fanout, publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        for i in 0..20 {
            publisher.publish(CREATE_TOPIC, &entity(&format!("p{i}"), i as f64)).await;
        }
        for i in 0..20 {
            assert_eq!(next_within(&mut stream).await.unwrap().name, format!("p{i}"));
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_its_own_copy() {
        let (_bus, fanout, publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut a = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();
        let mut b = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        publisher.publish(CREATE_TOPIC, &entity("X", 10.0)).await;

        assert_eq!(next_within(&mut a).await, Some(entity("X", 10.0)));
        assert_eq!(next_within(&mut b).await, Some(entity("X", 10.0)));
    }

    #[tokio::test]
    async fn test_undecodable_event_keeps_stream_open() {
        let (bus, fanout, publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        bus.publish(CREATE_TOPIC, b"{not json".to_vec()).await.unwrap();
        publisher.publish(CREATE_TOPIC, &"wrong shape").await;
        publisher.publish(CREATE_TOPIC, &entity("Y", 3.0)).await;

        assert_eq!(next_within(&mut stream).await, Some(entity("Y", 3.0)));
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery_and_unsubscribes() {
        let (bus, fanout, publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();
        assert_eq!(bus.subscriber_count(CREATE_TOPIC), 1);

        publisher.publish(CREATE_TOPIC, &entity("before", 1.0)).await;
        stream.cancel();
        publisher.publish(CREATE_TOPIC, &entity("after", 2.0)).await;

        assert_eq!(next_within(&mut stream).await, None);
        wait_for_subscribers(&bus, CREATE_TOPIC, 0).await;
        assert!(!stream.handle().is_active());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_transport_subscription() {
        let (bus, fanout, _publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();
        let handle = stream.handle().clone();

        drop(stream);

        wait_for_subscribers(&bus, CREATE_TOPIC, 0).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_parent_token_cancels_children() {
        let (bus, fanout, _publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let shutdown = CancellationToken::new();
        let mut a = fanout
            .open_with_cancel::<Entity>(CREATE_TOPIC, shutdown.child_token())
            .await
            .unwrap();
        let mut b = fanout
            .open_with_cancel::<Entity>(CREATE_TOPIC, shutdown.child_token())
            .await
            .unwrap();

        shutdown.cancel();

        assert_eq!(next_within(&mut a).await, None);
        assert_eq!(next_within(&mut b).await, None);
        wait_for_subscribers(&bus, CREATE_TOPIC, 0).await;
    }

    #[tokio::test]
    async fn test_full_buffer_drops_instead_of_blocking() {
        let (_bus, fanout, publisher) = setup(2);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        for i in 0..5 {
            publisher.publish(CREATE_TOPIC, &entity(&format!("p{i}"), 0.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(next_within(&mut stream).await.unwrap().name, "p0");
        assert_eq!(next_within(&mut stream).await.unwrap().name, "p1");
        let dropped = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(dropped.is_err(), "overflow events should have been dropped");

        publisher.publish(CREATE_TOPIC, &entity("p5", 0.0)).await;
        assert_eq!(next_within(&mut stream).await.unwrap().name, "p5");
    }

    #[tokio::test]
    async fn test_transport_close_ends_stream() {
        let (bus, fanout, _publisher) = setup(DEFAULT_SUBSCRIBER_BUFFER);
        let mut stream = fanout.open::<Entity>(CREATE_TOPIC).await.unwrap();

        bus.close();

        assert_eq!(next_within(&mut stream).await, None);
        assert!(fanout.open::<Entity>(CREATE_TOPIC).await.is_err());
    }
}
