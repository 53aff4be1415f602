//! Broadcast transport shared by every instance of the relay.
//!
//! [`Bus`] is either the in-process [`LocalBus`] (a
//! [`tokio::sync::broadcast`] channel, enough for a single instance and
//! for tests) or a [`RedisBus`] pub/sub channel shared across a fleet.
//! Either way every subscriber, including the publishing process itself,
//! receives every payload. Delivery is best-effort and unordered across
//! publishers.

use std::fmt;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;

use super::redis_bus::RedisBus;
use crate::error::BusError;

/// In-process broadcast bus carrying serialized envelopes.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest payloads
/// are dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<String>,
}

impl LocalBus {
    /// Creates a new `LocalBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes a payload to all subscribers.
    ///
    /// Returns the number of receivers that received it. With no active
    /// receivers the payload is silently dropped.
    pub fn publish(&self, payload: String) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future payloads.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// The cluster-wide broadcast channel.
#[derive(Debug, Clone)]
pub enum Bus {
    /// Single-process bus.
    Local(LocalBus),
    /// Redis pub/sub channel shared by all instances.
    Redis(RedisBus),
}

impl Bus {
    /// Broadcasts one serialized envelope.
    ///
    /// Returns how many subscribers the transport reports reaching.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Redis`] if the Redis `PUBLISH` fails.
    pub async fn publish(&self, payload: String) -> Result<usize, BusError> {
        match self {
            Self::Local(bus) => Ok(bus.publish(payload)),
            Self::Redis(bus) => bus.publish(&payload).await,
        }
    }

    /// Opens a subscription receiving every payload published from now on.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Redis`] if the pub/sub connection or the
    /// `SUBSCRIBE` command fails.
    pub async fn subscribe(&self) -> Result<BusSubscription, BusError> {
        match self {
            Self::Local(bus) => Ok(BusSubscription::Local(bus.subscribe())),
            Self::Redis(bus) => bus.subscribe().await,
        }
    }

    /// Short transport name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Redis(_) => "redis",
        }
    }
}

/// Boxed Redis message stream.
pub type RedisMessages = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

/// Receiving end of a [`Bus`] subscription.
pub enum BusSubscription {
    /// In-process receiver.
    Local(broadcast::Receiver<String>),
    /// Redis pub/sub message stream.
    Redis(RedisMessages),
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(rx) => f.debug_tuple("Local").field(rx).finish(),
            Self::Redis(_) => f.debug_tuple("Redis").finish_non_exhaustive(),
        }
    }
}

impl BusSubscription {
    /// Waits for the next payload. Returns `None` once the transport is
    /// closed for good.
    pub async fn recv(&mut self) -> Option<String> {
        match self {
            Self::Local(rx) => loop {
                match rx.recv().await {
                    Ok(payload) => return Some(payload),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            lagged = n,
                            "relay subscriber lagged behind local bus"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Self::Redis(stream) => loop {
                let msg = stream.next().await?;
                match msg.get_payload::<String>() {
                    Ok(payload) => return Some(payload),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping non-text redis payload");
                    }
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = LocalBus::new(16);
        assert_eq!(bus.publish("x".to_string()), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_payload() {
        let bus = Bus::Local(LocalBus::new(16));
        let Ok(mut a) = bus.subscribe().await else {
            panic!("subscribe failed");
        };
        let Ok(mut b) = bus.subscribe().await else {
            panic!("subscribe failed");
        };

        let reached = bus.publish("hello".to_string()).await;
        assert_eq!(reached.ok(), Some(2));
        assert_eq!(a.recv().await.as_deref(), Some("hello"));
        assert_eq!(b.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_newest() {
        let local = LocalBus::new(2);
        let bus = Bus::Local(local.clone());
        let Ok(mut rx) = bus.subscribe().await else {
            panic!("subscribe failed");
        };
        for i in 0..5 {
            local.publish(format!("m{i}"));
        }
        assert_eq!(rx.recv().await.as_deref(), Some("m3"));
        assert_eq!(rx.recv().await.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let local = LocalBus::new(4);
        let mut rx = BusSubscription::Local(local.subscribe());
        drop(local);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = LocalBus::new(4);
        assert_eq!(bus.receiver_count(), 0);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }
}
