//! Redis pub/sub transport for the cluster bus.
//!
//! Publishing goes through one multiplexed connection shared by all
//! callers. Each subscription opens its own pub/sub connection, since a
//! subscribed Redis connection cannot issue other commands. Reconnects
//! are left to the `redis` client; failures surface as [`BusError`].

use std::fmt;

use redis::AsyncCommands;

use super::bus::BusSubscription;
use crate::error::BusError;

/// Handle to one Redis broadcast channel.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: redis::aio::MultiplexedConnection,
    channel: String,
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Connects the publishing side to `url` for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Redis`] if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
        })
    }

    /// Returns the channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// `PUBLISH`es one payload, returning the subscriber count Redis
    /// reports.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Redis`] if the command fails.
    pub async fn publish(&self, payload: &str) -> Result<usize, BusError> {
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(&self.channel, payload).await?;
        Ok(receivers)
    }

    /// Opens a dedicated pub/sub connection subscribed to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Redis`] if the connection or `SUBSCRIBE` fails.
    pub async fn subscribe(&self) -> Result<BusSubscription, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "subscribed to redis channel");
        Ok(BusSubscription::Redis(Box::pin(pubsub.into_on_message())))
    }
}
