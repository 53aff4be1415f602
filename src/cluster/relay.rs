//! Bridge between the local [`ConnectionRegistry`] and the cluster bus.
//!
//! Every instance publishes its control events (`kick`, `command`) on the
//! shared [`Bus`] and applies every control event it receives, its own
//! included. The publishing instance relies on that self-delivery: when
//! the target socket lives on it, nothing else will act on the event.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::bus::{Bus, BusSubscription};
use crate::domain::{CloseReason, ConnectionRegistry, SessionId};
use crate::ws::messages::Envelope;

/// What applying one received broadcast did on this instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A kick closed this many local connections (possibly zero).
    Kicked(usize),
    /// A command was queued on the local socket of this session.
    Delivered(SessionId),
    /// A command targeted a user with no socket on this instance.
    NoRecipient,
    /// The target socket's writer was already gone.
    WriteFailed,
    /// Not a control event, or not decodable.
    Ignored,
}

/// First wait before subscribing again after a lost subscription.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound of the resubscribe wait.
pub const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(60);

/// Publishes local control events and applies received ones.
#[derive(Debug)]
pub struct ClusterRelay {
    bus: Bus,
    registry: Arc<ConnectionRegistry>,
    resubscribe_delay: Duration,
    max_resubscribe_delay: Duration,
}

impl ClusterRelay {
    /// Creates a relay over `bus` acting on `registry`.
    #[must_use]
    pub fn new(bus: Bus, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            bus,
            registry,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
            max_resubscribe_delay: MAX_RESUBSCRIBE_DELAY,
        }
    }

    /// Overrides the resubscribe schedule: waits start at `initial` and
    /// double up to `max`.
    #[must_use]
    pub fn with_resubscribe_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.resubscribe_delay = initial;
        self.max_resubscribe_delay = max.max(initial);
        self
    }

    /// Returns the underlying bus.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Broadcasts a control event. Best-effort: failures are logged and
    /// otherwise ignored. Returns `true` if the transport accepted it.
    pub async fn publish(&self, event: &Envelope) -> bool {
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = event.kind().as_str(),
                    "failed to encode control event"
                );
                return false;
            }
        };
        match self.bus.publish(payload).await {
            Ok(receivers) => {
                tracing::debug!(
                    kind = event.kind().as_str(),
                    receivers,
                    "control event published"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = event.kind().as_str(),
                    "failed to publish control event"
                );
                false
            }
        }
    }

    /// Applies one payload received from the bus.
    pub async fn apply(&self, payload: &str) -> Applied {
        match Envelope::decode(payload) {
            Ok(event) => self.apply_event(&event, payload).await,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring undecodable bus payload");
                Applied::Ignored
            }
        }
    }

    /// Applies a decoded event. `raw` is the original frame text, which
    /// is what a command forwards to the client verbatim.
    pub async fn apply_event(&self, event: &Envelope, raw: &str) -> Applied {
        match event {
            Envelope::Kick {
                user_id,
                last_heartbeat,
                session_id,
                ..
            } => {
                let snapshot = *last_heartbeat;
                let keep = *session_id;
                let closed = self
                    .registry
                    .close_user_where(user_id, CloseReason::KICKED, |conn| {
                        conn.last_heartbeat != snapshot && Some(conn.session_id) != keep
                    })
                    .await;
                for conn in &closed {
                    tracing::info!(
                        %user_id,
                        session_id = %conn.session_id,
                        "kicked superseded connection"
                    );
                }
                Applied::Kicked(closed.len())
            }
            Envelope::Command { user_id, .. } => {
                let Some(conn) = self.registry.find_by_user(user_id).await else {
                    return Applied::NoRecipient;
                };
                match conn.handle.send_text(raw) {
                    Ok(()) => {
                        tracing::debug!(
                            %user_id,
                            session_id = %conn.session_id,
                            "command delivered"
                        );
                        Applied::Delivered(conn.session_id)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, %user_id, "command write failed");
                        Applied::WriteFailed
                    }
                }
            }
            Envelope::Auth { .. }
            | Envelope::AuthResult { .. }
            | Envelope::Heartbeat { .. }
            | Envelope::HeartbeatResult { .. } => Applied::Ignored,
        }
    }

    /// Subscribes to the bus and spawns the apply loop.
    ///
    /// The first subscription is attempted before this returns, so events
    /// the caller publishes afterwards reach this instance too. When it
    /// fails, or when a live subscription later ends, the spawned task
    /// subscribes again after a capped exponential delay.
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let first = self.subscribe().await;
        let relay = Arc::clone(self);
        tokio::spawn(async move { relay.supervise(first).await })
    }

    async fn subscribe(&self) -> Option<BusSubscription> {
        match self.bus.subscribe().await {
            Ok(subscription) => {
                tracing::info!(bus = self.bus.kind(), "cluster relay subscribed");
                Some(subscription)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bus = self.bus.kind(),
                    "cluster relay subscription failed"
                );
                None
            }
        }
    }

    /// Runs `subscription`, then keeps resubscribing forever.
    async fn supervise(&self, mut subscription: Option<BusSubscription>) {
        let mut backoff = Backoff::new(self.resubscribe_delay, self.max_resubscribe_delay);
        loop {
            if let Some(active) = subscription.take()
                && self.run(active).await > 0
            {
                backoff.reset();
            }
            let delay = backoff.next_delay();
            tracing::warn!(bus = self.bus.kind(), ?delay, "cluster relay resubscribing");
            tokio::time::sleep(delay).await;
            subscription = self.subscribe().await;
        }
    }

    /// Applies payloads from `subscription` until the bus closes it.
    ///
    /// Returns the number of payloads received.
    pub async fn run(&self, mut subscription: BusSubscription) -> usize {
        let mut received = 0;
        while let Some(payload) = subscription.recv().await {
            received += 1;
            self.apply(&payload).await;
        }
        tracing::warn!(
            bus = self.bus.kind(),
            received,
            "cluster relay subscription ended"
        );
        received
    }
}

/// Delay schedule between resubscribe attempts: doubles up to a cap.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
