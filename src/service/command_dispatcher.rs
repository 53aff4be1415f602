//! Entry point business logic uses to push a command to a user.

use std::sync::Arc;

use crate::cluster::ClusterRelay;
use crate::domain::now_millis;
use crate::ws::messages::Envelope;

/// Publishes `command` events for whichever instance holds the user.
///
/// Stateless: owns only the relay. Delivery is never confirmed; a user
/// connected nowhere is a silent no-op on every instance.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    relay: Arc<ClusterRelay>,
}

impl CommandDispatcher {
    /// Creates a dispatcher publishing through `relay`.
    #[must_use]
    pub fn new(relay: Arc<ClusterRelay>) -> Self {
        Self { relay }
    }

    /// Sends `context` to the socket of `user_id`, wherever it lives.
    ///
    /// Returns once the event is handed to the bus; publish failures are
    /// logged by the relay and not reported.
    pub async fn send_command_to_user(&self, user_id: &str, context: impl Into<String>) {
        let event = Envelope::Command {
            user_id: user_id.to_string(),
            context: context.into(),
            time: now_millis(),
        };
        if self.relay.publish(&event).await {
            tracing::debug!(%user_id, "command published");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::cluster::{Bus, LocalBus};
    use crate::domain::{ConnectionHandle, ConnectionRegistry, Outbound};

    #[tokio::test]
    async fn command_reaches_connected_user_through_the_bus() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(ClusterRelay::new(
            Bus::Local(LocalBus::new(16)),
            Arc::clone(&registry),
        ));
        let task = relay.start().await;
        let (handle, mut rx) = ConnectionHandle::channel();
        let conn = registry.register(handle, now_millis()).await;
        let _ = registry.authenticate(conn.id(), "alice", now_millis()).await;

        CommandDispatcher::new(relay)
            .send_command_to_user("alice", "ping")
            .await;

        let Some(Outbound::Text(frame)) = rx.recv().await else {
            panic!("expected the command frame");
        };
        let Ok(Envelope::Command {
            user_id, context, ..
        }) = Envelope::decode(&frame)
        else {
            panic!("expected a command envelope");
        };
        assert_eq!(user_id, "alice");
        assert_eq!(context, "ping");
        task.abort();
    }

    #[tokio::test]
    async fn unknown_user_is_a_silent_no_op() {
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = LocalBus::new(16);
        let relay = Arc::new(ClusterRelay::new(
            Bus::Local(bus.clone()),
            Arc::clone(&registry),
        ));
        let mut observer = bus.subscribe();
        let (handle, mut rx) = ConnectionHandle::channel();
        let conn = registry.register(handle, now_millis()).await;
        let _ = registry.authenticate(conn.id(), "alice", now_millis()).await;

        CommandDispatcher::new(Arc::clone(&relay))
            .send_command_to_user("U", "ping")
            .await;

        let Ok(payload) = observer.recv().await else {
            panic!("expected the command on the bus");
        };
        assert_eq!(
            relay.apply(&payload).await,
            crate::cluster::Applied::NoRecipient
        );
        assert!(rx.try_recv().is_err());
    }
}
