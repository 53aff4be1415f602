//! Periodic liveness sweep over the local registry.
//!
//! Every tick closes the connections whose last heartbeat is older than
//! the timeout. Sweeps never overlap: the loop awaits each sweep before
//! waiting for the next tick, and [`HeartbeatSweeper::sweep_once`] holds
//! an in-flight flag so a concurrent caller gets
//! [`SweepOutcome::Skipped`] instead of racing on the indices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{CloseReason, ConnectionRegistry, now_millis};

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default staleness threshold in milliseconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: i64 = 30_000;

/// Result of one [`HeartbeatSweeper::sweep_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The sweep ran and closed this many connections.
    Completed {
        /// Connections closed for heartbeat timeout.
        closed: usize,
    },
    /// Another sweep was still running.
    Skipped,
}

/// Clears the in-flight flag when a sweep ends, including on cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Closes connections that stopped heartbeating.
#[derive(Debug)]
pub struct HeartbeatSweeper {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    timeout_ms: i64,
    in_flight: AtomicBool,
}

impl HeartbeatSweeper {
    /// Creates a sweeper running every `interval` and closing connections
    /// silent for more than `timeout_ms`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration, timeout_ms: i64) -> Self {
        Self {
            registry,
            interval,
            timeout_ms,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Runs a single sweep as of `now` (Unix milliseconds).
    pub async fn sweep_once(&self, now: i64) -> SweepOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous heartbeat sweep still running; skipping");
            return SweepOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let stale = self.registry.snapshot_stale(now, self.timeout_ms).await;
        let mut closed = 0;
        for conn in stale {
            if self
                .registry
                .close(conn.id(), CloseReason::HEARTBEAT_TIMEOUT)
                .await
            {
                tracing::info!(
                    session_id = %conn.session_id,
                    user_id = conn.user_id.as_deref().unwrap_or("-"),
                    silent_ms = now.saturating_sub(conn.last_heartbeat),
                    "closing connection: heartbeat timeout"
                );
                closed += 1;
            }
        }
        SweepOutcome::Completed { closed }
    }

    /// Spawns the periodic sweep loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let SweepOutcome::Completed { closed } = self.sweep_once(now_millis()).await
                    && closed > 0
                {
                    tracing::info!(closed, "heartbeat sweep finished");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Connection, ConnectionHandle, Outbound};
    use tokio::sync::mpsc;

    async fn connect(
        registry: &ConnectionRegistry,
        user: &str,
        now: i64,
    ) -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::channel();
        let conn = registry.register(handle, now).await;
        let _ = registry.authenticate(conn.id(), user, now).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn closes_only_stale_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sweeper = HeartbeatSweeper::new(
            Arc::clone(&registry),
            DEFAULT_SWEEP_INTERVAL,
            DEFAULT_HEARTBEAT_TIMEOUT_MS,
        );
        let now = 100_000;
        let (stale, mut stale_rx) = connect(&registry, "alice", now - 31_000).await;
        let (fresh, mut fresh_rx) = connect(&registry, "bob", now - 10_000).await;

        assert_eq!(
            sweeper.sweep_once(now).await,
            SweepOutcome::Completed { closed: 1 }
        );

        assert_eq!(
            stale_rx.recv().await,
            Some(Outbound::Close(CloseReason::HEARTBEAT_TIMEOUT))
        );
        assert!(registry.find_by_session(stale.session_id).await.is_none());
        assert!(registry.find_by_user("alice").await.is_none());

        assert!(fresh_rx.try_recv().is_err());
        assert!(registry.find_by_session(fresh.session_id).await.is_some());
        assert!(registry.find_by_user("bob").await.is_some());
    }

    #[tokio::test]
    async fn repeated_sweeps_close_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sweeper =
            HeartbeatSweeper::new(Arc::clone(&registry), DEFAULT_SWEEP_INTERVAL, 30_000);
        let (_conn, _rx) = connect(&registry, "alice", 0).await;

        assert_eq!(
            sweeper.sweep_once(40_000).await,
            SweepOutcome::Completed { closed: 1 }
        );
        assert_eq!(
            sweeper.sweep_once(80_000).await,
            SweepOutcome::Completed { closed: 0 }
        );
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sweeper =
            HeartbeatSweeper::new(Arc::clone(&registry), DEFAULT_SWEEP_INTERVAL, 30_000);
        let (conn, _rx) = connect(&registry, "alice", 0).await;

        sweeper.in_flight.store(true, Ordering::Release);
        assert_eq!(sweeper.sweep_once(40_000).await, SweepOutcome::Skipped);
        assert!(registry.get(conn.id()).await.is_some());

        sweeper.in_flight.store(false, Ordering::Release);
        assert_eq!(
            sweeper.sweep_once(40_000).await,
            SweepOutcome::Completed { closed: 1 }
        );
        assert!(!sweeper.in_flight.load(Ordering::Acquire));
    }
}
