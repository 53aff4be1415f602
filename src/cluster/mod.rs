//! Cluster layer: the shared broadcast bus and the relay on top of it.
//!
//! Together they make the process-local registries of every instance
//! behave like one session space for kicks and commands.

pub mod bus;
pub mod redis_bus;
pub mod relay;

pub use bus::{Bus, BusSubscription, LocalBus};
pub use redis_bus::RedisBus;
pub use relay::{Applied, ClusterRelay};
