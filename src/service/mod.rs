//! Service layer: background sweeping and the command entry point.
//!
//! [`CommandDispatcher`] is how business logic reaches a user's socket;
//! [`HeartbeatSweeper`] closes connections that stopped heartbeating.

pub mod command_dispatcher;
pub mod heartbeat_sweeper;

pub use command_dispatcher::CommandDispatcher;
pub use heartbeat_sweeper::{HeartbeatSweeper, SweepOutcome};
