//! Message-delivery core of the chat room.
//!
//! A [`ChatBackend`] turns chat operations into store operations on a shared
//! mailbox key. A [`DeliveryLoop`] drains the resulting notification source on
//! its own task and hands every payload to a [`RenderSink`]. [`ChatSession`]
//! wires the two together and owns the shutdown sequence.

pub mod backend;
pub mod config;
pub mod delivery;
pub mod error;
pub mod session;
pub mod sink;

pub use backend::{BackendState, ChatBackend};
pub use config::ChatConfig;
pub use delivery::{run_delivery, DeliveryLoop, DeliveryOutcome, JoinResult, StopReason};
pub use error::{BackendError, ConfigError, Result};
pub use session::{ChatSession, ShutdownReport};
pub use sink::{ChannelSink, FnSink, RenderSink};

/// Message carried by the sentinel that stops the delivery loop.
pub const STOP_MESSAGE: &str = "Stopping receiving message";
