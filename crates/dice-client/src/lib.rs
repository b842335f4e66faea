//! Minimal DiceDB store client.
//!
//! Provides the `watch`/`fire` primitives a chat relay needs: a RESP2 codec,
//! a TCP client that turns `GET.WATCH` push frames into [`Notification`]s, and
//! an in-process [`MemoryStore`] with the same watch semantics.

pub mod config;
pub mod error;
pub mod memory;
pub mod resp;
pub mod tcp;
pub mod traits;
pub mod types;

pub use config::ClientConfig;
pub use error::{ConnectionError, Result};
pub use memory::{MemoryClient, MemoryStore};
pub use tcp::TcpStoreClient;
pub use traits::StoreClient;
pub use types::{Notification, NotificationHandle, NotificationSender, NotificationSource};

/// Watch command that subscribes to the value of a key.
pub const GET_WATCH: &str = "GET.WATCH";
/// Write command for a key.
pub const SET: &str = "SET";
