//! Chat session: composition root for one participant.
//!
//! Startup: register the backend, start the delivery loop on the returned
//! source, announce the join. Shutdown: enqueue the stop sentinel behind any
//! pending notifications, wait (bounded) for the loop to drain, then close the
//! store connection. The consumer is stopped before the connection goes away.

use crate::backend::ChatBackend;
use crate::config::ChatConfig;
use crate::delivery::{DeliveryLoop, JoinResult};
use crate::error::Result;
use crate::sink::RenderSink;
use crate::STOP_MESSAGE;
use dice_client::{Notification, NotificationHandle, StoreClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened during [`ChatSession::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub delivery: JoinResult,
    /// Error from closing the store connection, if any. Logged, never raised.
    pub close_error: Option<String>,
}

pub struct ChatSession {
    // Dropped first: the sentinel must be queued before the client closes.
    stop: StopOnDrop,
    name: String,
    backend: ChatBackend,
    delivery: DeliveryLoop,
    shutdown_timeout: Duration,
}

/// Stops the delivery loop if the session is dropped without `shutdown`.
struct StopOnDrop {
    sentinel: NotificationHandle,
    armed: bool,
}

impl StopOnDrop {
    /// Enqueue the sentinel now and disarm.
    fn stop(mut self) -> bool {
        self.armed = false;
        self.sentinel.push(Notification::sentinel(STOP_MESSAGE))
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // No await in drop: stop the consumer; the connection closes with the client.
        warn!("[ChatSession] dropped without shutdown, stopping delivery loop");
        self.sentinel.push(Notification::sentinel(STOP_MESSAGE));
    }
}

impl ChatSession {
    /// Register on the mailbox key and start receiving.
    ///
    /// Fails if the subscription cannot be established; nothing is left
    /// running in that case.
    pub async fn start(
        config: &ChatConfig,
        client: Arc<dyn StoreClient>,
        sink: Arc<dyn RenderSink>,
    ) -> Result<Self> {
        let mut backend = ChatBackend::new(client, config.mailbox_key.clone());
        let source = match backend.register().await {
            Ok(source) => source,
            Err(e) => {
                error!("[ChatSession] registration failed: {}", e);
                if let Err(close_err) = backend.close().await {
                    debug!("[ChatSession] close after failed registration: {}", close_err);
                }
                return Err(e);
            }
        };

        let stop = StopOnDrop {
            sentinel: source.handle(),
            armed: true,
        };
        let delivery = DeliveryLoop::spawn(source, sink);
        let session = Self {
            stop,
            name: config.name.clone(),
            backend,
            delivery,
            shutdown_timeout: config.shutdown_timeout(),
        };

        let joined = format!("{}: Joined the chat room!", session.name);
        if let Err(e) = session.backend.broadcast(&joined).await {
            warn!("[ChatSession] join announcement failed: {}", e);
        }
        info!("[ChatSession] '{}' joined '{}'", session.name, config.mailbox_key);
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` once the delivery loop has stopped; the UI goes silent then.
    pub fn is_receiving(&self) -> bool {
        !self.delivery.is_finished()
    }

    /// Send `text` as `"<name>: <text>"`. A failed send does not end the session.
    pub async fn send(&self, text: &str) -> Result<()> {
        let line = format!("{}: {}", self.name, text);
        self.backend.broadcast(&line).await.map_err(|e| {
            error!("[ChatSession] Error sending message: {}", e);
            e
        })
    }

    /// Stop receiving and release the store connection.
    pub async fn shutdown(self) -> ShutdownReport {
        let Self {
            mut backend,
            delivery,
            stop,
            shutdown_timeout,
            ..
        } = self;
        info!("[ChatSession] shutting down");

        if !stop.stop() {
            debug!("[ChatSession] delivery loop already gone");
        }

        let delivery = delivery.join(shutdown_timeout).await;

        let close_error = match backend.close().await {
            Ok(()) => None,
            Err(e) => {
                error!("[ChatSession] Error closing chat room: {}", e);
                Some(e.to_string())
            }
        };

        ShutdownReport {
            delivery,
            close_error,
        }
    }
}
