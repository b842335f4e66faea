//! Chat backend: bridges chat operations to store operations.
//!
//! Joining the room is a `GET.WATCH` on the mailbox key; sending a message is
//! a `SET` of that key. Every subscriber, the sender included, sees the new
//! value through its own notification source.

use crate::error::{BackendError, Result};
use dice_client::{Notification, NotificationSource, StoreClient, GET_WATCH, SET};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a [`ChatBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Unregistered,
    Registered,
    Closed,
}

pub struct ChatBackend {
    client: Arc<dyn StoreClient>,
    mailbox_key: String,
    state: BackendState,
}

impl ChatBackend {
    pub fn new(client: Arc<dyn StoreClient>, mailbox_key: impl Into<String>) -> Self {
        Self {
            client,
            mailbox_key: mailbox_key.into(),
            state: BackendState::Unregistered,
        }
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn mailbox_key(&self) -> &str {
        &self.mailbox_key
    }

    /// Subscribe to the mailbox key and return the notification source.
    ///
    /// The subscription's first notification is the key's current value, not
    /// a chat message; it is consumed here before the source is returned.
    /// Only one registration is allowed per backend.
    pub async fn register(&mut self) -> Result<NotificationSource> {
        match self.state {
            BackendState::Unregistered => {}
            BackendState::Registered => return Err(BackendError::AlreadyRegistered),
            BackendState::Closed => return Err(BackendError::Closed),
        }

        let keys = [self.mailbox_key.clone()];
        let mut source = self.client.watch(GET_WATCH, &keys).await?;

        match source.recv().await {
            Ok(Notification::Ok { payload }) => {
                debug!("[ChatBackend] discarded priming value ({} bytes)", payload.len());
            }
            Ok(Notification::Error { message }) => {
                warn!("[ChatBackend] subscription ended during priming read: {}", message);
                return Err(BackendError::PrimingInterrupted(message));
            }
            Err(e) => {
                warn!("[ChatBackend] priming read failed: {}", e);
                return Err(BackendError::PrimingInterrupted(e.to_string()));
            }
        }

        self.state = BackendState::Registered;
        info!("[ChatBackend] registered on '{}'", self.mailbox_key);
        Ok(source)
    }

    /// Write `text` to the mailbox key. Fire-and-forget.
    pub async fn broadcast(&self, text: &str) -> Result<()> {
        match self.state {
            BackendState::Registered => {}
            BackendState::Unregistered => return Err(BackendError::NotRegistered),
            BackendState::Closed => return Err(BackendError::Closed),
        }

        let args = [self.mailbox_key.clone(), text.to_string()];
        self.client.fire(SET, &args).await?;
        debug!("[ChatBackend] broadcast {} bytes", text.len());
        Ok(())
    }

    /// Release the store connection. A second call is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == BackendState::Closed {
            return Ok(());
        }
        self.state = BackendState::Closed;
        self.client.close().await?;
        info!("[ChatBackend] closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dice_client::{ConnectionError, MemoryStore};

    fn backend(store: &MemoryStore) -> ChatBackend {
        ChatBackend::new(Arc::new(store.connect()), "room")
    }

    #[tokio::test]
    async fn test_register_discards_priming_value() {
        let store = MemoryStore::new();
        store.set("room", "stale message");
        let mut backend = backend(&store);

        let source = backend.register().await.unwrap();
        assert_eq!(backend.state(), BackendState::Registered);
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let store = MemoryStore::new();
        let mut backend = backend(&store);
        let _source = backend.register().await.unwrap();

        assert!(matches!(
            backend.register().await,
            Err(BackendError::AlreadyRegistered)
        ));
        assert_eq!(backend.state(), BackendState::Registered);
    }

    #[tokio::test]
    async fn test_broadcast_requires_registration() {
        let store = MemoryStore::new();
        let backend = backend(&store);
        assert!(matches!(
            backend.broadcast("too early").await,
            Err(BackendError::NotRegistered)
        ));
        assert_eq!(store.get("room"), None);
    }

    #[tokio::test]
    async fn test_broadcast_writes_mailbox_key() {
        let store = MemoryStore::new();
        let mut backend = backend(&store);
        let _source = backend.register().await.unwrap();

        backend.broadcast("Alice: hi").await.unwrap();
        assert_eq!(store.get("room").as_deref(), Some("Alice: hi"));
    }

    #[tokio::test]
    async fn test_broadcast_after_close_fails() {
        let store = MemoryStore::new();
        let mut backend = backend(&store);
        let _source = backend.register().await.unwrap();

        backend.close().await.unwrap();
        backend.close().await.unwrap();
        assert_eq!(backend.state(), BackendState::Closed);

        assert!(matches!(
            backend.broadcast("after close").await,
            Err(BackendError::Closed)
        ));
        assert!(matches!(backend.register().await, Err(BackendError::Closed)));
    }

    struct BrokenStore {
        watch_error: bool,
    }

    #[async_trait]
    impl StoreClient for BrokenStore {
        async fn watch(
            &self,
            _event: &str,
            _keys: &[String],
        ) -> dice_client::Result<NotificationSource> {
            if self.watch_error {
                return Err(ConnectionError::Timeout);
            }
            let (tx, source) = NotificationSource::channel();
            tx.push(Notification::sentinel("server went away"));
            Ok(source)
        }

        async fn fire(&self, _command: &str, _args: &[String]) -> dice_client::Result<()> {
            Err(ConnectionError::Closed)
        }

        async fn close(&self) -> dice_client::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_watch_failure_is_backend_error() {
        let mut backend = ChatBackend::new(Arc::new(BrokenStore { watch_error: true }), "room");
        assert!(matches!(
            backend.register().await,
            Err(BackendError::Connection(ConnectionError::Timeout))
        ));
        assert_eq!(backend.state(), BackendState::Unregistered);
    }

    #[tokio::test]
    async fn test_interrupted_priming_read() {
        let mut backend = ChatBackend::new(Arc::new(BrokenStore { watch_error: false }), "room");
        match backend.register().await {
            Err(BackendError::PrimingInterrupted(msg)) => assert_eq!(msg, "server went away"),
            other => panic!("expected priming failure, got {:?}", other.map(|_| ())),
        }
    }
}
