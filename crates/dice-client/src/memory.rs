//! In-process store with DiceDB watch semantics.
//!
//! Every key is a last-writer-wins cell backed by `tokio::sync::watch`, so a
//! subscriber that is not scheduled between two writes only ever sees the
//! newer value. This mirrors a server that re-reads the key when it notifies.

use crate::error::{ConnectionError, Result};
use crate::traits::StoreClient;
use crate::types::{Notification, NotificationHandle, NotificationSource};
use crate::{GET_WATCH, SET};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared key space. Cheap to clone; clones see the same keys.
#[derive(Clone, Default)]
pub struct MemoryStore {
    cells: Arc<Mutex<HashMap<String, Arc<watch::Sender<String>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to this store.
    pub fn connect(&self) -> MemoryClient {
        MemoryClient {
            store: self.clone(),
            closed: AtomicBool::new(false),
            pumps: Mutex::new(Vec::new()),
        }
    }

    /// Current value of `key`, if it was ever written.
    pub fn get(&self, key: &str) -> Option<String> {
        self.cells.lock().get(key).map(|cell| cell.borrow().clone())
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.cell(key).send_replace(value.into());
    }

    fn cell(&self, key: &str) -> Arc<watch::Sender<String>> {
        self.cells
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(watch::channel(String::new()).0))
            .clone()
    }
}

/// One connection to a [`MemoryStore`].
pub struct MemoryClient {
    store: MemoryStore,
    closed: AtomicBool,
    pumps: Mutex<Vec<(JoinHandle<()>, NotificationHandle)>>,
}

impl MemoryClient {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ConnectionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn watch(&self, event: &str, keys: &[String]) -> Result<NotificationSource> {
        self.ensure_open()?;
        if !event.eq_ignore_ascii_case(GET_WATCH) {
            return Err(ConnectionError::Unsupported(event.to_string()));
        }
        let [key] = keys else {
            return Err(ConnectionError::Unsupported(format!(
                "{} expects exactly one key, got {}",
                event,
                keys.len()
            )));
        };

        let mut rx = self.store.cell(key).subscribe();
        let (tx, source) = NotificationSource::channel();

        // Priming value: whatever the key holds right now.
        let current = rx.borrow_and_update().clone();
        tx.push(Notification::ok(current));

        // The pump owns the only strong sender: if it stops, the source closes.
        let notifier = tx.downgrade();
        let pump_key = key.clone();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                if !tx.push(Notification::ok(value)) {
                    break;
                }
            }
            debug!("[MemoryStore] watch pump for '{}' ended", pump_key);
        });
        self.pumps.lock().push((handle, notifier));

        debug!("[MemoryStore] watching '{}'", key);
        Ok(source)
    }

    async fn fire(&self, command: &str, args: &[String]) -> Result<()> {
        self.ensure_open()?;
        if !command.eq_ignore_ascii_case(SET) {
            return Err(ConnectionError::Unsupported(command.to_string()));
        }
        match args {
            [key, value] => {
                self.store.set(key, value.as_str());
                Ok(())
            }
            _ => Err(ConnectionError::Server(format!(
                "ERR wrong number of arguments for '{}' command",
                command
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let pumps: Vec<_> = self.pumps.lock().drain(..).collect();
        for (handle, notifier) in pumps {
            notifier.close();
            handle.abort();
        }
        debug!("[MemoryStore] connection closed");
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        for (handle, notifier) in self.pumps.get_mut().drain(..) {
            notifier.close();
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key() -> Vec<String> {
        vec!["room".to_string()]
    }

    fn set_args(value: &str) -> Vec<String> {
        vec!["room".to_string(), value.to_string()]
    }

    #[tokio::test]
    async fn test_priming_value_is_current_value() {
        let store = MemoryStore::new();
        let client = store.connect();

        let mut empty = client.watch(GET_WATCH, &key()).await.unwrap();
        assert_eq!(empty.recv().await.unwrap(), Notification::ok(""));

        store.set("room", "already here");
        let mut primed = client.watch(GET_WATCH, &key()).await.unwrap();
        assert_eq!(
            primed.recv().await.unwrap(),
            Notification::ok("already here")
        );
    }

    #[tokio::test]
    async fn test_set_fans_out_to_every_watcher() {
        let store = MemoryStore::new();
        let alice = store.connect();
        let bob = store.connect();

        let mut alice_src = alice.watch(GET_WATCH, &key()).await.unwrap();
        let mut bob_src = bob.watch(GET_WATCH, &key()).await.unwrap();
        alice_src.recv().await.unwrap();
        bob_src.recv().await.unwrap();

        alice.fire(SET, &set_args("Alice: hi")).await.unwrap();

        assert_eq!(alice_src.recv().await.unwrap(), Notification::ok("Alice: hi"));
        assert_eq!(bob_src.recv().await.unwrap(), Notification::ok("Alice: hi"));
        assert_eq!(store.get("room").as_deref(), Some("Alice: hi"));
    }

    #[tokio::test]
    async fn test_unscheduled_subscriber_sees_only_last_write() {
        let store = MemoryStore::new();
        let client = store.connect();
        let mut source = client.watch(GET_WATCH, &key()).await.unwrap();
        source.recv().await.unwrap();

        // No await point between the writes: the pump cannot run in between.
        client.fire(SET, &set_args("first")).await.unwrap();
        client.fire(SET, &set_args("second")).await.unwrap();

        assert_eq!(source.recv().await.unwrap(), Notification::ok("second"));
        let more = tokio::time::timeout(Duration::from_millis(50), source.recv()).await;
        assert!(more.is_err(), "only one notification expected");
    }

    #[tokio::test]
    async fn test_rejects_unknown_commands() {
        let client = MemoryStore::new().connect();
        assert!(matches!(
            client.fire("DEL", &key()).await,
            Err(ConnectionError::Unsupported(_))
        ));
        assert!(matches!(
            client.watch("ZRANGE.WATCH", &key()).await,
            Err(ConnectionError::Unsupported(_))
        ));
        assert!(matches!(
            client.fire(SET, &key()).await,
            Err(ConnectionError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_client_fails_and_interrupts_sources() {
        let client = MemoryStore::new().connect();
        let mut source = client.watch(GET_WATCH, &key()).await.unwrap();
        source.recv().await.unwrap();

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());

        assert!(matches!(
            client.fire(SET, &set_args("late")).await,
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(
            client.watch(GET_WATCH, &key()).await,
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(source.recv().await, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_client_interrupts_sources() {
        let store = MemoryStore::new();
        let client = store.connect();
        let mut source = client.watch(GET_WATCH, &key()).await.unwrap();
        source.recv().await.unwrap();

        drop(client);
        store.set("room", "nobody is pumping this");

        let next = tokio::time::timeout(Duration::from_secs(2), source.recv())
            .await
            .expect("source hung after its client was dropped");
        assert!(matches!(next, Err(ConnectionError::Closed)));
    }
}
