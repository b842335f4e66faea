use crate::error::Result;
use crate::types::NotificationSource;
use async_trait::async_trait;

/// Abstraction over a key-value store connection with watch support.
///
/// `watch` returns a source whose first notification is the current value of
/// the watched keys; later notifications follow every observed change.
/// After `close`, `watch` and `fire` fail with `ConnectionError::Closed`.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    async fn watch(&self, event: &str, keys: &[String]) -> Result<NotificationSource>;
    async fn fire(&self, command: &str, args: &[String]) -> Result<()>;
    async fn close(&self) -> Result<()>;
}
