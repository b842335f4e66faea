//! TCP store client speaking RESP2 to a DiceDB server.
//!
//! Commands go over one shared connection. Every `watch` opens its own
//! connection, because a connection in watch mode only carries push frames.

use crate::config::ClientConfig;
use crate::error::{ConnectionError, Result};
use crate::resp::{encode_command, RespParser, Value};
use crate::traits::StoreClient;
use crate::types::{Notification, NotificationHandle, NotificationSender, NotificationSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 4096;

struct CommandConnection {
    stream: TcpStream,
    parser: RespParser,
}

pub struct TcpStoreClient {
    config: ClientConfig,
    command: Mutex<Option<CommandConnection>>,
    watchers: parking_lot::Mutex<Vec<(JoinHandle<()>, NotificationHandle)>>,
    closed: AtomicBool,
}

impl TcpStoreClient {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = open_stream(config).await?;
        tracing::info!("[DiceTcp] connected to {}", config.addr());
        Ok(Self {
            config: config.clone(),
            command: Mutex::new(Some(CommandConnection {
                stream,
                parser: RespParser::new(),
            })),
            watchers: parking_lot::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
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

async fn open_stream(config: &ClientConfig) -> Result<TcpStream> {
    let addr = config.addr();
    let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&addr))
        .await
        .map_err(|_| ConnectionError::Timeout)??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn read_reply(stream: &mut TcpStream, parser: &mut RespParser) -> Result<Value> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        if let Some(value) = parser.next_value()? {
            return Ok(value);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ConnectionError::Closed);
        }
        parser.feed(&buf[..n]);
    }
}

/// Map a watch push frame (`[command, fingerprint, value]`) to a notification.
pub(crate) fn frame_to_notification(value: Value) -> Option<Notification> {
    match value {
        Value::Array(Some(items)) if items.len() == 3 => items[2].as_text().map(Notification::ok),
        Value::Array(_) => None,
        Value::Error(message) => Some(Notification::Error { message }),
        scalar => scalar.as_text().map(Notification::ok),
    }
}

async fn pump_watch(mut stream: TcpStream, tx: NotificationSender) {
    let mut parser = RespParser::new();
    let mut buf = [0u8; READ_CHUNK];

    let reason = 'read: loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break 'read "watch connection closed by server".to_string(),
            Ok(n) => n,
            Err(e) => {
                tracing::error!("[DiceTcp] watch read failed: {}", e);
                break 'read format!("watch connection failed: {}", e);
            }
        };
        parser.feed(&buf[..n]);

        loop {
            match parser.next_value() {
                Ok(Some(value)) => match frame_to_notification(value) {
                    Some(notification) => {
                        let terminal = notification.is_terminal();
                        if !tx.push(notification) {
                            tracing::debug!("[DiceTcp] watch consumer gone, stopping reader");
                            return;
                        }
                        if terminal {
                            return;
                        }
                    }
                    None => tracing::warn!("[DiceTcp] ignoring unexpected watch frame"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("[DiceTcp] watch frame decode failed: {}", e);
                    break 'read format!("watch stream corrupted: {}", e);
                }
            }
        }
    };

    tracing::debug!("[DiceTcp] {}", reason);
    tx.push(Notification::sentinel(reason));
}

#[async_trait]
impl StoreClient for TcpStoreClient {
    async fn watch(&self, event: &str, keys: &[String]) -> Result<NotificationSource> {
        self.ensure_open()?;
        let mut stream = open_stream(&self.config).await?;
        stream.write_all(&encode_command(event, keys)).await?;

        let (tx, source) = NotificationSource::channel();
        let notifier = tx.downgrade();
        let handle = tokio::spawn(pump_watch(stream, tx));
        self.watchers.lock().push((handle, notifier));

        tracing::info!("[DiceTcp] {} {:?}", event, keys);
        Ok(source)
    }

    async fn fire(&self, command: &str, args: &[String]) -> Result<()> {
        self.ensure_open()?;
        let mut guard = self.command.lock().await;
        let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;

        conn.stream.write_all(&encode_command(command, args)).await?;
        match read_reply(&mut conn.stream, &mut conn.parser).await? {
            Value::Error(message) => Err(ConnectionError::Server(message)),
            reply => {
                tracing::trace!("[DiceTcp] {} -> {:?}", command, reply);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let watchers: Vec<_> = self.watchers.lock().drain(..).collect();
        for (handle, notifier) in watchers {
            notifier.close();
            handle.abort();
        }
        if let Some(mut conn) = self.command.lock().await.take() {
            if let Err(e) = conn.stream.shutdown().await {
                tracing::debug!("[DiceTcp] shutdown of command connection failed: {}", e);
            }
        }
        tracing::info!("[DiceTcp] connection to {} closed", self.config.addr());
        Ok(())
    }
}

impl Drop for TcpStoreClient {
    fn drop(&mut self) {
        for (handle, notifier) in self.watchers.get_mut().drain(..) {
            notifier.close();
            handle.abort();
        }
    }
}
