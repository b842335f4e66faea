//! Notification data model shared by every store client.

use crate::error::{ConnectionError, Result};

/// A value delivered by a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new value was observed on the watched key.
    Ok { payload: String },
    /// The subscription terminated or a shutdown was requested.
    Error { message: String },
}

impl Notification {
    pub fn ok(payload: impl Into<String>) -> Self {
        Notification::Ok {
            payload: payload.into(),
        }
    }

    /// Terminal marker injected to stop a consumer.
    pub fn sentinel(message: impl Into<String>) -> Self {
        Notification::Error {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Notification::Error { .. })
    }
}

/// Producer side of a [`NotificationSource`].
///
/// The channel stays open while at least one sender exists. Once every sender
/// is gone, the consumer drains what is queued and then sees an interruption.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: async_channel::Sender<Notification>,
}

impl NotificationSender {
    /// Enqueue a notification. Returns `false` once the consumer is gone.
    pub fn push(&self, notification: Notification) -> bool {
        self.tx.try_send(notification).is_ok()
    }

    /// Close the channel from the producer side. Items already queued can
    /// still be received; after that the consumer sees an interruption.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle that can enqueue without keeping the channel open.
    pub fn downgrade(&self) -> NotificationHandle {
        NotificationHandle {
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning producer handle.
///
/// Used for the shutdown sentinel and for teardown bookkeeping: it reaches the
/// same FIFO as the producers, but does not keep the channel alive.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    tx: async_channel::WeakSender<Notification>,
}

impl NotificationHandle {
    /// Enqueue a notification. Returns `false` if the channel is closed or
    /// every producer is gone.
    pub fn push(&self, notification: Notification) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.try_send(notification).is_ok(),
            None => false,
        }
    }

    pub fn close(&self) -> bool {
        self.tx.upgrade().map(|tx| tx.close()).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.upgrade().map(|tx| tx.is_closed()).unwrap_or(true)
    }
}

/// Ordered, unbounded FIFO of notifications with a single consumer.
///
/// Once an `Error` notification has been handed out, the source is terminated
/// and yields [`ConnectionError::Terminated`] without consuming anything else.
/// When every [`NotificationSender`] has been dropped, the remaining items are
/// yielded and then [`ConnectionError::Closed`].
#[derive(Debug)]
pub struct NotificationSource {
    rx: async_channel::Receiver<Notification>,
    handle: NotificationHandle,
    terminated: bool,
}

impl NotificationSource {
    pub fn channel() -> (NotificationSender, NotificationSource) {
        let (tx, rx) = async_channel::unbounded();
        let sender = NotificationSender { tx };
        let source = NotificationSource {
            rx,
            handle: sender.downgrade(),
            terminated: false,
        };
        (sender, source)
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Result<Notification> {
        if self.terminated {
            return Err(ConnectionError::Terminated);
        }
        let notification = self
            .rx
            .recv()
            .await
            .map_err(|_| ConnectionError::Closed)?;
        if notification.is_terminal() {
            self.terminated = true;
        }
        Ok(notification)
    }

    /// Handle that enqueues onto this source, e.g. for a shutdown sentinel.
    pub fn handle(&self) -> NotificationHandle {
        self.handle.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
