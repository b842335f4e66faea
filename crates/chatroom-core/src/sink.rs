//! Render sinks receive delivered chat lines.
//!
//! The delivery loop calls [`RenderSink::on_message`] from its own task, so a
//! sink either renders directly (it must be `Send + Sync`) or hands the line
//! to the UI's context, which is what [`ChannelSink`] does.

use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait RenderSink: Send + Sync + 'static {
    async fn on_message(&self, text: &str);
}

/// Adapts a synchronous closure.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> RenderSink for FnSink<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    async fn on_message(&self, text: &str) {
        (self.0)(text)
    }
}

/// Forwards lines to a channel drained by the UI.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RenderSink for ChannelSink {
    async fn on_message(&self, text: &str) {
        if self.tx.send(text.to_string()).is_err() {
            tracing::debug!("[RenderSink] UI receiver gone, dropping line");
        }
    }
}
