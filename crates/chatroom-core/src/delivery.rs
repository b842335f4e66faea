//! Delivery loop: drains a notification source into a render sink.

use crate::sink::RenderSink;
use dice_client::{Notification, NotificationSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why the delivery loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// An `Error` notification was dequeued (shutdown sentinel or terminated
    /// subscription).
    Sentinel(String),
    /// Waiting on the source failed.
    Interrupted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub reason: StopReason,
}

/// Forward every payload to `sink` until a terminal notification arrives.
pub async fn run_delivery(
    mut source: NotificationSource,
    sink: Arc<dyn RenderSink>,
) -> DeliveryOutcome {
    let mut delivered = 0usize;
    loop {
        match source.recv().await {
            Ok(Notification::Ok { payload }) => {
                sink.on_message(&payload).await;
                delivered += 1;
            }
            Ok(Notification::Error { message }) => {
                info!("[Delivery] stopping after {} messages: {}", delivered, message);
                return DeliveryOutcome {
                    delivered,
                    reason: StopReason::Sentinel(message),
                };
            }
            Err(e) => {
                warn!("[Delivery] notification source interrupted: {}", e);
                return DeliveryOutcome {
                    delivered,
                    reason: StopReason::Interrupted(e.to_string()),
                };
            }
        }
    }
}

/// Result of a bounded join on the delivery task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResult {
    Finished(DeliveryOutcome),
    /// The task did not finish in time and was aborted.
    Cancelled,
    /// The task panicked.
    Failed(String),
}

/// Handle to a delivery loop running on its own task.
pub struct DeliveryLoop {
    handle: JoinHandle<DeliveryOutcome>,
}

impl DeliveryLoop {
    pub fn spawn(source: NotificationSource, sink: Arc<dyn RenderSink>) -> Self {
        let handle = tokio::spawn(run_delivery(source, sink));
        debug!("[Delivery] loop started");
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the loop to finish; abort it otherwise.
    pub async fn join(mut self, timeout: Duration) -> JoinResult {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(outcome)) => JoinResult::Finished(outcome),
            Ok(Err(e)) => {
                warn!("[Delivery] loop task failed: {}", e);
                JoinResult::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "[Delivery] loop did not stop within {:?}, cancelling",
                    timeout
                );
                self.handle.abort();
                JoinResult::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FnSink;
    use std::sync::Mutex;

    fn recording_sink() -> (Arc<dyn RenderSink>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = FnSink::new(move |text: &str| seen_clone.lock().unwrap().push(text.to_string()));
        (Arc::new(sink), seen)
    }

    #[tokio::test]
    async fn test_drains_queued_messages_then_stops_at_sentinel() {
        let (tx, source) = NotificationSource::channel();
        tx.push(Notification::ok("m1"));
        tx.push(Notification::ok("m2"));
        tx.push(Notification::sentinel("bye"));
        tx.push(Notification::ok("after sentinel"));

        let (sink, seen) = recording_sink();
        let outcome = run_delivery(source, sink).await;

        assert_eq!(*seen.lock().unwrap(), vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(
            outcome,
            DeliveryOutcome {
                delivered: 2,
                reason: StopReason::Sentinel("bye".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_payload_forwarded_verbatim() {
        let (tx, source) = NotificationSource::channel();
        tx.push(Notification::ok("  Bob:  spaced : colons  "));
        tx.push(Notification::ok(""));
        tx.push(Notification::sentinel("bye"));

        let (sink, seen) = recording_sink();
        run_delivery(source, sink).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["  Bob:  spaced : colons  ".to_string(), String::new()]
        );
    }

    #[tokio::test]
    async fn test_interrupted_source_stops_loop() {
        let (tx, source) = NotificationSource::channel();
        tx.push(Notification::ok("last words"));
        tx.close();

        let (sink, seen) = recording_sink();
        let outcome = run_delivery(source, sink).await;

        assert_eq!(*seen.lock().unwrap(), vec!["last words".to_string()]);
        assert_eq!(outcome.delivered, 1);
        assert!(matches!(outcome.reason, StopReason::Interrupted(_)));
    }

    #[tokio::test]
    async fn test_join_finishes_after_sentinel() {
        let (_tx, source) = NotificationSource::channel();
        let sentinel = source.handle();
        let (sink, _seen) = recording_sink();

        let delivery = DeliveryLoop::spawn(source, sink);
        sentinel.push(Notification::sentinel("shutdown"));

        let result = delivery.join(Duration::from_secs(1)).await;
        assert_eq!(
            result,
            JoinResult::Finished(DeliveryOutcome {
                delivered: 0,
                reason: StopReason::Sentinel("shutdown".into()),
            })
        );
    }

    struct StuckSink;

    #[async_trait::async_trait]
    impl RenderSink for StuckSink {
        async fn on_message(&self, _text: &str) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_join_cancels_stuck_sink() {
        let (tx, source) = NotificationSource::channel();
        tx.push(Notification::ok("never rendered"));
        tx.push(Notification::sentinel("shutdown"));

        let delivery = DeliveryLoop::spawn(source, Arc::new(StuckSink));
        let started = std::time::Instant::now();
        let result = delivery.join(Duration::from_millis(100)).await;

        assert_eq!(result, JoinResult::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
