use tokio_util::sync::CancellationToken;

use crate::{
    QueueMessage, TransportHandle,
    queue::{MessageQueue, QueueError},
};

/// Queue that accepts every submission and never delivers anything.
///
/// This is the administratively disabled mode: a deployment with its queue
/// turned off can keep producers and consumers wired up while every message
/// is discarded. It also serves wiring tests of code that only publishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockQueue;

#[async_trait::async_trait]
impl MessageQueue for MockQueue {
    async fn submit(
        &self,
        _destination_key: &str,
        _messages: Vec<QueueMessage>,
    ) -> Result<(), QueueError> {
        Ok(())
    }

    async fn receive(&self, _cancel: &CancellationToken) -> (tracing::Span, Option<QueueMessage>) {
        (tracing::Span::none(), None)
    }

    async fn acknowledge(&self, _handle: &TransportHandle) -> Result<(), QueueError> {
        Ok(())
    }

    async fn stop(&self) {}

    fn log_stats(&self) {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Envelope, payload::SessionDataSyncArgs};

    #[tokio::test]
    async fn submit_succeeds_and_receive_is_empty() {
        let queue = MockQueue;
        let cancel = CancellationToken::new();

        for k in 1..=5 {
            let messages = (0..k)
                .map(|session_id| Envelope::from_payload(SessionDataSyncArgs { session_id }).into())
                .collect();
            queue.submit("k", messages).await.unwrap();

            let (_span, received) = queue.receive(&cancel).await;
            assert!(received.is_none());
        }

        queue.stop().await;
        queue.log_stats();
    }

    #[tokio::test]
    async fn receive_returns_before_a_short_deadline() {
        let queue = MockQueue;
        let cancel = CancellationToken::new();
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            deadline.cancel();
        });

        let (_span, received) =
            tokio::time::timeout(Duration::from_millis(200), queue.receive(&cancel))
                .await
                .expect("mock receive must not block");
        assert!(received.is_none());
    }
}
