use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    QueueMessage, RetryableMessage, TransportHandle, codec,
    queue::{Counters, MessageQueue, QueueError, QueueStats},
    transport::{
        InMemory, InMemoryPosition, SenderService, Submission, Transport,
        layers::{JsonLayer, JsonService},
    },
};

/// Partitioned in-process queue.
///
/// Messages go through the same encode path as a broker-backed queue and
/// come back decoded, with an [`InMemoryPosition`] as their transport
/// handle. Clones share the same queue.
#[derive(Clone)]
pub struct InMemoryQueue {
    log: InMemory,
    transport: Transport<JsonService<SenderService<InMemory>>>,
    stopped: CancellationToken,
    counters: Arc<Counters>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::from_log(InMemory::default())
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self::from_log(InMemory::with_partitions(partitions))
    }

    fn from_log(log: InMemory) -> Self {
        Self {
            transport: Transport::new(log.clone()).layer(JsonLayer),
            log,
            stopped: CancellationToken::new(),
            counters: Arc::default(),
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Messages waiting to be received, per partition.
    pub fn backlog(&self) -> Vec<usize> {
        self.log.backlog()
    }

    /// Offset of the next unacknowledged message, per partition.
    pub fn committed(&self) -> Vec<u64> {
        self.log.committed()
    }

    /// Partition messages submitted under `destination_key` land in.
    pub fn partition_for(&self, destination_key: &str) -> usize {
        self.log.partition_for(destination_key)
    }

    #[cfg(test)]
    pub(crate) fn log(&self) -> &InMemory {
        &self.log
    }
}

#[async_trait::async_trait]
impl MessageQueue for InMemoryQueue {
    #[tracing::instrument(skip(self, messages), fields(messages = messages.len()))]
    async fn submit(
        &self,
        destination_key: &str,
        messages: Vec<QueueMessage>,
    ) -> Result<(), QueueError> {
        if self.stopped.is_cancelled() {
            return Err(QueueError::stopped());
        }

        let count = messages.len();
        self.transport
            .send(Submission::new(destination_key, messages))
            .await?;
        self.counters.submitted(count);
        Ok(())
    }

    async fn receive(&self, cancel: &CancellationToken) -> (tracing::Span, Option<QueueMessage>) {
        loop {
            if self.stopped.is_cancelled() {
                return (tracing::Span::none(), None);
            }

            let record = tokio::select! {
                record = self.log.next(cancel) => record,
                _ = self.stopped.cancelled() => None,
            };
            let Some(record) = record else {
                return (tracing::Span::none(), None);
            };

            let span = tracing::info_span!(
                "queue.receive",
                topic = "in-memory",
                partition = record.partition,
                offset = record.offset,
                key = %record.key,
                kind = tracing::field::Empty,
            );

            match codec::decode(&record.payload) {
                Ok(mut message) => {
                    span.record("kind", tracing::field::display(message.kind()));
                    message.set_transport_handle(Some(TransportHandle::new(record.position())));
                    self.counters.received();
                    return (span, Some(message));
                }
                Err(error) => {
                    self.counters.malformed();
                    span.in_scope(|| tracing::error!(%error, "Dropping malformed message"));
                    self.log.commit(record.position());
                }
            }
        }
    }

    async fn acknowledge(&self, handle: &TransportHandle) -> Result<(), QueueError> {
        if self.stopped.is_cancelled() {
            return Err(QueueError::stopped());
        }
        let position = handle
            .downcast_ref::<InMemoryPosition>()
            .ok_or_else(|| QueueError::rejected("handle was not issued by an in-memory queue"))?;

        if !self.log.commit(*position) {
            return Err(QueueError::rejected(format!(
                "unknown position {}:{}",
                position.partition, position.offset
            )));
        }
        self.counters.acknowledged();
        Ok(())
    }

    async fn stop(&self) {
        if self.stopped.is_cancelled() {
            tracing::warn!("In-memory queue already stopped");
            return;
        }
        self.stopped.cancel();
        tracing::info!("In-memory queue stopped");
    }

    fn log_stats(&self) {
        let backlog = self.log.backlog();
        let stats = self.counters.snapshot();
        tracing::info!(
            backlog = backlog.iter().sum::<usize>(),
            partitions = ?backlog,
            submitted = stats.submitted,
            received = stats.received,
            malformed = stats.malformed,
            acknowledged = stats.acknowledged,
            "In-memory queue stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        Envelope, PayloadKind, QueueErrorKind,
        envelope::LogRowMessage,
        payload::{ErrorObjectDataSyncArgs, PushMetricsArgs, SessionDataSyncArgs},
        rows::LogRow,
        transport::{Record, Sender},
    };

    fn sync(session_id: i64) -> QueueMessage {
        Envelope::from_payload(SessionDataSyncArgs { session_id }).into()
    }

    async fn receive_now(queue: &InMemoryQueue) -> Option<QueueMessage> {
        let cancel = CancellationToken::new();
        let (_span, message) = tokio::time::timeout(Duration::from_secs(5), queue.receive(&cancel))
            .await
            .unwrap();
        message
    }

    #[tokio::test]
    async fn messages_round_trip_with_a_handle() {
        let queue = InMemoryQueue::with_partitions(2);
        let row: QueueMessage = LogRowMessage::new(LogRow {
            body: "boot".into(),
            ..Default::default()
        })
        .into();
        queue.submit("project-1", vec![row.clone()]).await.unwrap();

        let received = receive_now(&queue).await.unwrap();
        assert_eq!(received.kind(), PayloadKind::PushLogsFlattened);
        assert_eq!(received, {
            let mut expected = row;
            expected.set_transport_handle(received.transport_handle().cloned());
            expected
        });

        let position = received
            .transport_handle()
            .and_then(|h| h.downcast_ref::<InMemoryPosition>())
            .copied()
            .unwrap();
        assert_eq!(position.partition, queue.partition_for("project-1"));

        queue
            .acknowledge(received.transport_handle().unwrap())
            .await
            .unwrap();
        assert_eq!(queue.committed()[position.partition], position.offset + 1);
        assert_eq!(queue.stats().acknowledged, 1);
    }

    #[tokio::test]
    async fn per_key_order_is_preserved() {
        let queue = InMemoryQueue::with_partitions(4);
        for batch in 0..3 {
            let a = (0..3).map(|i| sync(batch * 3 + i)).collect();
            queue.submit("a", a).await.unwrap();
            queue.submit("b", vec![sync(100 + batch)]).await.unwrap();
        }

        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();
        for _ in 0..12 {
            let message = receive_now(&queue).await.unwrap();
            let Some(crate::Payload::SessionDataSync(args)) =
                message.as_envelope().and_then(Envelope::payload)
            else {
                panic!("unexpected message {message:?}");
            };
            if args.session_id >= 100 {
                seen_b.push(args.session_id);
            } else {
                seen_a.push(args.session_id);
            }
        }
        assert_eq!(seen_a, (0..9).collect::<Vec<_>>());
        assert_eq!(seen_b, vec![100, 101, 102]);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let queue = InMemoryQueue::with_partitions(1);
        let mut log = queue.log().clone();
        log.send(vec![Record {
            key: "k".into(),
            kind: PayloadKind::SessionDataSync,
            payload: b"{\"Type\": 42}".to_vec(),
        }])
        .await
        .unwrap();
        queue.submit("k", vec![sync(1)]).await.unwrap();

        let received = receive_now(&queue).await.unwrap();
        assert_eq!(received.kind(), PayloadKind::SessionDataSync);
        assert_eq!(queue.stats().malformed, 1);
        assert_eq!(queue.committed(), vec![1]);
    }

    #[tokio::test]
    async fn failed_encoding_sends_nothing() {
        let queue = InMemoryQueue::new();
        let retired: QueueMessage = Envelope::from_payload(PushMetricsArgs::default()).into();

        let err = queue.submit("k", vec![sync(1), retired]).await.unwrap_err();
        assert!(matches!(err.kind(), QueueErrorKind::Envelope(_)));
        assert!(queue.backlog().iter().all(|depth| *depth == 0));
        assert_eq!(queue.stats().submitted, 0);
    }

    #[tokio::test]
    async fn health_checks_are_accepted_but_not_delivered() {
        let queue = InMemoryQueue::new();
        queue
            .submit("k", vec![QueueMessage::health_check()])
            .await
            .unwrap();
        assert!(queue.backlog().iter().all(|depth| *depth == 0));
    }

    #[tokio::test]
    async fn receive_honors_cancellation() {
        let queue = InMemoryQueue::new();
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.receive(&cancel).await.1 })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let received = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn stop_ends_receiving_and_submitting() {
        let queue = InMemoryQueue::new();
        queue.submit("k", vec![sync(1)]).await.unwrap();
        queue.stop().await;
        queue.stop().await;

        assert!(receive_now(&queue).await.is_none());
        let err = queue.submit("k", vec![sync(2)]).await.unwrap_err();
        assert!(matches!(err.kind(), QueueErrorKind::Stopped));
    }

    #[tokio::test]
    async fn foreign_handles_are_rejected() {
        let queue = InMemoryQueue::new();
        let handle = TransportHandle::new(ErrorObjectDataSyncArgs { error_object_id: 1 });
        let err = queue.acknowledge(&handle).await.unwrap_err();
        assert!(matches!(err.kind(), QueueErrorKind::SubmitRejected(_)));
    }
}
