use std::{sync::Arc, time::Duration};

use telemetry_queue::payload::{ErrorGroupDataSyncArgs, SessionDataSyncArgs};
use telemetry_queue::{
    Consumer, ConsumerConfig, Envelope, InMemoryQueue, MessageHandler, MessageQueue, Payload,
    QueueMessage, RetryableMessage,
};
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

struct SyncHandler;

#[async_trait::async_trait]
impl MessageHandler for SyncHandler {
    async fn process(
        &self,
        _span: &tracing::Span,
        message: &QueueMessage,
    ) -> Result<(), tower::BoxError> {
        match message.as_envelope().and_then(Envelope::payload) {
            Some(Payload::SessionDataSync(args)) => {
                tracing::info!(session_id = args.session_id, "Session synced");
                Ok(())
            }
            Some(Payload::ErrorGroupDataSync(args)) => {
                // Simulate a flaky search index for odd groups.
                if args.error_group_id % 2 == 1 {
                    return Err("search index unavailable".into());
                }
                tracing::info!(error_group_id = args.error_group_id, "Error group synced");
                Ok(())
            }
            _ => Err(format!("no handler for {}", message.kind()).into()),
        }
    }

    fn destination_key(&self, message: &QueueMessage) -> String {
        match message.as_envelope().and_then(Envelope::payload) {
            Some(Payload::SessionDataSync(args)) => format!("session-{}", args.session_id),
            Some(Payload::ErrorGroupDataSync(args)) => format!("group-{}", args.error_group_id),
            _ => message.kind().to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    let queue = Arc::new(InMemoryQueue::with_partitions(4));

    for id in 0..4 {
        let session = Envelope::from_payload(SessionDataSyncArgs { session_id: id });
        let group = Envelope::from_payload(ErrorGroupDataSyncArgs { error_group_id: id })
            .with_max_retries(3);
        queue
            .submit(&format!("project-{id}"), vec![session.into(), group.into()])
            .await?;
    }

    let cancel = CancellationToken::new();
    let consumer = Consumer::new(Arc::clone(&queue), SyncHandler).with_config(
        ConsumerConfig::default()
            .with_workers(2)
            .with_idle_backoff(Duration::from_millis(50)),
    );
    let running = tokio::spawn(consumer.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    queue.log_stats();

    cancel.cancel();
    running.await??;
    queue.stop().await;

    Ok(())
}
