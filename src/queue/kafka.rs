use std::{collections::BTreeMap, time::Duration};

use parking_lot::Mutex;
use rdkafka::{
    ClientConfig, ClientContext, Message as _, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer as _, ConsumerContext, StreamConsumer},
    producer::{FutureProducer, Producer as _},
    statistics::Statistics,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    QueueMessage, RetryableMessage, TransportHandle, codec,
    queue::{Counters, MessageQueue, QueueError},
    transport::{
        SenderService, Submission, Transport,
        kafka::{KafkaSender, classify, flush},
        layers::{JsonLayer, JsonService},
    },
};

const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// Connection settings for [`KafkaQueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma separated `host:port` list.
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub send_timeout_ms: u64,
    /// How often librdkafka reports statistics. `0` disables lag reporting.
    pub statistics_interval_ms: u64,
    /// Extra librdkafka properties, applied last.
    pub properties: BTreeMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".into(),
            topic: String::new(),
            group_id: String::new(),
            send_timeout_ms: 5_000,
            statistics_interval_ms: 5_000,
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaConfig {
    pub fn new(
        brokers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_statistics_interval(mut self, interval: Duration) -> Self {
        self.statistics_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.send_timeout_ms.to_string());
        self.apply_properties(config)
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set(
                "statistics.interval.ms",
                self.statistics_interval_ms.to_string(),
            );
        self.apply_properties(config)
    }

    fn apply_properties(&self, mut config: ClientConfig) -> ClientConfig {
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }
}

/// Where a delivered message lives in Kafka.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Consumer context keeping the latest lag figures reported by librdkafka.
#[derive(Default)]
pub struct StatsContext {
    consumer_lag: Mutex<BTreeMap<i32, i64>>,
}

impl StatsContext {
    fn consumer_lag(&self) -> BTreeMap<i32, i64> {
        self.consumer_lag.lock().clone()
    }
}

impl ClientContext for StatsContext {
    fn stats(&self, statistics: Statistics) {
        let mut lag = BTreeMap::new();
        for topic in statistics.topics.values() {
            for (id, partition) in &topic.partitions {
                // librdkafka reports the internal UA partition as -1 and unknown lag as -1.
                if *id >= 0 && partition.consumer_lag >= 0 {
                    lag.insert(*id, partition.consumer_lag);
                }
            }
        }
        *self.consumer_lag.lock() = lag;
    }
}

impl ConsumerContext for StatsContext {}

/// Queue backed by one Kafka topic.
///
/// The destination key becomes the Kafka message key, so per-key order
/// follows from Kafka's per-partition order. Offsets are committed only
/// through [`MessageQueue::acknowledge`], which gives at-least-once delivery.
pub struct KafkaQueue {
    topic: String,
    transport: Transport<JsonService<SenderService<KafkaSender>>>,
    producer: FutureProducer,
    consumer: StreamConsumer<StatsContext>,
    send_timeout: Duration,
    stopped: CancellationToken,
    counters: Counters,
}

impl KafkaQueue {
    /// Create the producer and consumer described by `config` and subscribe
    /// to its topic.
    #[tracing::instrument(skip_all, fields(topic = %config.topic))]
    pub fn connect(config: &KafkaConfig) -> Result<Self, QueueError> {
        let producer: FutureProducer = config.producer_config().create().map_err(classify)?;
        let consumer: StreamConsumer<StatsContext> = config
            .consumer_config()
            .create_with_context(StatsContext::default())
            .map_err(classify)?;
        consumer.subscribe(&[config.topic.as_str()]).map_err(classify)?;

        tracing::info!(brokers = %config.brokers, group_id = %config.group_id, "Kafka queue connected");
        Ok(Self::new(
            producer,
            consumer,
            config.topic.clone(),
            config.send_timeout(),
        ))
    }

    /// Assemble a queue from clients built elsewhere. The consumer must
    /// already be subscribed and have auto commit disabled.
    pub fn new(
        producer: FutureProducer,
        consumer: StreamConsumer<StatsContext>,
        topic: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        let topic = topic.into();
        let sender = KafkaSender::new(producer.clone(), topic.clone()).with_timeout(send_timeout);
        Self {
            transport: Transport::new(sender).layer(JsonLayer),
            topic,
            producer,
            consumer,
            send_timeout,
            stopped: CancellationToken::new(),
            counters: Counters::default(),
        }
    }

    fn commit(&self, position: &KafkaPosition) -> Result<(), QueueError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset + 1),
            )
            .map_err(classify)?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(classify)
    }
}

#[async_trait::async_trait]
impl MessageQueue for KafkaQueue {
    #[tracing::instrument(skip(self, messages), fields(topic = %self.topic, messages = messages.len()))]
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

            let delivery = tokio::select! {
                _ = cancel.cancelled() => return (tracing::Span::none(), None),
                _ = self.stopped.cancelled() => return (tracing::Span::none(), None),
                delivery = self.consumer.recv() => delivery.map(|message| message.detach()),
            };

            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(error) => {
                    tracing::warn!(%error, topic = %self.topic, "Kafka receive failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return (tracing::Span::none(), None),
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => continue,
                    }
                }
            };

            let position = KafkaPosition {
                topic: delivery.topic().to_owned(),
                partition: delivery.partition(),
                offset: delivery.offset(),
            };
            let span = tracing::info_span!(
                "queue.receive",
                topic = %position.topic,
                partition = position.partition,
                offset = position.offset,
                kind = tracing::field::Empty,
            );

            match codec::decode(delivery.payload().unwrap_or_default()) {
                Ok(mut message) => {
                    span.record("kind", tracing::field::display(message.kind()));
                    message.set_transport_handle(Some(TransportHandle::new(position)));
                    self.counters.received();
                    return (span, Some(message));
                }
                Err(error) => {
                    self.counters.malformed();
                    span.in_scope(|| {
                        tracing::error!(%error, "Dropping malformed message");
                        if let Err(error) = self.commit(&position) {
                            tracing::warn!(%error, "Failed to commit past malformed message");
                        }
                    });
                }
            }
        }
    }

    async fn acknowledge(&self, handle: &TransportHandle) -> Result<(), QueueError> {
        if self.stopped.is_cancelled() {
            return Err(QueueError::stopped());
        }
        let position = handle
            .downcast_ref::<KafkaPosition>()
            .ok_or_else(|| QueueError::rejected("handle was not issued by a Kafka queue"))?;

        self.commit(position)?;
        self.counters.acknowledged();
        Ok(())
    }

    async fn stop(&self) {
        if self.stopped.is_cancelled() {
            tracing::warn!(topic = %self.topic, "Kafka queue already stopped");
            return;
        }
        self.stopped.cancel();
        self.consumer.unsubscribe();

        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        match tokio::task::spawn_blocking(move || flush(&producer, timeout)).await {
            Ok(Ok(())) => tracing::info!(topic = %self.topic, "Kafka queue stopped"),
            Ok(Err(error)) => tracing::warn!(%error, "Failed to flush producer"),
            Err(error) => tracing::warn!(%error, "Producer flush task failed"),
        }
    }

    fn log_stats(&self) {
        let lag = self.consumer.context().consumer_lag();
        let stats = self.counters.snapshot();
        tracing::info!(
            topic = %self.topic,
            consumer_lag = lag.values().sum::<i64>(),
            partitions = ?lag,
            producer_queue = self.producer.in_flight_count(),
            submitted = stats.submitted,
            received = stats.received,
            malformed = stats.malformed,
            acknowledged = stats.acknowledged,
            "Kafka queue stats"
        );
    }
}
