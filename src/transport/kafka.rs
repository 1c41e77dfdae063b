use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    error::{KafkaError, RDKafkaErrorCode},
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};

use crate::{
    QueueError,
    transport::{Record, Sender},
};

/// Header carrying the numeric payload kind of every record.
pub const KIND_HEADER: &str = "payload-kind";

/// Kafka transport sender.
///
/// Publishes a batch of records to one topic with a `FutureProducer`. The
/// record key drives librdkafka's partitioner, which keeps per-key order.
/// All records of a batch are enqueued before any delivery is awaited.
#[derive(Clone)]
pub struct KafkaSender {
    /// Kafka producer handle
    producer: FutureProducer,
    topic: String,
    /// Timeout for each delivery report
    timeout: Duration,
}

impl KafkaSender {
    /// Create a new Kafka sender for `topic`.
    ///
    /// Default timeout is 5 seconds.
    pub fn new(producer: FutureProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Set a custom timeout for delivery reports.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Sender for KafkaSender {
    type Error = QueueError;

    #[tracing::instrument(skip_all, fields(topic = %self.topic, records = records.len()))]
    async fn send(&mut self, records: Vec<Record>) -> Result<(), Self::Error> {
        let mut deliveries = Vec::with_capacity(records.len());
        for record in &records {
            let code = record.kind.code().to_string();
            let headers = OwnedHeaders::new().insert(Header {
                key: KIND_HEADER,
                value: Some(code.as_str()),
            });
            let future = FutureRecord::to(&self.topic)
                .key(record.key.as_bytes())
                .payload(&record.payload)
                .headers(headers);

            let delivery = self
                .producer
                .send_result(future)
                .map_err(|(err, _)| classify(err))?;
            deliveries.push(delivery);
        }

        for delivery in deliveries {
            match tokio::time::timeout(self.timeout, delivery).await {
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err((err, _)))) => return Err(classify(err)),
                Ok(Err(_canceled)) => {
                    return Err(QueueError::unavailable("producer dropped the delivery"));
                }
                Err(_elapsed) => {
                    return Err(QueueError::unavailable("timed out waiting for delivery"));
                }
            }
        }

        Ok(())
    }
}

/// Flush outstanding deliveries, giving up after `timeout`.
pub(crate) fn flush(producer: &FutureProducer, timeout: Duration) -> Result<(), QueueError> {
    use rdkafka::producer::Producer as _;

    producer
        .flush(Timeout::After(timeout))
        .map_err(classify)
}

/// Split rdkafka errors into retryable outages and permanent rejections.
pub(crate) fn classify(err: KafkaError) -> QueueError {
    let transient = match err.rdkafka_error_code() {
        Some(code) => matches!(
            code,
            RDKafkaErrorCode::QueueFull
                | RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::BrokerNotAvailable
                | RDKafkaErrorCode::LeaderNotAvailable
                | RDKafkaErrorCode::NotLeaderForPartition
                | RDKafkaErrorCode::RequestTimedOut
                | RDKafkaErrorCode::NetworkException
        ),
        None => matches!(err, KafkaError::Canceled),
    };

    if transient {
        QueueError::unavailable(err)
    } else {
        QueueError::rejected(err)
    }
}
