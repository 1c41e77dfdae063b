//! Queue abstraction consumed by worker pools.
//!
//! A [`MessageQueue`] accepts batches under a destination key and hands
//! decoded messages back one at a time. Backends:
//!
//! - [`MockQueue`]: accepts everything, delivers nothing
//! - [`InMemoryQueue`]: partitioned in-process queue
//! - `KafkaQueue` (feature `kafka`): Kafka topic with manual offset commits

mod inmemory;
#[cfg(feature = "kafka")]
mod kafka;
mod mock;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing_error::SpanTrace;

use crate::{EnvelopeError, QueueMessage, TransportHandle};

pub use inmemory::InMemoryQueue;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaPosition, KafkaQueue, StatsContext};
pub use mock::MockQueue;

/// Transport-agnostic message queue.
#[async_trait::async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish `messages` under `destination_key`.
    ///
    /// Messages sharing a key are delivered in submission order. The call
    /// succeeds only once every message has been accepted by the transport.
    /// If any message cannot be encoded nothing is sent.
    async fn submit(
        &self,
        destination_key: &str,
        messages: Vec<QueueMessage>,
    ) -> Result<(), QueueError>;

    /// Wait for the next message.
    ///
    /// Returns `None` when `cancel` fires or the queue was stopped. The span
    /// carries the transport position of the delivery and should be entered
    /// while processing it. Undecodable deliveries are logged and skipped.
    async fn receive(&self, cancel: &CancellationToken) -> (tracing::Span, Option<QueueMessage>);

    /// Mark the delivery identified by `handle` as processed.
    async fn acknowledge(&self, handle: &TransportHandle) -> Result<(), QueueError>;

    /// Release consumer-side resources. Later receives yield nothing.
    async fn stop(&self);

    /// Emit backlog and lag figures through `tracing`.
    fn log_stats(&self);
}

/// Error returned by queue operations.
///
/// Each error captures:
/// - The underlying error kind
/// - A tracing span backtrace for improved diagnostics
#[derive(Debug)]
pub struct QueueError {
    context: SpanTrace,
    kind: QueueErrorKind,
}

/// Queue error kinds.
#[derive(Debug)]
pub enum QueueErrorKind {
    /// The transport could not be reached. Retrying later may succeed.
    TransportUnavailable(tower::BoxError),
    /// The transport refused the submission.
    SubmitRejected(tower::BoxError),
    /// A message could not be encoded.
    Envelope(EnvelopeError),
    /// The queue was stopped.
    Stopped,
}

impl QueueError {
    pub fn unavailable(err: impl Into<tower::BoxError>) -> Self {
        Self::new(QueueErrorKind::TransportUnavailable(err.into()))
    }

    pub fn rejected(err: impl Into<tower::BoxError>) -> Self {
        Self::new(QueueErrorKind::SubmitRejected(err.into()))
    }

    pub fn stopped() -> Self {
        Self::new(QueueErrorKind::Stopped)
    }

    /// Recover a queue error from a Tower boundary.
    ///
    /// Errors of unknown origin are treated as transport outages.
    pub fn from_box(err: tower::BoxError) -> Self {
        let err = match err.downcast::<QueueError>() {
            Ok(err) => return *err,
            Err(err) => err,
        };
        match err.downcast::<EnvelopeError>() {
            Ok(err) => (*err).into(),
            Err(err) => Self::unavailable(err),
        }
    }

    fn new(kind: QueueErrorKind) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind,
        }
    }

    pub fn kind(&self) -> &QueueErrorKind {
        &self.kind
    }

    /// Whether submitting the same messages again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, QueueErrorKind::TransportUnavailable(_))
    }
}

impl From<EnvelopeError> for QueueError {
    fn from(err: EnvelopeError) -> Self {
        Self::new(QueueErrorKind::Envelope(err))
    }
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            QueueErrorKind::TransportUnavailable(err) => {
                writeln!(f, "Transport unavailable: {err}")
            }
            QueueErrorKind::SubmitRejected(err) => writeln!(f, "Submit rejected: {err}"),
            QueueErrorKind::Envelope(err) => writeln!(f, "Envelope error: {err}"),
            QueueErrorKind::Stopped => writeln!(f, "Queue stopped"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            QueueErrorKind::TransportUnavailable(err) => Some(err.as_ref()),
            QueueErrorKind::SubmitRejected(err) => Some(err.as_ref()),
            QueueErrorKind::Envelope(err) => Some(err),
            QueueErrorKind::Stopped => None,
        }
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub received: u64,
    pub malformed: u64,
    pub acknowledged: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    received: AtomicU64,
    malformed: AtomicU64,
    acknowledged: AtomicU64,
}

impl Counters {
    pub(crate) fn submitted(&self, n: usize) {
        self.submitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
        }
    }
}
