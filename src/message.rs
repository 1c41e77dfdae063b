//! Retry/delivery contract shared by every envelope shape.
//!
//! Consumer code is written against [`RetryableMessage`] and the
//! [`QueueMessage`] union. It only matches on the concrete envelope once it
//! needs the payload.

use std::{any::Any, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    PayloadKind,
    envelope::{
        Envelope, LogRowMessage, MetricHistogramMessage, MetricSumMessage, MetricSummaryMessage,
        SessionEventRowMessage, TraceRowMessage,
    },
};

/// Retry ceiling given to newly constructed messages.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Capabilities every envelope exposes to the consumer pool.
pub trait RetryableMessage: Send + Sync {
    /// Kind of the carried payload.
    fn kind(&self) -> PayloadKind;

    /// Failed processing attempts so far.
    fn failures(&self) -> u32;

    /// Raise the failure counter. Values lower than the current count are ignored.
    fn set_failures(&mut self, value: u32);

    /// Failures allowed before the message is handed to the exhaustion policy.
    fn max_retries(&self) -> u32;

    /// Replace the retry ceiling. Zero exhausts the message on its first failure.
    fn set_max_retries(&mut self, value: u32);

    /// Position of this delivery in the transport, if it was received from one.
    fn transport_handle(&self) -> Option<&TransportHandle>;

    /// Attach the position of a new delivery. Reserved for transports.
    fn set_transport_handle(&mut self, handle: Option<TransportHandle>);

    /// Count one more failed attempt and return the new total.
    fn record_failure(&mut self) -> u32 {
        let failures = self.failures().saturating_add(1);
        self.set_failures(failures);
        failures
    }

    /// Whether the consumer policy should stop redelivering this message.
    fn retries_exhausted(&self) -> bool {
        self.failures() >= self.max_retries()
    }
}

/// Opaque acknowledgment token attached by a transport on delivery.
///
/// Application code stores, clones and forwards it. Only the transport that
/// created the handle can look inside it, through [`TransportHandle::downcast_ref`].
#[derive(Clone)]
pub struct TransportHandle(Arc<dyn Any + Send + Sync>);

impl TransportHandle {
    pub fn new<T>(position: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self(Arc::new(position))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportHandle(..)")
    }
}

/// Two handles are equal when they refer to the same delivery.
impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Retry bookkeeping embedded in every envelope.
///
/// Serialized inline as `Failures` and `MaxRetries`. The transport handle
/// never reaches the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryState {
    #[serde(default)]
    failures: u32,
    #[serde(default)]
    max_retries: u32,
    #[serde(skip)]
    handle: Option<TransportHandle>,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            failures: 0,
            max_retries,
            handle: None,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn set_failures(&mut self, value: u32) {
        if value < self.failures {
            tracing::warn!(
                current = self.failures,
                requested = value,
                "Ignoring attempt to lower the failure count"
            );
            return;
        }
        self.failures = value;
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn set_max_retries(&mut self, value: u32) {
        self.max_retries = value;
    }

    pub fn transport_handle(&self) -> Option<&TransportHandle> {
        self.handle.as_ref()
    }

    pub fn set_transport_handle(&mut self, handle: Option<TransportHandle>) {
        self.handle = handle;
    }
}

/// Implements the retry half of [`RetryableMessage`] for a type exposing
/// `retry()` and `retry_mut()`.
macro_rules! delegate_retry_state {
    () => {
        fn failures(&self) -> u32 {
            self.retry().failures()
        }

        fn set_failures(&mut self, value: u32) {
            self.retry_mut().set_failures(value)
        }

        fn max_retries(&self) -> u32 {
            self.retry().max_retries()
        }

        fn set_max_retries(&mut self, value: u32) {
            self.retry_mut().set_max_retries(value)
        }

        fn transport_handle(&self) -> Option<&$crate::message::TransportHandle> {
            self.retry().transport_handle()
        }

        fn set_transport_handle(&mut self, handle: Option<$crate::message::TransportHandle>) {
            self.retry_mut().set_transport_handle(handle)
        }
    };
}

pub(crate) use delegate_retry_state;

/// Any envelope that can travel through the queue.
///
/// Serializes as the wrapped envelope. Decoding goes through
/// [`codec::decode`](crate::codec::decode), which picks the variant from the
/// `Type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueueMessage {
    Envelope(Envelope),
    LogRow(LogRowMessage),
    TraceRow(TraceRowMessage),
    SessionEventRow(SessionEventRowMessage),
    MetricSum(MetricSumMessage),
    MetricHistogram(MetricHistogramMessage),
    MetricSummary(MetricSummaryMessage),
}

impl QueueMessage {
    pub fn health_check() -> Self {
        QueueMessage::Envelope(Envelope::health_check())
    }

    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            QueueMessage::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    fn retry(&self) -> &RetryState {
        match self {
            QueueMessage::Envelope(m) => m.retry(),
            QueueMessage::LogRow(m) => m.retry(),
            QueueMessage::TraceRow(m) => m.retry(),
            QueueMessage::SessionEventRow(m) => m.retry(),
            QueueMessage::MetricSum(m) => m.retry(),
            QueueMessage::MetricHistogram(m) => m.retry(),
            QueueMessage::MetricSummary(m) => m.retry(),
        }
    }

    fn retry_mut(&mut self) -> &mut RetryState {
        match self {
            QueueMessage::Envelope(m) => m.retry_mut(),
            QueueMessage::LogRow(m) => m.retry_mut(),
            QueueMessage::TraceRow(m) => m.retry_mut(),
            QueueMessage::SessionEventRow(m) => m.retry_mut(),
            QueueMessage::MetricSum(m) => m.retry_mut(),
            QueueMessage::MetricHistogram(m) => m.retry_mut(),
            QueueMessage::MetricSummary(m) => m.retry_mut(),
        }
    }
}

impl RetryableMessage for QueueMessage {
    fn kind(&self) -> PayloadKind {
        match self {
            QueueMessage::Envelope(m) => m.kind(),
            QueueMessage::LogRow(m) => m.kind(),
            QueueMessage::TraceRow(m) => m.kind(),
            QueueMessage::SessionEventRow(m) => m.kind(),
            QueueMessage::MetricSum(m) => m.kind(),
            QueueMessage::MetricHistogram(m) => m.kind(),
            QueueMessage::MetricSummary(m) => m.kind(),
        }
    }

    delegate_retry_state!();
}

impl From<Envelope> for QueueMessage {
    fn from(envelope: Envelope) -> Self {
        QueueMessage::Envelope(envelope)
    }
}

impl From<LogRowMessage> for QueueMessage {
    fn from(message: LogRowMessage) -> Self {
        QueueMessage::LogRow(message)
    }
}

impl From<TraceRowMessage> for QueueMessage {
    fn from(message: TraceRowMessage) -> Self {
        QueueMessage::TraceRow(message)
    }
}

impl From<SessionEventRowMessage> for QueueMessage {
    fn from(message: SessionEventRowMessage) -> Self {
        QueueMessage::SessionEventRow(message)
    }
}

impl From<MetricSumMessage> for QueueMessage {
    fn from(message: MetricSumMessage) -> Self {
        QueueMessage::MetricSum(message)
    }
}

impl From<MetricHistogramMessage> for QueueMessage {
    fn from(message: MetricHistogramMessage) -> Self {
        QueueMessage::MetricHistogram(message)
    }
}

impl From<MetricSummaryMessage> for QueueMessage {
    fn from(message: MetricSummaryMessage) -> Self {
        QueueMessage::MetricSummary(message)
    }
}
