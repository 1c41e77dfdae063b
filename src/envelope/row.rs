use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};

use crate::{
    PayloadKind,
    message::{DEFAULT_MAX_RETRIES, RetryState, RetryableMessage, delegate_retry_state},
    rows::{
        LogRow, MetricHistogramRow, MetricSumRow, MetricSummaryRow, SessionEventRow, TraceRow,
    },
};

/// A row type that travels in its own flattened envelope.
pub trait FlatRow: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind every envelope of this row reports.
    const KIND: PayloadKind;
}

impl FlatRow for LogRow {
    const KIND: PayloadKind = PayloadKind::PushLogsFlattened;
}

impl FlatRow for TraceRow {
    const KIND: PayloadKind = PayloadKind::PushTracesFlattened;
}

impl FlatRow for SessionEventRow {
    const KIND: PayloadKind = PayloadKind::PushSessionEvents;
}

impl FlatRow for MetricSumRow {
    const KIND: PayloadKind = PayloadKind::PushOTeLMetricSum;
}

impl FlatRow for MetricHistogramRow {
    const KIND: PayloadKind = PayloadKind::PushOTeLMetricHistogram;
}

impl FlatRow for MetricSummaryRow {
    const KIND: PayloadKind = PayloadKind::PushOTeLMetricSummary;
}

pub type LogRowMessage = RowMessage<LogRow>;
pub type TraceRowMessage = RowMessage<TraceRow>;
pub type SessionEventRowMessage = RowMessage<SessionEventRow>;
pub type MetricSumMessage = RowMessage<MetricSumRow>;
pub type MetricHistogramMessage = RowMessage<MetricHistogramRow>;
pub type MetricSummaryMessage = RowMessage<MetricSummaryRow>;

/// Flattened envelope embedding exactly one row.
///
/// The row's fields are serialized inline next to `Type`, `Failures` and
/// `MaxRetries`. [`RetryableMessage::kind`] always reports `R::KIND`, so a
/// row envelope can never carry the wrong variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMessage<R> {
    retry: RetryState,
    /// The embedded row.
    pub row: R,
}

impl<R: FlatRow> RowMessage<R> {
    pub fn new(row: R) -> Self {
        Self {
            retry: RetryState::new(DEFAULT_MAX_RETRIES),
            row,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.set_max_retries(max_retries);
        self
    }

    pub fn into_row(self) -> R {
        self.row
    }
}

impl<R> RowMessage<R> {
    pub(crate) fn retry(&self) -> &RetryState {
        &self.retry
    }

    pub(crate) fn retry_mut(&mut self) -> &mut RetryState {
        &mut self.retry
    }
}

impl<R: FlatRow> RetryableMessage for RowMessage<R> {
    fn kind(&self) -> PayloadKind {
        R::KIND
    }

    delegate_retry_state!();
}

#[derive(Serialize)]
struct RowRef<'a, R> {
    #[serde(rename = "Type")]
    kind: PayloadKind,
    #[serde(flatten)]
    retry: &'a RetryState,
    #[serde(flatten)]
    row: &'a R,
}

#[derive(Deserialize)]
struct RowWire<R> {
    #[serde(rename = "Type", default)]
    code: Option<i64>,
    #[serde(flatten)]
    retry: RetryState,
    #[serde(flatten)]
    row: R,
}

impl<R: FlatRow> Serialize for RowMessage<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RowRef {
            kind: R::KIND,
            retry: &self.retry,
            row: &self.row,
        }
        .serialize(serializer)
    }
}

impl<'de, R: FlatRow> Deserialize<'de> for RowMessage<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = RowWire::<R>::deserialize(deserializer)?;
        if let Some(code) = wire.code {
            if code != R::KIND.code() {
                return Err(serde::de::Error::custom(format!(
                    "expected Type {} ({}), got {code}",
                    R::KIND.code(),
                    R::KIND
                )));
            }
        }
        Ok(Self {
            retry: wire.retry,
            row: wire.row,
        })
    }
}
