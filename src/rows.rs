//! Row records for the high-volume kinds.
//!
//! Each row maps one-to-one onto a column-store table row. Rows travel inside
//! a [`RowMessage`](crate::RowMessage) with their fields inlined next to the
//! retry metadata, so no field here may be named `Type`, `Failures` or
//! `MaxRetries`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub project_id: u32,
    pub trace_id: String,
    pub span_id: String,
    pub secure_session_id: String,
    pub trace_flags: u32,
    pub severity_text: String,
    pub severity_number: i32,
    pub source: String,
    pub service_name: String,
    pub service_version: String,
    pub body: String,
    pub log_attributes: HashMap<String, String>,
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TraceRow {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub trace_state: String,
    pub span_name: String,
    pub span_kind: String,
    /// Span duration in nanoseconds.
    pub duration: i64,
    pub service_name: String,
    pub service_version: String,
    pub trace_attributes: HashMap<String, String>,
    pub status_code: String,
    pub status_message: String,
    pub environment: String,
    pub project_id: u32,
    pub secure_session_id: String,
    pub has_errors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionEventRow {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "ProjectID")]
    pub project_id: u32,
    #[serde(rename = "SessionID")]
    pub session_id: i64,
    /// Millisecond timestamps.
    pub session_created_at: i64,
    pub timestamp: i64,
    pub event: String,
    pub attributes: HashMap<String, String>,
}

/// Identity shared by every metric aggregate row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricIdentity {
    pub project_id: u32,
    pub service_name: String,
    pub metric_name: String,
    pub metric_description: String,
    pub metric_unit: String,
    pub attributes: HashMap<String, String>,
    pub start_timestamp: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricSumRow {
    #[serde(flatten)]
    pub metric: MetricIdentity,
    pub value: f64,
    pub aggregation_temporality: i32,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricHistogramRow {
    #[serde(flatten)]
    pub metric: MetricIdentity,
    pub count: u64,
    pub sum: f64,
    pub bucket_counts: Vec<u64>,
    pub explicit_bounds: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub aggregation_temporality: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricSummaryRow {
    #[serde(flatten)]
    pub metric: MetricIdentity,
    pub count: u64,
    pub sum: f64,
    pub value_at_quantiles: Vec<QuantileValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuantileValue {
    pub quantile: f64,
    pub value: f64,
}
