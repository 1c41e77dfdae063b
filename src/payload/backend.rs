//! Variant records produced by server-side SDKs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_empty;

/// A batch of backend errors, optionally tied to a recorded session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushBackendPayloadArgs {
    #[serde(rename = "ProjectVerboseID")]
    pub project_verbose_id: Option<String>,
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<BackendErrorObjectInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendErrorObjectInput {
    pub session_secure_id: Option<String>,
    pub request_id: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub log_cursor: Option<String>,
    pub event: String,
    pub r#type: String,
    pub url: String,
    pub source: String,
    #[serde(rename = "stackTrace")]
    pub stack_trace: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<String>,
    pub service: ServiceInput,
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub version: String,
}

/// Custom metrics pushed before OpenTelemetry metric rows existed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushMetricsArgs {
    #[serde(rename = "ProjectVerboseID")]
    pub project_verbose_id: Option<String>,
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metrics: Vec<MetricInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricInput {
    pub session_secure_id: String,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub trace_id: Option<String>,
    pub group: Option<String>,
    pub name: String,
    pub value: f64,
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<Option<MetricTag>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTag {
    pub name: String,
    pub value: String,
}
