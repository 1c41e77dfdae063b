//! Variant records produced by the browser SDK for recorded sessions.
//!
//! Field names follow what existing producers already wrote to the log:
//! `...ID` suffixes, a handful of lowercase keys on [`PushPayloadArgs`], and
//! camelCase GraphQL input objects nested inside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_empty;

/// A batch of replay events, console messages and network resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushPayloadArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    #[serde(rename = "PayloadID")]
    pub payload_id: Option<i64>,
    /// Replay events, passed through unvalidated.
    #[serde(rename = "events")]
    pub events: serde_json::Value,
    #[serde(rename = "messages")]
    pub messages: String,
    #[serde(rename = "resources")]
    pub resources: String,
    #[serde(rename = "web_socket_events")]
    pub web_socket_events: Option<String>,
    #[serde(rename = "errors", default, deserialize_with = "null_as_empty")]
    pub errors: Vec<ErrorObjectInput>,
    #[serde(rename = "is_beacon")]
    pub is_beacon: Option<bool>,
    #[serde(rename = "has_session_unloaded")]
    pub has_session_unloaded: Option<bool>,
    #[serde(rename = "highlight_logs")]
    pub highlight_logs: Option<String>,
}

/// Pre-compressed variant of [`PushPayloadArgs`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushCompressedPayloadArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    #[serde(rename = "PayloadID")]
    pub payload_id: i64,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitializeSessionArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "ProjectVerboseID")]
    pub project_verbose_id: String,
    pub enable_strict_privacy: bool,
    pub privacy_setting: Option<String>,
    pub enable_recording_network_contents: bool,
    pub client_version: String,
    pub firstload_version: String,
    pub client_config: String,
    pub environment: String,
    pub app_version: Option<String>,
    pub fingerprint: String,
    pub user_agent: String,
    pub accept_language: String,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub network_recording_domains: Vec<String>,
    pub disable_session_recording: Option<bool>,
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentifySessionArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    pub user_identifier: String,
    pub user_object: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddTrackPropertiesArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    pub properties_object: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddSessionPropertiesArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    pub properties_object: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddSessionFeedbackArgs {
    #[serde(rename = "SessionSecureID")]
    pub session_secure_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub verbatim: String,
    pub timestamp: DateTime<Utc>,
}

/// Frontend error captured during a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorObjectInput {
    pub event: String,
    pub r#type: String,
    pub url: String,
    pub source: String,
    pub line_number: i64,
    pub column_number: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stack_trace: Vec<Option<StackFrameInput>>,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameInput {
    pub function_name: Option<String>,
    pub args: Option<Vec<serde_json::Value>>,
    pub file_name: Option<String>,
    pub line_number: Option<i64>,
    pub column_number: Option<i64>,
    pub is_eval: Option<bool>,
    pub is_native: Option<bool>,
    pub source: Option<String>,
}
