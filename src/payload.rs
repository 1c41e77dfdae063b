//! Variant records carried by the generic [`Envelope`](crate::Envelope).
//!
//! A variant record is immutable payload data for exactly one
//! [`PayloadKind`]. It carries no retry state. [`Payload`] is the closed union
//! of every record that travels through the generic envelope. The
//! high-volume kinds use [`crate::rows`] instead.

pub mod backend;
pub mod session;
pub mod sync;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    PayloadKind,
    rows::{LogRow, TraceRow},
};

pub use backend::{
    BackendErrorObjectInput, MetricInput, MetricTag, PushBackendPayloadArgs, PushMetricsArgs,
    ServiceInput,
};
pub use session::{
    AddSessionFeedbackArgs, AddSessionPropertiesArgs, AddTrackPropertiesArgs, ErrorObjectInput,
    IdentifySessionArgs, InitializeSessionArgs, PushCompressedPayloadArgs, PushPayloadArgs,
    StackFrameInput,
};
pub use sync::{ErrorGroupDataSyncArgs, ErrorObjectDataSyncArgs, SessionDataSyncArgs};

/// Producers encode empty slices as `null`; read those back as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single log row pushed through the generic envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushLogsArgs {
    pub log_row: LogRow,
}

/// A single trace row pushed through the generic envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushTracesArgs {
    pub trace_row: TraceRow,
}

/// The populated variant of a generic envelope.
///
/// Serialized externally tagged, so a payload renders as a single
/// `{"<KindName>": {...}}` entry. The variant name doubles as the sparse wire
/// field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Payload {
    PushPayload(PushPayloadArgs),
    InitializeSession(InitializeSessionArgs),
    IdentifySession(IdentifySessionArgs),
    AddTrackProperties(AddTrackPropertiesArgs),
    AddSessionProperties(AddSessionPropertiesArgs),
    PushBackendPayload(PushBackendPayloadArgs),
    PushMetrics(PushMetricsArgs),
    AddSessionFeedback(AddSessionFeedbackArgs),
    PushLogs(PushLogsArgs),
    PushTraces(PushTracesArgs),
    SessionDataSync(SessionDataSyncArgs),
    ErrorGroupDataSync(ErrorGroupDataSyncArgs),
    ErrorObjectDataSync(ErrorObjectDataSyncArgs),
    PushCompressedPayload(PushCompressedPayloadArgs),
}

impl Payload {
    /// The kind this record belongs to.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::PushPayload(_) => PayloadKind::PushPayload,
            Payload::InitializeSession(_) => PayloadKind::InitializeSession,
            Payload::IdentifySession(_) => PayloadKind::IdentifySession,
            Payload::AddTrackProperties(_) => PayloadKind::AddTrackProperties,
            Payload::AddSessionProperties(_) => PayloadKind::AddSessionProperties,
            Payload::PushBackendPayload(_) => PayloadKind::PushBackendPayload,
            Payload::PushMetrics(_) => PayloadKind::PushMetrics,
            Payload::AddSessionFeedback(_) => PayloadKind::AddSessionFeedback,
            Payload::PushLogs(_) => PayloadKind::PushLogs,
            Payload::PushTraces(_) => PayloadKind::PushTraces,
            Payload::SessionDataSync(_) => PayloadKind::SessionDataSync,
            Payload::ErrorGroupDataSync(_) => PayloadKind::ErrorGroupDataSync,
            Payload::ErrorObjectDataSync(_) => PayloadKind::ErrorObjectDataSync,
            Payload::PushCompressedPayload(_) => PayloadKind::PushCompressedPayload,
        }
    }
}

macro_rules! impl_from_args {
    ($($args:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$args> for Payload {
                fn from(args: $args) -> Self {
                    Payload::$variant(args)
                }
            }
        )*
    };
}

impl_from_args! {
    PushPayloadArgs => PushPayload,
    InitializeSessionArgs => InitializeSession,
    IdentifySessionArgs => IdentifySession,
    AddTrackPropertiesArgs => AddTrackProperties,
    AddSessionPropertiesArgs => AddSessionProperties,
    PushBackendPayloadArgs => PushBackendPayload,
    PushMetricsArgs => PushMetrics,
    AddSessionFeedbackArgs => AddSessionFeedback,
    PushLogsArgs => PushLogs,
    PushTracesArgs => PushTraces,
    SessionDataSyncArgs => SessionDataSync,
    ErrorGroupDataSyncArgs => ErrorGroupDataSync,
    ErrorObjectDataSyncArgs => ErrorObjectDataSync,
    PushCompressedPayloadArgs => PushCompressedPayload,
}
