//! Generic envelope carrying retry metadata and one payload variant.
//!
//! On the wire an [`Envelope`] is a sparse JSON document:
//!
//! ```json
//! {"Type": 1, "Failures": 0, "MaxRetries": 5, "InitializeSession": {...}}
//! ```
//!
//! Only the populated variant appears, keyed by its kind name, so documents
//! of different kinds have very different sizes. In memory the variant is a
//! [`Payload`] and cannot disagree with the declared kind. The sparse wire
//! document can, so decoding re-checks the "exactly one variant" rule and
//! fails with [`EnvelopeErrorKind::Malformed`].
//!
//! High-volume kinds skip the union entirely and use a [`RowMessage`].

mod row;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use tracing_error::SpanTrace;

use crate::{
    PayloadKind,
    message::{DEFAULT_MAX_RETRIES, RetryState, RetryableMessage, delegate_retry_state},
    payload::{
        AddSessionFeedbackArgs, AddSessionPropertiesArgs, AddTrackPropertiesArgs,
        ErrorGroupDataSyncArgs, ErrorObjectDataSyncArgs, IdentifySessionArgs,
        InitializeSessionArgs, Payload, PushBackendPayloadArgs, PushCompressedPayloadArgs,
        PushLogsArgs, PushMetricsArgs, PushPayloadArgs, PushTracesArgs, SessionDataSyncArgs,
    },
};

pub use row::{
    FlatRow, LogRowMessage, MetricHistogramMessage, MetricSumMessage, MetricSummaryMessage,
    RowMessage, SessionEventRowMessage, TraceRowMessage,
};

/// Envelope for every kind that is not flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: PayloadKind,
    retry: RetryState,
    payload: Option<Payload>,
}

impl Envelope {
    /// Wrap `payload` as a message of `kind`.
    ///
    /// Fails with [`EnvelopeErrorKind::ShapeMismatch`] when the record
    /// belongs to a different kind.
    pub fn new(kind: PayloadKind, payload: impl Into<Payload>) -> Result<Self, EnvelopeError> {
        let payload = payload.into();
        if payload.kind() != kind {
            return Err(EnvelopeError::shape_mismatch(kind, payload.kind()));
        }
        Ok(Self::from_payload(payload))
    }

    /// Wrap `payload` under the kind it belongs to.
    pub fn from_payload(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            kind: payload.kind(),
            retry: RetryState::new(DEFAULT_MAX_RETRIES),
            payload: Some(payload),
        }
    }

    /// A liveness probe with no content.
    pub fn health_check() -> Self {
        Self {
            kind: PayloadKind::HealthCheck,
            retry: RetryState::new(0),
            payload: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.set_max_retries(max_retries);
        self
    }

    /// The populated variant. `None` only for kinds without content.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    pub(crate) fn retry(&self) -> &RetryState {
        &self.retry
    }

    pub(crate) fn retry_mut(&mut self) -> &mut RetryState {
        &mut self.retry
    }
}

impl From<Payload> for Envelope {
    fn from(payload: Payload) -> Self {
        Self::from_payload(payload)
    }
}

impl RetryableMessage for Envelope {
    fn kind(&self) -> PayloadKind {
        self.kind
    }

    delegate_retry_state!();
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(rename = "Type")]
    kind: PayloadKind,
    #[serde(flatten)]
    retry: &'a RetryState,
    #[serde(flatten)]
    payload: Option<&'a Payload>,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EnvelopeRef {
            kind: self.kind,
            retry: &self.retry,
            payload: self.payload.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = EnvelopeWire::deserialize(deserializer)?;
        Envelope::try_from(wire).map_err(D::Error::custom)
    }
}

/// Wire form of [`Envelope`] with one optional field per variant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct EnvelopeWire {
    #[serde(rename = "Type")]
    code: i64,
    #[serde(default)]
    failures: u32,
    #[serde(default)]
    max_retries: u32,
    push_payload: Option<PushPayloadArgs>,
    initialize_session: Option<InitializeSessionArgs>,
    identify_session: Option<IdentifySessionArgs>,
    add_track_properties: Option<AddTrackPropertiesArgs>,
    add_session_properties: Option<AddSessionPropertiesArgs>,
    push_backend_payload: Option<PushBackendPayloadArgs>,
    push_metrics: Option<PushMetricsArgs>,
    add_session_feedback: Option<AddSessionFeedbackArgs>,
    push_logs: Option<PushLogsArgs>,
    push_traces: Option<PushTracesArgs>,
    session_data_sync: Option<SessionDataSyncArgs>,
    error_group_data_sync: Option<ErrorGroupDataSyncArgs>,
    error_object_data_sync: Option<ErrorObjectDataSyncArgs>,
    push_compressed_payload: Option<PushCompressedPayloadArgs>,
}

impl EnvelopeWire {
    fn into_populated(self) -> Vec<Payload> {
        [
            self.push_payload.map(Payload::from),
            self.initialize_session.map(Payload::from),
            self.identify_session.map(Payload::from),
            self.add_track_properties.map(Payload::from),
            self.add_session_properties.map(Payload::from),
            self.push_backend_payload.map(Payload::from),
            self.push_metrics.map(Payload::from),
            self.add_session_feedback.map(Payload::from),
            self.push_logs.map(Payload::from),
            self.push_traces.map(Payload::from),
            self.session_data_sync.map(Payload::from),
            self.error_group_data_sync.map(Payload::from),
            self.error_object_data_sync.map(Payload::from),
            self.push_compressed_payload.map(Payload::from),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl TryFrom<EnvelopeWire> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: EnvelopeWire) -> Result<Self, Self::Error> {
        let kind = PayloadKind::from_code(wire.code)
            .ok_or_else(|| EnvelopeError::malformed(Malformation::UnknownKind(wire.code)))?;

        let mut retry = RetryState::new(wire.max_retries);
        retry.set_failures(wire.failures);

        let mut populated = wire.into_populated();
        let payload = match populated.len() {
            0 if kind.carries_payload() => {
                return Err(EnvelopeError::malformed(Malformation::MissingVariant(kind)));
            }
            0 => None,
            1 => {
                let payload = populated.remove(0);
                if payload.kind() != kind {
                    return Err(EnvelopeError::malformed(Malformation::VariantMismatch {
                        declared: kind,
                        populated: payload.kind(),
                    }));
                }
                Some(payload)
            }
            _ => {
                return Err(EnvelopeError::malformed(Malformation::MultipleVariants(
                    populated.iter().map(Payload::kind).collect(),
                )));
            }
        };

        Ok(Self {
            kind,
            retry,
            payload,
        })
    }
}

/// Error returned when building, encoding or decoding an envelope.
///
/// Each error captures:
/// - The underlying error kind
/// - A tracing span backtrace for improved diagnostics
#[derive(Debug)]
pub struct EnvelopeError {
    context: SpanTrace,
    kind: EnvelopeErrorKind,
}

/// Envelope error kinds.
#[derive(Debug)]
pub enum EnvelopeErrorKind {
    /// A variant record was wrapped under a kind it does not belong to.
    ShapeMismatch {
        declared: PayloadKind,
        actual: PayloadKind,
    },
    /// An inbound document breaks an envelope invariant. Never worth retrying.
    Malformed(Malformation),
    /// Producers may no longer emit this kind.
    DeprecatedKind(PayloadKind),
    /// Serialization of an outbound message failed.
    Encode(serde_json::Error),
}

/// Why an inbound document could not be decoded.
#[derive(Debug)]
pub enum Malformation {
    /// Not a JSON envelope at all.
    Syntax(serde_json::Error),
    /// The transport delivered no bytes.
    Empty,
    UnknownKind(i64),
    MissingVariant(PayloadKind),
    MultipleVariants(Vec<PayloadKind>),
    VariantMismatch {
        declared: PayloadKind,
        populated: PayloadKind,
    },
}

impl EnvelopeError {
    pub(crate) fn shape_mismatch(declared: PayloadKind, actual: PayloadKind) -> Self {
        Self::new(EnvelopeErrorKind::ShapeMismatch { declared, actual })
    }

    pub(crate) fn malformed(reason: Malformation) -> Self {
        Self::new(EnvelopeErrorKind::Malformed(reason))
    }

    pub(crate) fn syntax(err: serde_json::Error) -> Self {
        Self::malformed(Malformation::Syntax(err))
    }

    pub(crate) fn deprecated(kind: PayloadKind) -> Self {
        Self::new(EnvelopeErrorKind::DeprecatedKind(kind))
    }

    pub(crate) fn encode(err: serde_json::Error) -> Self {
        Self::new(EnvelopeErrorKind::Encode(err))
    }

    fn new(kind: EnvelopeErrorKind) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind,
        }
    }

    pub fn kind(&self) -> &EnvelopeErrorKind {
        &self.kind
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, EnvelopeErrorKind::Malformed(_))
    }
}

impl std::fmt::Display for Malformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Malformation::Syntax(err) => write!(f, "invalid document: {err}"),
            Malformation::Empty => write!(f, "empty message"),
            Malformation::UnknownKind(code) => write!(f, "unknown payload kind {code}"),
            Malformation::MissingVariant(kind) => write!(f, "no variant populated for {kind}"),
            Malformation::MultipleVariants(kinds) => {
                write!(f, "multiple variants populated: {kinds:?}")
            }
            Malformation::VariantMismatch {
                declared,
                populated,
            } => write!(f, "declared {declared} but {populated} is populated"),
        }
    }
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            EnvelopeErrorKind::ShapeMismatch { declared, actual } => {
                writeln!(f, "Shape mismatch: {actual} record wrapped as {declared}")
            }
            EnvelopeErrorKind::Malformed(reason) => writeln!(f, "Malformed envelope: {reason}"),
            EnvelopeErrorKind::DeprecatedKind(kind) => {
                writeln!(f, "Deprecated kind: {kind} can no longer be emitted")
            }
            EnvelopeErrorKind::Encode(err) => writeln!(f, "Encode error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            EnvelopeErrorKind::Malformed(Malformation::Syntax(err)) => Some(err),
            EnvelopeErrorKind::Encode(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::payload::{BackendErrorObjectInput, ServiceInput};

    fn initialize_session_args() -> InitializeSessionArgs {
        InitializeSessionArgs {
            session_secure_id: "s3cure".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            project_verbose_id: "1jdkoe52".into(),
            enable_strict_privacy: true,
            privacy_setting: Some("strict".into()),
            enable_recording_network_contents: false,
            client_version: "9.1.0".into(),
            firstload_version: "9.1.0".into(),
            client_config: "{}".into(),
            environment: "production".into(),
            app_version: None,
            fingerprint: "abc".into(),
            user_agent: "Mozilla/5.0".into(),
            accept_language: "en-US".into(),
            ip: "127.0.0.1".into(),
            client_id: "client-1".into(),
            network_recording_domains: vec!["api.example.com".into()],
            disable_session_recording: Some(false),
            service_name: "web".into(),
        }
    }

    #[test]
    fn construct_rejects_mismatched_record() {
        let err = Envelope::new(PayloadKind::IdentifySession, initialize_session_args())
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            EnvelopeErrorKind::ShapeMismatch {
                declared: PayloadKind::IdentifySession,
                actual: PayloadKind::InitializeSession,
            }
        ));

        let err = Envelope::new(PayloadKind::PushLogsFlattened, PushLogsArgs::default())
            .unwrap_err();
        assert!(matches!(err.kind(), EnvelopeErrorKind::ShapeMismatch { .. }));
    }

    #[test]
    fn initialize_session_round_trips_field_for_field() {
        let args = initialize_session_args();
        let mut envelope = Envelope::new(PayloadKind::InitializeSession, args.clone()).unwrap();
        envelope.set_failures(1);

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.kind(), PayloadKind::InitializeSession);
        assert_eq!(decoded.failures(), 1);
        assert_eq!(decoded.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(decoded.payload(), Some(&Payload::InitializeSession(args)));
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn encoding_omits_unpopulated_variants() {
        let envelope = Envelope::from_payload(SessionDataSyncArgs { session_id: 12 });
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "Type": 16,
                "Failures": 0,
                "MaxRetries": 5,
                "SessionDataSync": {"SessionID": 12},
            })
        );

        let small = serde_json::to_vec(&envelope).unwrap();
        let large = serde_json::to_vec(&Envelope::from_payload(PushBackendPayloadArgs {
            project_verbose_id: Some("1jdkoe52".into()),
            session_secure_id: None,
            errors: vec![BackendErrorObjectInput {
                event: "boom".into(),
                stack_trace: "at main.rs:1".into(),
                service: ServiceInput {
                    name: "api".into(),
                    version: "1.0.0".into(),
                },
                ..Default::default()
            }],
        }))
        .unwrap();
        assert!(large.len() > small.len() * 2);
    }

    #[test]
    fn health_check_has_no_variant() {
        let value = serde_json::to_value(Envelope::health_check()).unwrap();
        assert_eq!(
            value,
            json!({"Type": i64::MAX, "Failures": 0, "MaxRetries": 0})
        );

        let decoded: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.kind(), PayloadKind::HealthCheck);
        assert!(decoded.payload().is_none());
    }

    fn decode(value: serde_json::Value) -> Result<Envelope, EnvelopeError> {
        let wire: EnvelopeWire = serde_json::from_value(value).unwrap();
        Envelope::try_from(wire)
    }

    #[test]
    fn decode_rejects_multiple_variants() {
        let err = decode(json!({
            "Type": 16,
            "SessionDataSync": {"SessionID": 1},
            "ErrorGroupDataSync": {"ErrorGroupID": 2},
        }))
        .unwrap_err();

        match err.kind() {
            EnvelopeErrorKind::Malformed(Malformation::MultipleVariants(kinds)) => assert_eq!(
                kinds,
                &vec![PayloadKind::SessionDataSync, PayloadKind::ErrorGroupDataSync]
            ),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_variant() {
        let err = decode(json!({"Type": 1, "Failures": 0, "MaxRetries": 5})).unwrap_err();
        assert!(matches!(
            err.kind(),
            EnvelopeErrorKind::Malformed(Malformation::MissingVariant(
                PayloadKind::InitializeSession
            ))
        ));
    }

    #[test]
    fn decode_rejects_variant_disagreeing_with_type() {
        let err = decode(json!({"Type": 17, "SessionDataSync": {"SessionID": 1}})).unwrap_err();
        assert!(matches!(
            err.kind(),
            EnvelopeErrorKind::Malformed(Malformation::VariantMismatch {
                declared: PayloadKind::ErrorGroupDataSync,
                populated: PayloadKind::SessionDataSync,
            })
        ));

        let err = decode(json!({"Type": i64::MAX, "SessionDataSync": {"SessionID": 1}}))
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = decode(json!({"Type": 4242})).unwrap_err();
        assert!(matches!(
            err.kind(),
            EnvelopeErrorKind::Malformed(Malformation::UnknownKind(4242))
        ));
    }

    #[test]
    fn retired_kinds_remain_decodable() {
        let envelope = decode(json!({
            "Type": 3,
            "Failures": 2,
            "MaxRetries": 5,
            "AddTrackProperties": {"SessionSecureID": "abc", "PropertiesObject": {"plan": "pro"}},
        }))
        .unwrap();
        assert_eq!(envelope.kind(), PayloadKind::AddTrackProperties);
        assert_eq!(envelope.failures(), 2);

        let noop = decode(json!({"Type": 11, "Failures": 0, "MaxRetries": 5})).unwrap();
        assert_eq!(noop.kind(), PayloadKind::HubSpotCreateContactForAdmin);
        assert!(noop.payload().is_none());
    }

    #[test]
    fn null_variants_count_as_absent() {
        let envelope = decode(json!({
            "Type": 18,
            "PushPayload": null,
            "ErrorObjectDataSync": {"ErrorObjectID": 99},
        }))
        .unwrap();
        assert_eq!(
            envelope.payload(),
            Some(&Payload::ErrorObjectDataSync(ErrorObjectDataSyncArgs {
                error_object_id: 99
            }))
        );
    }
}
