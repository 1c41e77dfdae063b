//! Wire encoding for queue messages.
//!
//! Every message is a JSON document whose integer `Type` field selects the
//! envelope shape. [`decode`] reads that field first, then parses the
//! document as the matching generic or flattened envelope.

use serde::Deserialize;

use crate::{
    PayloadKind, QueueMessage, RetryableMessage,
    envelope::{Envelope, EnvelopeError, EnvelopeWire, Malformation},
};

/// Serialize a message for publication.
///
/// Refuses retired kinds: they stay decodable for backlog compatibility but
/// must not be produced anew.
pub fn encode(message: &QueueMessage) -> Result<Vec<u8>, EnvelopeError> {
    let kind = message.kind();
    if !kind.is_active() {
        return Err(EnvelopeError::deprecated(kind));
    }
    serde_json::to_vec(message).map_err(EnvelopeError::encode)
}

#[derive(Deserialize)]
struct KindProbe {
    #[serde(rename = "Type")]
    code: i64,
}

/// Parse a delivered document back into a message.
///
/// Every failure is reported as [`EnvelopeErrorKind::Malformed`](crate::EnvelopeErrorKind::Malformed).
/// Decoding the same bytes again would fail the same way, so callers should
/// drop the message rather than retry it.
pub fn decode(bytes: &[u8]) -> Result<QueueMessage, EnvelopeError> {
    if bytes.is_empty() {
        return Err(EnvelopeError::malformed(Malformation::Empty));
    }

    let probe: KindProbe = serde_json::from_slice(bytes).map_err(EnvelopeError::syntax)?;
    let kind = PayloadKind::from_code(probe.code)
        .ok_or_else(|| EnvelopeError::malformed(Malformation::UnknownKind(probe.code)))?;

    let message = match kind {
        PayloadKind::PushLogsFlattened => QueueMessage::LogRow(parse(bytes)?),
        PayloadKind::PushTracesFlattened => QueueMessage::TraceRow(parse(bytes)?),
        PayloadKind::PushSessionEvents => QueueMessage::SessionEventRow(parse(bytes)?),
        PayloadKind::PushOTeLMetricSum => QueueMessage::MetricSum(parse(bytes)?),
        PayloadKind::PushOTeLMetricHistogram => QueueMessage::MetricHistogram(parse(bytes)?),
        PayloadKind::PushOTeLMetricSummary => QueueMessage::MetricSummary(parse(bytes)?),
        _ => QueueMessage::Envelope(Envelope::try_from(parse::<EnvelopeWire>(bytes)?)?),
    };

    Ok(message)
}

fn parse<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(EnvelopeError::syntax)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::{
        EnvelopeErrorKind,
        envelope::{
            LogRowMessage, MetricHistogramMessage, MetricSumMessage, MetricSummaryMessage,
            SessionEventRowMessage, TraceRowMessage,
        },
        kind::KindShape,
        payload::*,
        rows::*,
    };

    /// One representative message for every kind producers may emit.
    fn active_messages() -> Vec<QueueMessage> {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        vec![
            Envelope::from_payload(PushPayloadArgs {
                session_secure_id: "s".into(),
                payload_id: Some(4),
                events: json!({"events": [{"type": 2}]}),
                messages: "[]".into(),
                resources: "[]".into(),
                errors: vec![ErrorObjectInput {
                    event: "TypeError".into(),
                    timestamp: at,
                    ..Default::default()
                }],
                is_beacon: Some(false),
                ..Default::default()
            })
            .into(),
            Envelope::from_payload(InitializeSessionArgs {
                session_secure_id: "s".into(),
                created_at: at,
                network_recording_domains: vec!["a.io".into(), "b.io".into()],
                ..Default::default()
            })
            .into(),
            Envelope::from_payload(IdentifySessionArgs {
                session_secure_id: "s".into(),
                user_identifier: "ada@example.com".into(),
                user_object: json!({"plan": "pro"}),
            })
            .into(),
            Envelope::from_payload(AddSessionPropertiesArgs {
                session_secure_id: "s".into(),
                properties_object: json!({"country": "NL"}),
            })
            .into(),
            Envelope::from_payload(PushBackendPayloadArgs {
                project_verbose_id: Some("p".into()),
                session_secure_id: None,
                errors: vec![BackendErrorObjectInput {
                    event: "panic".into(),
                    timestamp: at,
                    ..Default::default()
                }],
            })
            .into(),
            Envelope::from_payload(AddSessionFeedbackArgs {
                session_secure_id: "s".into(),
                user_name: Some("Ada".into()),
                user_email: None,
                verbatim: "love it".into(),
                timestamp: at,
            })
            .into(),
            Envelope::from_payload(PushTracesArgs {
                trace_row: TraceRow {
                    span_name: "GET /".into(),
                    duration: 1_500,
                    ..Default::default()
                },
            })
            .into(),
            Envelope::from_payload(SessionDataSyncArgs { session_id: 1 }).into(),
            Envelope::from_payload(ErrorGroupDataSyncArgs { error_group_id: 2 }).into(),
            Envelope::from_payload(ErrorObjectDataSyncArgs { error_object_id: 3 }).into(),
            Envelope::from_payload(PushCompressedPayloadArgs {
                session_secure_id: "s".into(),
                payload_id: 9,
                data: "H4sI".into(),
            })
            .into(),
            LogRowMessage::new(LogRow {
                body: "hello".into(),
                timestamp: at,
                ..Default::default()
            })
            .into(),
            TraceRowMessage::new(TraceRow {
                has_errors: true,
                ..Default::default()
            })
            .into(),
            SessionEventRowMessage::new(SessionEventRow {
                event: "click".into(),
                session_id: 77,
                ..Default::default()
            })
            .into(),
            MetricSumMessage::new(MetricSumRow {
                value: 3.5,
                is_monotonic: true,
                ..Default::default()
            })
            .into(),
            MetricHistogramMessage::new(MetricHistogramRow {
                count: 3,
                bucket_counts: vec![1, 2],
                explicit_bounds: vec![10.0],
                ..Default::default()
            })
            .into(),
            MetricSummaryMessage::new(MetricSummaryRow {
                count: 1,
                sum: 0.25,
                ..Default::default()
            })
            .into(),
            QueueMessage::health_check(),
        ]
    }

    #[test]
    fn every_active_kind_round_trips() {
        let messages = active_messages();

        let active_kinds = PayloadKind::ALL.iter().filter(|k| k.is_active()).count();
        assert_eq!(messages.len(), active_kinds);

        for mut message in messages {
            message.set_failures(2);
            message.set_max_retries(7);

            let decoded = decode(&encode(&message).unwrap()).unwrap();
            assert_eq!(decoded.kind(), message.kind());
            assert_eq!(decoded.failures(), 2);
            assert_eq!(decoded.max_retries(), 7);
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn encoder_refuses_retired_kinds() {
        let message: QueueMessage = Envelope::from_payload(PushMetricsArgs::default()).into();
        let err = encode(&message).unwrap_err();
        assert!(matches!(
            err.kind(),
            EnvelopeErrorKind::DeprecatedKind(PayloadKind::PushMetrics)
        ));
    }

    #[test]
    fn retired_kinds_are_still_decoded() {
        let bytes = serde_json::to_vec(&json!({
            "Type": 9,
            "Failures": 1,
            "MaxRetries": 5,
            "PushLogs": {"LogRow": serde_json::to_value(LogRow::default()).unwrap()},
        }))
        .unwrap();

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.kind(), PayloadKind::PushLogs);
        assert_eq!(decoded.failures(), 1);
    }

    #[test]
    fn decodes_documents_in_the_existing_producer_shape() {
        let track = decode(
            br#"{"Type":3,"Failures":0,"MaxRetries":5,"PushPayload":null,
                "AddTrackProperties":{"SessionSecureID":"abc","PropertiesObject":{"plan":"pro"}}}"#,
        )
        .unwrap();
        match track {
            QueueMessage::Envelope(envelope) => assert_eq!(
                envelope.payload(),
                Some(&Payload::AddTrackProperties(AddTrackPropertiesArgs {
                    session_secure_id: "abc".into(),
                    properties_object: json!({"plan": "pro"}),
                }))
            ),
            other => panic!("unexpected message {other:?}"),
        }

        let backend = decode(
            br#"{"Type":5,"Failures":1,"MaxRetries":5,"PushBackendPayload":
                {"ProjectVerboseID":"1jdkoe52","SessionSecureID":null,"Errors":null}}"#,
        )
        .unwrap();
        assert_eq!(backend.kind(), PayloadKind::PushBackendPayload);
        assert_eq!(backend.failures(), 1);

        let compressed = decode(
            br#"{"Type":19,"Failures":0,"MaxRetries":5,"PushCompressedPayload":
                {"SessionSecureID":"s","PayloadID":7,"data":"H4sI"}}"#,
        )
        .unwrap();
        match compressed {
            QueueMessage::Envelope(envelope) => assert_eq!(
                envelope.payload(),
                Some(&Payload::PushCompressedPayload(PushCompressedPayloadArgs {
                    session_secure_id: "s".into(),
                    payload_id: 7,
                    data: "H4sI".into(),
                }))
            ),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn decodes_push_payload_with_lowercase_keys() {
        let decoded = decode(
            br#"{"Type":0,"Failures":0,"MaxRetries":5,"PushPayload":{
                "SessionSecureID":"s","PayloadID":null,
                "events":{"events":[]},"messages":"[]","resources":"[]",
                "web_socket_events":null,
                "errors":[{"event":"TypeError","type":"console.error","url":"/",
                    "source":"app.js","lineNumber":3,"columnNumber":14,
                    "stackTrace":[{"functionName":"render","lineNumber":3},null],
                    "timestamp":"2024-01-02T03:04:05Z","payload":null}],
                "is_beacon":false,"has_session_unloaded":null,"highlight_logs":null}}"#,
        )
        .unwrap();

        let QueueMessage::Envelope(envelope) = decoded else {
            panic!("expected a generic envelope");
        };
        let Some(Payload::PushPayload(args)) = envelope.payload() else {
            panic!("expected a push payload");
        };
        assert_eq!(args.is_beacon, Some(false));
        assert_eq!(args.errors[0].line_number, 3);
        assert_eq!(
            args.errors[0].stack_trace[0]
                .as_ref()
                .and_then(|frame| frame.function_name.as_deref()),
            Some("render")
        );
    }

    #[test]
    fn decodes_initialize_session_with_nil_domains() {
        let decoded = decode(
            br#"{"Type":1,"Failures":0,"MaxRetries":5,"InitializeSession":{
                "SessionSecureID":"s","CreatedAt":"2024-03-01T12:00:00Z",
                "ProjectVerboseID":"1jdkoe52","EnableStrictPrivacy":false,"PrivacySetting":null,
                "EnableRecordingNetworkContents":true,"ClientVersion":"9.1.0",
                "FirstloadVersion":"9.1.0","ClientConfig":"{}","Environment":"production",
                "AppVersion":null,"Fingerprint":"f","UserAgent":"Mozilla/5.0",
                "AcceptLanguage":"en-US","IP":"127.0.0.1","ClientID":"client-1",
                "NetworkRecordingDomains":null,"DisableSessionRecording":null,
                "ServiceName":"web"}}"#,
        )
        .unwrap();

        let QueueMessage::Envelope(envelope) = decoded else {
            panic!("expected a generic envelope");
        };
        let Some(Payload::InitializeSession(args)) = envelope.payload() else {
            panic!("expected an initialize session payload");
        };
        assert_eq!(args.ip, "127.0.0.1");
        assert_eq!(args.client_id, "client-1");
        assert!(args.network_recording_domains.is_empty());
    }

    #[test]
    fn flattened_kinds_decode_to_row_messages() {
        for message in active_messages() {
            let decoded = decode(&encode(&message).unwrap()).unwrap();
            let is_row = !matches!(decoded, QueueMessage::Envelope(_));
            assert_eq!(is_row, decoded.kind().shape() == KindShape::Flattened);
        }
    }

    #[test]
    fn garbage_is_malformed() {
        for bytes in [
            &b""[..],
            &b"not json"[..],
            &b"{}"[..],
            &br#"{"Type": "one"}"#[..],
            &br#"{"Type": 99}"#[..],
            &br#"{"Type": 1}"#[..],
        ] {
            let err = decode(bytes).unwrap_err();
            assert!(err.is_malformed(), "{err}");
        }
    }
}
