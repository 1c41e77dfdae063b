//! Payload kind registry.
//!
//! Every message on the queue is tagged with a [`PayloadKind`] whose integer
//! code is the discriminator consumers switch on. Codes are transmitted on the
//! wire and persisted in partition backlogs, so they follow two rules:
//!
//! - Codes are append-only. A new kind takes the next free code and existing
//!   codes are never renumbered.
//! - Retired kinds keep their code forever. They stay decodable so that
//!   backlog messages can still be read, but encoders refuse to emit them
//!   (see [`PayloadKind::is_active`]).
//!
//! [`PayloadKind::HealthCheck`] sits at `i64::MAX`, well clear of the dense
//! range used by real kinds.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Semantic type of a queued message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[serde(into = "i64", try_from = "i64")]
#[repr(i64)]
pub enum PayloadKind {
    PushPayload = 0,
    InitializeSession = 1,
    IdentifySession = 2,
    /// Retired: track events are folded into [`PayloadKind::PushPayload`].
    AddTrackProperties = 3,
    AddSessionProperties = 4,
    PushBackendPayload = 5,
    /// Retired: superseded by the OpenTelemetry metric rows.
    PushMetrics = 6,
    /// Retired: setup state is derived from other payloads.
    MarkBackendSetup = 7,
    AddSessionFeedback = 8,
    /// Retired: use [`PayloadKind::PushLogsFlattened`].
    PushLogs = 9,
    PushTraces = 10,
    /// Retired CRM sync, no-op.
    HubSpotCreateContactForAdmin = 11,
    /// Retired CRM sync, no-op.
    HubSpotCreateCompanyForWorkspace = 12,
    /// Retired CRM sync, no-op.
    HubSpotUpdateContactProperty = 13,
    /// Retired CRM sync, no-op.
    HubSpotUpdateCompanyProperty = 14,
    /// Retired CRM sync, no-op.
    HubSpotCreateContactCompanyAssociation = 15,
    SessionDataSync = 16,
    ErrorGroupDataSync = 17,
    ErrorObjectDataSync = 18,
    PushCompressedPayload = 19,
    PushLogsFlattened = 20,
    PushTracesFlattened = 21,
    PushSessionEvents = 22,
    PushOTeLMetricSum = 23,
    PushOTeLMetricHistogram = 24,
    PushOTeLMetricSummary = 25,
    /// Liveness probe. Never written to a partition.
    HealthCheck = 9_223_372_036_854_775_807,
}

/// How a kind's content travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindShape {
    /// Carried as one populated variant field of the generic [`Envelope`](crate::Envelope).
    Variant,
    /// Carried by a dedicated [`RowMessage`](crate::RowMessage) with the row inlined.
    Flattened,
    /// No content at all.
    Empty,
}

/// Registry entry for a [`PayloadKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub name: &'static str,
    pub active: bool,
    pub shape: KindShape,
}

impl KindInfo {
    const fn new(name: &'static str, active: bool, shape: KindShape) -> Self {
        Self {
            name,
            active,
            shape,
        }
    }
}

impl PayloadKind {
    /// Every registered kind, in code order.
    pub const ALL: [PayloadKind; 27] = [
        PayloadKind::PushPayload,
        PayloadKind::InitializeSession,
        PayloadKind::IdentifySession,
        PayloadKind::AddTrackProperties,
        PayloadKind::AddSessionProperties,
        PayloadKind::PushBackendPayload,
        PayloadKind::PushMetrics,
        PayloadKind::MarkBackendSetup,
        PayloadKind::AddSessionFeedback,
        PayloadKind::PushLogs,
        PayloadKind::PushTraces,
        PayloadKind::HubSpotCreateContactForAdmin,
        PayloadKind::HubSpotCreateCompanyForWorkspace,
        PayloadKind::HubSpotUpdateContactProperty,
        PayloadKind::HubSpotUpdateCompanyProperty,
        PayloadKind::HubSpotCreateContactCompanyAssociation,
        PayloadKind::SessionDataSync,
        PayloadKind::ErrorGroupDataSync,
        PayloadKind::ErrorObjectDataSync,
        PayloadKind::PushCompressedPayload,
        PayloadKind::PushLogsFlattened,
        PayloadKind::PushTracesFlattened,
        PayloadKind::PushSessionEvents,
        PayloadKind::PushOTeLMetricSum,
        PayloadKind::PushOTeLMetricHistogram,
        PayloadKind::PushOTeLMetricSummary,
        PayloadKind::HealthCheck,
    ];

    /// Registry metadata for this kind.
    pub const fn info(self) -> KindInfo {
        use KindShape::{Empty, Flattened, Variant};

        match self {
            PayloadKind::PushPayload => KindInfo::new("PushPayload", true, Variant),
            PayloadKind::InitializeSession => KindInfo::new("InitializeSession", true, Variant),
            PayloadKind::IdentifySession => KindInfo::new("IdentifySession", true, Variant),
            PayloadKind::AddTrackProperties => KindInfo::new("AddTrackProperties", false, Variant),
            PayloadKind::AddSessionProperties => {
                KindInfo::new("AddSessionProperties", true, Variant)
            }
            PayloadKind::PushBackendPayload => KindInfo::new("PushBackendPayload", true, Variant),
            PayloadKind::PushMetrics => KindInfo::new("PushMetrics", false, Variant),
            PayloadKind::MarkBackendSetup => KindInfo::new("MarkBackendSetup", false, Empty),
            PayloadKind::AddSessionFeedback => KindInfo::new("AddSessionFeedback", true, Variant),
            PayloadKind::PushLogs => KindInfo::new("PushLogs", false, Variant),
            PayloadKind::PushTraces => KindInfo::new("PushTraces", true, Variant),
            PayloadKind::HubSpotCreateContactForAdmin => {
                KindInfo::new("HubSpotCreateContactForAdmin", false, Empty)
            }
            PayloadKind::HubSpotCreateCompanyForWorkspace => {
                KindInfo::new("HubSpotCreateCompanyForWorkspace", false, Empty)
            }
            PayloadKind::HubSpotUpdateContactProperty => {
                KindInfo::new("HubSpotUpdateContactProperty", false, Empty)
            }
            PayloadKind::HubSpotUpdateCompanyProperty => {
                KindInfo::new("HubSpotUpdateCompanyProperty", false, Empty)
            }
            PayloadKind::HubSpotCreateContactCompanyAssociation => {
                KindInfo::new("HubSpotCreateContactCompanyAssociation", false, Empty)
            }
            PayloadKind::SessionDataSync => KindInfo::new("SessionDataSync", true, Variant),
            PayloadKind::ErrorGroupDataSync => KindInfo::new("ErrorGroupDataSync", true, Variant),
            PayloadKind::ErrorObjectDataSync => {
                KindInfo::new("ErrorObjectDataSync", true, Variant)
            }
            PayloadKind::PushCompressedPayload => {
                KindInfo::new("PushCompressedPayload", true, Variant)
            }
            PayloadKind::PushLogsFlattened => KindInfo::new("PushLogsFlattened", true, Flattened),
            PayloadKind::PushTracesFlattened => {
                KindInfo::new("PushTracesFlattened", true, Flattened)
            }
            PayloadKind::PushSessionEvents => KindInfo::new("PushSessionEvents", true, Flattened),
            PayloadKind::PushOTeLMetricSum => KindInfo::new("PushOTeLMetricSum", true, Flattened),
            PayloadKind::PushOTeLMetricHistogram => {
                KindInfo::new("PushOTeLMetricHistogram", true, Flattened)
            }
            PayloadKind::PushOTeLMetricSummary => {
                KindInfo::new("PushOTeLMetricSummary", true, Flattened)
            }
            PayloadKind::HealthCheck => KindInfo::new("HealthCheck", true, Empty),
        }
    }

    /// Wire code of this kind.
    pub fn code(self) -> i64 {
        self.into()
    }

    /// Look up a kind by its wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::try_from(code).ok()
    }

    /// Look up a kind by its symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Symbolic name, which is also the variant's field name on the wire.
    pub const fn name(self) -> &'static str {
        self.info().name
    }

    /// Whether producers may still emit this kind.
    pub const fn is_active(self) -> bool {
        self.info().active
    }

    /// How messages of this kind carry their payload.
    pub const fn shape(self) -> KindShape {
        self.info().shape
    }

    /// Whether this is the liveness sentinel rather than a real payload kind.
    pub fn is_health_check(self) -> bool {
        self == PayloadKind::HealthCheck
    }

    /// Whether a well-formed message of this kind must carry content.
    pub fn carries_payload(self) -> bool {
        self.shape() != KindShape::Empty
    }

    /// Code the next appended kind will receive.
    pub fn next_unassigned_code() -> i64 {
        Self::ALL
            .into_iter()
            .filter(|kind| !kind.is_health_check())
            .map(PayloadKind::code)
            .max()
            .map_or(0, |code| code + 1)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
