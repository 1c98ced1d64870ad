//! Event Envelope
//!
//! The wire-format unit of the pipeline event stream. Each SSE `data:` line
//! carries one JSON object:
//!
//! ```text
//! {"run_id":"run-1","seq":3,"ts":"2026-01-01T00:00:00Z","type":"stage.progress","stage":"planning","payload":{"progress":40}}
//! ```
//!
//! The payload is decoded into a typed variant keyed by `type`. Types this
//! build does not know are kept as [`PipelineEvent::Unknown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::quality::{QualityDecision, StructuralCheck};
use crate::stage::StageId;

/// The closed set of event types in the pipeline protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RunStarted,
    StageStarted,
    StageProgress,
    StageCompleted,
    StageFailed,
    QualityScored,
    QualityDecision,
    RefinementStarted,
    RefinementCompleted,
    ToolStarted,
    ToolCompleted,
    AiReceipt,
    RunCompleted,
    RunFailed,
    Heartbeat,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::RunStarted,
        EventType::StageStarted,
        EventType::StageProgress,
        EventType::StageCompleted,
        EventType::StageFailed,
        EventType::QualityScored,
        EventType::QualityDecision,
        EventType::RefinementStarted,
        EventType::RefinementCompleted,
        EventType::ToolStarted,
        EventType::ToolCompleted,
        EventType::AiReceipt,
        EventType::RunCompleted,
        EventType::RunFailed,
        EventType::Heartbeat,
    ];

    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RunStarted => "run.started",
            EventType::StageStarted => "stage.started",
            EventType::StageProgress => "stage.progress",
            EventType::StageCompleted => "stage.completed",
            EventType::StageFailed => "stage.failed",
            EventType::QualityScored => "quality.scored",
            EventType::QualityDecision => "quality.decision",
            EventType::RefinementStarted => "refinement.started",
            EventType::RefinementCompleted => "refinement.completed",
            EventType::ToolStarted => "tool.started",
            EventType::ToolCompleted => "tool.completed",
            EventType::AiReceipt => "ai_receipt",
            EventType::RunCompleted => "run.completed",
            EventType::RunFailed => "run.failed",
            EventType::Heartbeat => "heartbeat",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// `run.completed` and `run.failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::RunCompleted | EventType::RunFailed)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `stage.started` and `stage.completed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageProgressPayload {
    /// Raw progress; clamped when applied
    #[serde(default, alias = "percent", skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageFailedPayload {
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of `quality.scored`.
///
/// Either a bare score, or a full report when checks, suggestions and the
/// decision are all present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScoredPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(
        default,
        alias = "structural_checks",
        alias = "structuralChecks",
        skip_serializing_if = "Option::is_none"
    )]
    pub checks: Option<Vec<StructuralCheck>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<QualityDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDecisionPayload {
    pub decision: QualityDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `refinement.started` and `refinement.completed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `tool.started` and `tool.completed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Usage receipt for one model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiReceiptPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    /// Final artifact, opaque to this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFailedPayload {
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Typed event, one variant per protocol event type.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted(RunStartedPayload),
    StageStarted(StagePayload),
    StageProgress(StageProgressPayload),
    StageCompleted(StagePayload),
    StageFailed(StageFailedPayload),
    QualityScored(QualityScoredPayload),
    QualityDecision(QualityDecisionPayload),
    RefinementStarted(RefinementPayload),
    RefinementCompleted(RefinementPayload),
    ToolStarted(ToolPayload),
    ToolCompleted(ToolPayload),
    AiReceipt(AiReceiptPayload),
    RunCompleted(RunCompletedPayload),
    RunFailed(RunFailedPayload),
    Heartbeat,
    /// Event type added by a newer producer
    Unknown { event_type: String, payload: Value },
}

impl PipelineEvent {
    /// Decode a payload for the given wire type.
    ///
    /// A `null` payload is treated as an empty object.
    pub fn decode(event_type: &str, payload: Value) -> CoreResult<Self> {
        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let Some(known) = EventType::parse(event_type) else {
            return Ok(PipelineEvent::Unknown {
                event_type: event_type.to_string(),
                payload,
            });
        };

        let event = match known {
            EventType::RunStarted => PipelineEvent::RunStarted(serde_json::from_value(payload)?),
            EventType::StageStarted => {
                PipelineEvent::StageStarted(serde_json::from_value(payload)?)
            }
            EventType::StageProgress => {
                PipelineEvent::StageProgress(serde_json::from_value(payload)?)
            }
            EventType::StageCompleted => {
                PipelineEvent::StageCompleted(serde_json::from_value(payload)?)
            }
            EventType::StageFailed => PipelineEvent::StageFailed(serde_json::from_value(payload)?),
            EventType::QualityScored => {
                PipelineEvent::QualityScored(serde_json::from_value(payload)?)
            }
            EventType::QualityDecision => {
                PipelineEvent::QualityDecision(serde_json::from_value(payload)?)
            }
            EventType::RefinementStarted => {
                PipelineEvent::RefinementStarted(serde_json::from_value(payload)?)
            }
            EventType::RefinementCompleted => {
                PipelineEvent::RefinementCompleted(serde_json::from_value(payload)?)
            }
            EventType::ToolStarted => PipelineEvent::ToolStarted(serde_json::from_value(payload)?),
            EventType::ToolCompleted => {
                PipelineEvent::ToolCompleted(serde_json::from_value(payload)?)
            }
            EventType::AiReceipt => PipelineEvent::AiReceipt(serde_json::from_value(payload)?),
            EventType::RunCompleted => {
                PipelineEvent::RunCompleted(serde_json::from_value(payload)?)
            }
            EventType::RunFailed => PipelineEvent::RunFailed(serde_json::from_value(payload)?),
            EventType::Heartbeat => PipelineEvent::Heartbeat,
        };
        Ok(event)
    }

    /// The known event type, or `None` for [`PipelineEvent::Unknown`].
    pub fn kind(&self) -> Option<EventType> {
        let kind = match self {
            PipelineEvent::RunStarted(_) => EventType::RunStarted,
            PipelineEvent::StageStarted(_) => EventType::StageStarted,
            PipelineEvent::StageProgress(_) => EventType::StageProgress,
            PipelineEvent::StageCompleted(_) => EventType::StageCompleted,
            PipelineEvent::StageFailed(_) => EventType::StageFailed,
            PipelineEvent::QualityScored(_) => EventType::QualityScored,
            PipelineEvent::QualityDecision(_) => EventType::QualityDecision,
            PipelineEvent::RefinementStarted(_) => EventType::RefinementStarted,
            PipelineEvent::RefinementCompleted(_) => EventType::RefinementCompleted,
            PipelineEvent::ToolStarted(_) => EventType::ToolStarted,
            PipelineEvent::ToolCompleted(_) => EventType::ToolCompleted,
            PipelineEvent::AiReceipt(_) => EventType::AiReceipt,
            PipelineEvent::RunCompleted(_) => EventType::RunCompleted,
            PipelineEvent::RunFailed(_) => EventType::RunFailed,
            PipelineEvent::Heartbeat => EventType::Heartbeat,
            PipelineEvent::Unknown { .. } => return None,
        };
        Some(kind)
    }

    /// Wire name of this event
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::Unknown { event_type, .. } => event_type,
            known => known.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// Re-encode the payload for the wire.
    pub fn payload(&self) -> Value {
        let encoded = match self {
            PipelineEvent::RunStarted(p) => serde_json::to_value(p),
            PipelineEvent::StageStarted(p) | PipelineEvent::StageCompleted(p) => {
                serde_json::to_value(p)
            }
            PipelineEvent::StageProgress(p) => serde_json::to_value(p),
            PipelineEvent::StageFailed(p) => serde_json::to_value(p),
            PipelineEvent::QualityScored(p) => serde_json::to_value(p),
            PipelineEvent::QualityDecision(p) => serde_json::to_value(p),
            PipelineEvent::RefinementStarted(p) | PipelineEvent::RefinementCompleted(p) => {
                serde_json::to_value(p)
            }
            PipelineEvent::ToolStarted(p) | PipelineEvent::ToolCompleted(p) => {
                serde_json::to_value(p)
            }
            PipelineEvent::AiReceipt(p) => serde_json::to_value(p),
            PipelineEvent::RunCompleted(p) => serde_json::to_value(p),
            PipelineEvent::RunFailed(p) => serde_json::to_value(p),
            PipelineEvent::Heartbeat => Ok(Value::Object(Map::new())),
            PipelineEvent::Unknown { payload, .. } => Ok(payload.clone()),
        };
        encoded.unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_some_and(|k| k.is_terminal())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Raw wire shape, decoded before the payload is typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEnvelope {
    run_id: String,
    seq: u64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    ts: DateTime<Utc>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// One decoded unit of the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    pub run_id: String,
    /// Producer-assigned sequence number
    pub seq: u64,
    pub ts: DateTime<Utc>,
    /// `None` when the envelope has no stage, or names one this build does not know
    pub stage: Option<StageId>,
    pub event: PipelineEvent,
}

impl Envelope {
    pub fn new(
        run_id: impl Into<String>,
        seq: u64,
        ts: DateTime<Utc>,
        stage: Option<StageId>,
        event: PipelineEvent,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            ts,
            stage,
            event,
        }
    }

    /// Decode one JSON object.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as one JSON object.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn event_type(&self) -> &str {
        self.event.event_type()
    }

    /// Whether this envelope ends the run
    pub fn is_terminal(&self) -> bool {
        self.event.is_terminal()
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = CoreError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        if wire.run_id.trim().is_empty() {
            return Err(CoreError::parse("run_id is empty"));
        }
        let event = PipelineEvent::decode(&wire.event_type, wire.payload)?;
        Ok(Self {
            run_id: wire.run_id,
            seq: wire.seq,
            ts: wire.ts,
            stage: wire.stage.as_deref().and_then(StageId::parse),
            event,
        })
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        Self {
            payload: envelope.event.payload(),
            event_type: envelope.event.event_type().to_string(),
            run_id: envelope.run_id,
            seq: envelope.seq,
            ts: envelope.ts,
            stage: envelope.stage.map(|s| s.as_str().to_string()),
        }
    }
}

/// `ts` is either an RFC 3339 string or integer epoch milliseconds.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", ms))),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", text, e))),
        }
    }
}
