//! Push frame parsing.
//!
//! Every message on the push channel is a JSON object `{type, data}`. Parsing
//! happens in two steps: [`PushFrame::parse`] checks the envelope (anything
//! without a string `type` is rejected), then [`PushEvent::decode`] turns a
//! frame of a recognised kind into a typed event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{LogEntry, LogEntryError, RecordError, SessionRecord, SessionStats, SessionStatus};

/// Inbound frame kinds the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStarted,
    SessionUpdated,
    SessionCompleted,
    AgentStarted,
    AgentUpdated,
    LogUpdate,
    LogsCleared,
    StatsUpdated,
}

impl EventKind {
    pub const ALL: [Self; 8] = [
        Self::SessionStarted,
        Self::SessionUpdated,
        Self::SessionCompleted,
        Self::AgentStarted,
        Self::AgentUpdated,
        Self::LogUpdate,
        Self::LogsCleared,
        Self::StatsUpdated,
    ];

    /// Wire name used in the `type` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "session-started",
            Self::SessionUpdated => "session-updated",
            Self::SessionCompleted => "session-completed",
            Self::AgentStarted => "agent-started",
            Self::AgentUpdated => "agent-updated",
            Self::LogUpdate => "log-update",
            Self::LogsCleared => "logs-cleared",
            Self::StatsUpdated => "stats-updated",
        }
    }

    /// Look up a wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while parsing or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unrecognised frame type `{0}`")]
    UnknownType(String),
    #[error("bad `{kind}` payload: {reason}")]
    Payload { kind: &'static str, reason: String },
}

impl FrameError {
    fn payload(kind: EventKind, reason: impl ToString) -> Self {
        Self::Payload {
            kind: kind.as_str(),
            reason: reason.to_string(),
        }
    }
}

/// A raw `{type, data}` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl PushFrame {
    /// Build an outbound frame.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// The keep-alive frame `{"type":"ping"}`.
    pub fn ping() -> Self {
        Self::new("ping", Value::Null)
    }

    /// Parse a text message, validating the envelope only.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        Ok(Self { kind, data })
    }

    /// Recognised kind, if any.
    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_str(&self.kind)
    }

    /// Serialize for the wire.
    pub fn to_text(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload of a completion event.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletedPayload {
    /// Only the id (and maybe a status) was sent; change the status of the
    /// local copy and keep everything else.
    StatusOnly { id: String, status: SessionStatus },
    /// A full record was sent; replace the local copy.
    Record(SessionRecord),
}

impl CompletedPayload {
    pub fn id(&self) -> &str {
        match self {
            Self::StatusOnly { id, .. } => id,
            Self::Record(r) => &r.id,
        }
    }
}

/// A decoded push event. Session and agent variants of the same event collapse
/// into one case.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Started(SessionRecord),
    Updated(SessionRecord),
    Completed(CompletedPayload),
    LogAppended { session_id: String, entry: LogEntry },
    LogsCleared { session_id: String },
    StatsUpdated(SessionStats),
}

impl PushEvent {
    /// Decode a frame into a typed event.
    pub fn decode(frame: &PushFrame) -> Result<Self, FrameError> {
        let kind = frame
            .event_kind()
            .ok_or_else(|| FrameError::UnknownType(frame.kind.clone()))?;
        let data = &frame.data;

        let event = match kind {
            EventKind::SessionStarted | EventKind::AgentStarted => {
                Self::Started(decode_record(kind, unwrap_session(data))?)
            }
            EventKind::SessionUpdated | EventKind::AgentUpdated => {
                Self::Updated(decode_record(kind, unwrap_session(data))?)
            }
            EventKind::SessionCompleted => Self::Completed(decode_completed(unwrap_session(data))?),
            EventKind::LogUpdate => {
                let session_id = session_ref(data).ok_or_else(|| {
                    FrameError::payload(kind, "missing agentId/sessionId")
                })?;
                let log = data
                    .get("log")
                    .ok_or_else(|| FrameError::payload(kind, "missing log"))?;
                let entry = LogEntry::from_value(log)
                    .map_err(|e: LogEntryError| FrameError::payload(kind, e))?;
                Self::LogAppended { session_id, entry }
            }
            EventKind::LogsCleared => {
                let session_id = session_ref(data).ok_or_else(|| {
                    FrameError::payload(kind, "missing agentId/sessionId")
                })?;
                Self::LogsCleared { session_id }
            }
            EventKind::StatsUpdated => Self::StatsUpdated(
                serde_json::from_value(unwrap_stats(data).clone())
                    .map_err(|e| FrameError::payload(kind, e))?,
            ),
        };
        Ok(event)
    }

    /// Whether the cached backend stats are stale after this event.
    pub const fn invalidates_stats(&self) -> bool {
        matches!(self, Self::Started(_) | Self::Updated(_) | Self::Completed(_))
    }
}

/// Updates arrive either bare or wrapped as `{session: {...}}`.
fn unwrap_session(data: &Value) -> &Value {
    data.get("session").filter(|s| s.is_object()).unwrap_or(data)
}

fn unwrap_stats(data: &Value) -> &Value {
    data.get("stats").filter(|s| s.is_object()).unwrap_or(data)
}

fn decode_record(kind: EventKind, data: &Value) -> Result<SessionRecord, FrameError> {
    SessionRecord::from_value(data.clone()).map_err(|e: RecordError| FrameError::payload(kind, e))
}

/// Keys a completion may carry without being a full record.
const STATUS_ONLY_KEYS: &[&str] = &["id", "agentId", "sessionId", "status"];

fn decode_completed(data: &Value) -> Result<CompletedPayload, FrameError> {
    let kind = EventKind::SessionCompleted;
    let obj = data
        .as_object()
        .ok_or_else(|| FrameError::payload(kind, RecordError::NotAnObject))?;

    if obj.keys().all(|k| STATUS_ONLY_KEYS.contains(&k.as_str())) {
        let id = session_ref(data)
            .ok_or_else(|| FrameError::payload(kind, RecordError::MissingId))?;
        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .and_then(SessionStatus::from_str)
            .unwrap_or(SessionStatus::Completed);
        return Ok(CompletedPayload::StatusOnly { id, status });
    }

    let mut record = decode_record(kind, data)?;
    if obj.get("status").and_then(Value::as_str).is_none() {
        record.status = SessionStatus::Completed;
    }
    Ok(CompletedPayload::Record(record))
}

/// Log frames name their session as `agentId` or `sessionId`.
fn session_ref(data: &Value) -> Option<String> {
    ["agentId", "sessionId", "id"]
        .iter()
        .filter_map(|k| data.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
