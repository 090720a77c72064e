//! Session record as mirrored from the backend.
//!
//! Backends in the wild send the same counters under several legacy names
//! (`tokensIn` vs `inputTokens`, `metrics.totalCost` vs `totalCost`, ...).
//! All of that is resolved here, once, in [`SessionRecord::from_value`].
//! Nothing downstream looks at raw field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp::parse_millis;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session was launched and has not reported activity yet.
    Starting,
    /// Session is actively working.
    Running,
    /// Session is alive but waiting.
    #[default]
    Idle,
    /// Session finished.
    Completed,
    /// Session stopped with an error.
    Error,
}

impl SessionStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 5] = [
        Self::Starting,
        Self::Running,
        Self::Idle,
        Self::Completed,
        Self::Error,
    ];

    /// Canonical wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parse a status string, accepting the synonyms different backends use.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" | "pending" => Some(Self::Starting),
            "running" | "active" => Some(Self::Running),
            "idle" | "paused" => Some(Self::Idle),
            "completed" | "complete" | "done" | "stopped" => Some(Self::Completed),
            "error" | "failed" => Some(Self::Error),
            _ => None,
        }
    }

    /// Starting and running sessions are both considered in flight.
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Finished one way or another.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a payload cannot be turned into a session record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("session payload is not a JSON object")]
    NotAnObject,
    #[error("session payload has no usable id")]
    MissingId,
}

/// One tracked unit of backend work.
///
/// Serializes with canonical camelCase names; deserializes through
/// [`SessionRecord::from_value`] so every known alias is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct SessionRecord {
    /// Backend-assigned identifier. Numeric ids are kept in decimal form.
    pub id: String,
    /// Current status.
    pub status: SessionStatus,
    /// Model label (display only).
    pub model: Option<String>,
    /// Human-friendly name or session key.
    pub name: Option<String>,
    /// Session kind, e.g. `direct`.
    pub kind: Option<String>,
    /// Start time in ms since epoch.
    pub start_time: Option<i64>,
    /// End time in ms since epoch.
    pub end_time: Option<i64>,
    /// Last activity in ms since epoch.
    pub last_activity: Option<i64>,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Total tokens (input + output unless the backend says otherwise).
    pub total_tokens: u64,
    /// Context window size, when reported.
    pub context_tokens: u64,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Progress percentage in [0, 100].
    pub progress: Option<f64>,
    /// The payload this record was decoded from.
    #[serde(skip)]
    pub raw: Value,
}

/// Alias tables. Earlier entries win when several hold a non-zero value.
const INPUT_TOKEN_KEYS: &[&str] = &["tokensIn", "inputTokens", "input_tokens"];
const OUTPUT_TOKEN_KEYS: &[&str] = &["tokensOut", "outputTokens", "output_tokens"];
const TOTAL_TOKEN_KEYS: &[&str] = &["metrics.tokensUsed", "totalTokens", "total_tokens"];
const TOTAL_COST_KEYS: &[&str] = &["metrics.totalCost", "totalCost", "total_cost"];
const START_TIME_KEYS: &[&str] = &["startTime", "startedAt", "start_time"];
const END_TIME_KEYS: &[&str] = &["endTime", "endedAt", "end_time"];
const LAST_ACTIVITY_KEYS: &[&str] = &["lastActivity", "updatedAt", "last_activity"];
const NAME_KEYS: &[&str] = &["name", "sessionKey", "session_key"];

impl SessionRecord {
    /// Minimal record with only an id and a status.
    pub fn new(id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            id: id.into(),
            status,
            model: None,
            name: None,
            kind: None,
            start_time: None,
            end_time: None,
            last_activity: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            context_tokens: 0,
            total_cost: 0.0,
            progress: None,
            raw: Value::Null,
        }
    }

    /// Decode a backend payload, normalizing field aliases.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RecordError::MissingId),
        };

        let status = match obj.get("status").and_then(Value::as_str) {
            Some(s) => SessionStatus::from_str(s).unwrap_or_else(|| {
                tracing::debug!(session = %id, status = s, "unknown session status, treating as idle");
                SessionStatus::Idle
            }),
            None => SessionStatus::Idle,
        };

        let input_tokens = first_count(&value, INPUT_TOKEN_KEYS);
        let output_tokens = first_count(&value, OUTPUT_TOKEN_KEYS);
        let total_tokens = match first_count(&value, TOTAL_TOKEN_KEYS) {
            0 => input_tokens.saturating_add(output_tokens),
            n => n,
        };

        let progress = obj
            .get("progress")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0));

        Ok(Self {
            status,
            model: string_field(&value, &["model"]),
            name: string_field(&value, NAME_KEYS),
            kind: string_field(&value, &["kind"]),
            start_time: first_time(&value, START_TIME_KEYS),
            end_time: first_time(&value, END_TIME_KEYS),
            last_activity: first_time(&value, LAST_ACTIVITY_KEYS),
            input_tokens,
            output_tokens,
            total_tokens,
            context_tokens: first_count(&value, &["contextTokens", "context_tokens"]),
            total_cost: first_cost(&value, TOTAL_COST_KEYS),
            progress,
            id,
            raw: value,
        })
    }

    /// Progress is only meaningful while the session is in flight.
    pub fn progress_percent(&self) -> Option<f64> {
        if self.status.is_in_flight() {
            self.progress
        } else {
            None
        }
    }

    /// Share of the context window in use, in percent.
    #[allow(clippy::cast_precision_loss)]
    pub fn context_usage_percent(&self) -> Option<f64> {
        (self.context_tokens > 0)
            .then(|| self.total_tokens as f64 / self.context_tokens as f64 * 100.0)
    }

    /// Run time in milliseconds, measured to `now_ms` while still open.
    pub fn elapsed_ms(&self, now_ms: i64) -> Option<i64> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or(now_ms);
        Some(end.saturating_sub(start).max(0))
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl TryFrom<Value> for SessionRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Resolve a dotted path like `metrics.tokensUsed`.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |cur, key| cur.get(key))
}

/// Non-negative count from any JSON number. Anything else counts as zero.
pub(crate) fn as_count(v: &Value) -> u64 {
    if let Some(n) = v.as_u64() {
        return n;
    }
    match v.as_f64() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(f) if f.is_finite() && f > 0.0 => f as u64,
        _ => 0,
    }
}

fn first_count(value: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|k| lookup(value, k))
        .map(as_count)
        .find(|n| *n > 0)
        .unwrap_or(0)
}

fn first_cost(value: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|k| lookup(value, k))
        .filter_map(Value::as_f64)
        .find(|c| c.is_finite() && *c > 0.0)
        .unwrap_or(0.0)
}

fn first_time(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| lookup(value, k)).find_map(parse_millis)
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| lookup(value, k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(String::from)
}
