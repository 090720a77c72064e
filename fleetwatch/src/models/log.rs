//! Log entries streamed or fetched for a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timestamp::parse_millis;

/// Severity / category of a log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    /// Tool invocation by the agent.
    Tool,
    /// Agent narration.
    Agent,
    Debug,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Tool => "tool",
            Self::Agent => "agent",
            Self::Debug => "debug",
        }
    }

    /// Parse a level; unknown levels are treated as info.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" | "warn" => Self::Warning,
            "error" | "err" => Self::Error,
            "tool" => Self::Tool,
            "agent" => Self::Agent,
            "debug" | "trace" => Self::Debug,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log payload: plain text or a structured JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogMessage {
    Text(String),
    Structured(Value),
}

impl LogMessage {
    /// Flat single-line form, used for searching.
    pub fn as_plain(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => v.to_string(),
        }
    }

    /// Structured payloads and JSON-looking text are pretty-printed.
    pub fn display(&self) -> String {
        match self {
            Self::Structured(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                let looks_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
                    || (trimmed.starts_with('[') && trimmed.ends_with(']'));
                if looks_json {
                    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
                        if let Ok(pretty) = serde_json::to_string_pretty(&v) {
                            return pretty;
                        }
                    }
                }
                s.clone()
            }
        }
    }
}

/// Why a log payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogEntryError {
    #[error("log entry is not a JSON object")]
    NotAnObject,
    #[error("log entry has no message")]
    MissingMessage,
}

/// A single log line for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Milliseconds since epoch, when the backend supplied one.
    pub timestamp: Option<i64>,
    pub level: LogLevel,
    pub message: LogMessage,
    /// Producer label (tool name, subsystem, ...).
    pub source: Option<String>,
}

impl LogEntry {
    /// Plain text entry.
    pub fn text(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level,
            message: LogMessage::Text(message.into()),
            source: None,
        }
    }

    /// Builder-style timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Decode a backend log payload.
    pub fn from_value(value: &Value) -> Result<Self, LogEntryError> {
        let obj = value.as_object().ok_or(LogEntryError::NotAnObject)?;

        let message = match obj.get("message").or_else(|| obj.get("content")) {
            Some(Value::String(s)) => LogMessage::Text(s.clone()),
            Some(Value::Null) | None => return Err(LogEntryError::MissingMessage),
            Some(other) => LogMessage::Structured(other.clone()),
        };

        Ok(Self {
            timestamp: obj.get("timestamp").and_then(parse_millis),
            level: obj
                .get("level")
                .and_then(Value::as_str)
                .map(LogLevel::parse)
                .unwrap_or_default(),
            message,
            source: obj
                .get("source")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }

    /// Case-insensitive match against message, level and source.
    pub fn matches(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let term = term.to_lowercase();
        self.message.as_plain().to_lowercase().contains(&term)
            || self.level.as_str().contains(&term)
            || self
                .source
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(&term))
    }

    /// Message as it should be shown to a reader.
    pub fn display_message(&self) -> String {
        self.message.display()
    }
}

impl<'de> Deserialize<'de> for LogEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}
