//! Aggregate statistics over the session collection.
//!
//! The backend computes its own figures; the client can derive the same shape
//! from whatever it currently holds. Derived stats are never cached.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::session::{as_count, SessionRecord, SessionStatus};

/// Backends send averages as floats and occasionally nulls; any of those
/// must not sink the whole payload.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Value::deserialize(deserializer).map(|v| as_count(&v))
}

/// One bar in a usage chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageBucket {
    /// Day or hour label as sent by the backend.
    #[serde(alias = "date", alias = "hour", alias = "name")]
    pub label: String,
    #[serde(deserialize_with = "lenient_count")]
    pub tokens_in: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub tokens_out: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub total_tokens: u64,
}

/// Counts, token/cost sums and models in use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    #[serde(deserialize_with = "lenient_count")]
    pub total_sessions: u64,
    /// In-flight sessions (starting or running).
    #[serde(deserialize_with = "lenient_count")]
    pub active_sessions: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub idle_sessions: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub completed_sessions: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub error_sessions: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Mean duration of sessions with both start and end times, in ms.
    #[serde(deserialize_with = "lenient_count")]
    pub avg_session_duration: u64,
    /// Distinct model labels, sorted.
    pub models: Vec<String>,
    pub daily_usage: Vec<UsageBucket>,
    pub hourly_usage: Vec<UsageBucket>,
}

impl SessionStats {
    /// Compute stats from a session collection.
    pub fn derive(sessions: &[SessionRecord]) -> Self {
        let mut stats = Self {
            total_sessions: sessions.len() as u64,
            ..Self::default()
        };
        let mut models = BTreeSet::new();
        let mut duration_sum: i128 = 0;
        let mut duration_count: i128 = 0;

        for session in sessions {
            match session.status {
                SessionStatus::Starting | SessionStatus::Running => stats.active_sessions += 1,
                SessionStatus::Idle => stats.idle_sessions += 1,
                SessionStatus::Completed => stats.completed_sessions += 1,
                SessionStatus::Error => stats.error_sessions += 1,
            }
            stats.total_tokens = stats.total_tokens.saturating_add(session.total_tokens);
            stats.total_cost += session.total_cost;

            if let Some(model) = session.model.as_deref().filter(|m| !m.is_empty()) {
                models.insert(model.to_string());
            }
            if let (Some(start), Some(end)) = (session.start_time, session.end_time) {
                duration_sum += (i128::from(end) - i128::from(start)).max(0);
                duration_count += 1;
            }
        }

        if duration_count > 0 {
            stats.avg_session_duration = u64::try_from(duration_sum / duration_count).unwrap_or(u64::MAX);
        }
        stats.models = models.into_iter().collect();
        stats
    }

    /// Number of sessions with the given status.
    pub const fn count(&self, status: SessionStatus) -> u64 {
        match status {
            // Backends only report the in-flight total.
            SessionStatus::Starting | SessionStatus::Running => self.active_sessions,
            SessionStatus::Idle => self.idle_sessions,
            SessionStatus::Completed => self.completed_sessions,
            SessionStatus::Error => self.error_sessions,
        }
    }
}
