//! Filter criteria for session listing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::session::{SessionRecord, SessionStatus};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{other}' (expected asc or desc)")),
        }
    }
}

/// Optional criteria passed to the session listing endpoint.
///
/// Unset fields are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub status: Option<String>,
    pub model: Option<String>,
    pub kind: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl SessionFilter {
    /// Whether no criteria are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Query parameters in the order the backend documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref s) = self.status {
            pairs.push(("status", s.clone()));
        }
        if let Some(ref m) = self.model {
            pairs.push(("model", m.clone()));
        }
        if let Some(ref k) = self.kind {
            pairs.push(("kind", k.clone()));
        }
        if let Some(ref s) = self.sort_by {
            pairs.push(("sortBy", s.clone()));
        }
        if let Some(o) = self.sort_order {
            pairs.push(("sortOrder", o.as_str().to_string()));
        }
        pairs
    }

    /// Whether a record passes the status/model/kind criteria.
    pub fn matches(&self, session: &SessionRecord) -> bool {
        if let Some(ref wanted) = self.status {
            // Compare canonical statuses so "active" matches a running session.
            let ok = match SessionStatus::from_str(wanted) {
                Some(status) if status.is_in_flight() => session.status.is_in_flight(),
                Some(status) => session.status == status,
                None => false,
            };
            if !ok {
                return false;
            }
        }
        if let Some(ref wanted) = self.model {
            if session.model.as_deref() != Some(wanted.as_str()) {
                return false;
            }
        }
        if let Some(ref wanted) = self.kind {
            if session.kind.as_deref() != Some(wanted.as_str()) {
                return false;
            }
        }
        true
    }

    /// Filter and sort a snapshot locally, for backends that ignore the query.
    pub fn apply(&self, sessions: Vec<SessionRecord>) -> Vec<SessionRecord> {
        let mut out: Vec<_> = sessions.into_iter().filter(|s| self.matches(s)).collect();
        if let Some(ref field) = self.sort_by {
            let order = self.sort_order.unwrap_or_default();
            out.sort_by(|a, b| {
                let ord = compare_by(field, a, b);
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        out
    }
}

fn compare_by(field: &str, a: &SessionRecord, b: &SessionRecord) -> Ordering {
    match field {
        "startTime" | "start_time" | "started" => a.start_time.cmp(&b.start_time),
        "endTime" | "end_time" => a.end_time.cmp(&b.end_time),
        "lastActivity" | "last_activity" | "activity" => a.last_activity.cmp(&b.last_activity),
        "totalTokens" | "tokens" => a.total_tokens.cmp(&b.total_tokens),
        "totalCost" | "cost" => a.total_cost.total_cmp(&b.total_cost),
        "model" => a.model.cmp(&b.model),
        "status" => a.status.as_str().cmp(b.status.as_str()),
        "name" => a.display_name().cmp(b.display_name()),
        _ => a.id.cmp(&b.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> SessionRecord {
        SessionRecord::from_value(v).unwrap()
    }

    #[test]
    fn empty_filter_has_no_query() {
        let filter = SessionFilter::default();
        assert!(filter.is_empty());
        assert!(filter.query_pairs().is_empty());
    }

    #[test]
    fn query_pairs_use_backend_names() {
        let filter = SessionFilter {
            status: Some("running".into()),
            sort_by: Some("startTime".into()),
            sort_order: Some(SortOrder::Asc),
            ..SessionFilter::default()
        };
        assert_eq!(
            filter.query_pairs(),
            vec![
                ("status", "running".to_string()),
                ("sortBy", "startTime".to_string()),
                ("sortOrder", "asc".to_string()),
            ]
        );
    }

    #[test]
    fn status_filter_uses_canonical_vocabulary() {
        let filter = SessionFilter {
            status: Some("active".into()),
            ..SessionFilter::default()
        };
        assert!(filter.matches(&rec(json!({"id": "1", "status": "running"}))));
        assert!(filter.matches(&rec(json!({"id": "2", "status": "starting"}))));
        assert!(!filter.matches(&rec(json!({"id": "3", "status": "idle"}))));
    }

    #[test]
    fn apply_filters_and_sorts() {
        let sessions = vec![
            rec(json!({"id": "a", "model": "claude", "totalTokens": 10})),
            rec(json!({"id": "b", "model": "gpt", "totalTokens": 50})),
            rec(json!({"id": "c", "model": "claude", "totalTokens": 30})),
        ];
        let filter = SessionFilter {
            model: Some("claude".into()),
            sort_by: Some("totalTokens".into()),
            sort_order: Some(SortOrder::Desc),
            ..SessionFilter::default()
        };
        let ids: Vec<_> = filter.apply(sessions).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn sort_order_parses() {
        assert_eq!("ASC".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
