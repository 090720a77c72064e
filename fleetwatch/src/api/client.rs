//! HTTP client for the backend REST API.
//!
//! Two route families exist in the wild:
//!
//! - `agents`: `/api/agents`, bare JSON bodies, control through
//!   `POST /api/agents/{id}/control`.
//! - `sessions`: `/api/clawdbot/...`, every body wrapped in a
//!   `{success, <field>, error}` envelope, dedicated kill/restart routes.
//!
//! Message relay and log export only exist under `agents` and are always sent
//! there.

use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::ApiError;
use crate::models::{LogEntry, SessionFilter, SessionRecord, SessionStats};

/// Headers that get requests past tunnel interstitial pages.
const TUNNEL_BYPASS_HEADERS: [(&str, &str); 2] = [
    ("ngrok-skip-browser-warning", "true"),
    ("bypass-tunnel-reminder", "true"),
];

/// Which route family the backend serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiNamespace {
    #[default]
    Agents,
    Sessions,
}

impl ApiNamespace {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Sessions => "sessions",
        }
    }
}

impl FromStr for ApiNamespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agents" | "agent" => Ok(Self::Agents),
            "sessions" | "session" | "clawdbot" => Ok(Self::Sessions),
            other => Err(format!("unknown API namespace '{other}' (expected agents or sessions)")),
        }
    }
}

/// Control actions accepted by `POST /api/agents/{id}/control`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ControlAction<'a> {
    Stop,
    Restart,
    Message(&'a str),
}

impl ControlAction<'_> {
    fn body(&self) -> Value {
        match self {
            Self::Stop => json!({"action": "stop"}),
            Self::Restart => json!({"action": "restart"}),
            Self::Message(text) => json!({"action": "message", "message": text}),
        }
    }
}

/// REST client bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    namespace: ApiNamespace,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, namespace: ApiNamespace) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in TUNNEL_BYPASS_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        let http = Client::builder().default_headers(headers).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            namespace,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn namespace(&self) -> ApiNamespace {
        self.namespace
    }

    // === Sessions ===

    /// Fetch the session collection.
    ///
    /// The `sessions` routes filter server-side; for `agents` the filter is
    /// applied to the returned array.
    pub async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionRecord>, ApiError> {
        match self.namespace {
            ApiNamespace::Agents => {
                let body = self.get("/api/agents", &[]).await?;
                Ok(filter.apply(decode_sessions(body)?))
            }
            ApiNamespace::Sessions => {
                let body = self
                    .get("/api/clawdbot/sessions", &filter.query_pairs())
                    .await?;
                decode_sessions(envelope(body, "sessions")?)
            }
        }
    }

    /// Fetch one session.
    pub async fn fetch_session(&self, id: &str) -> Result<SessionRecord, ApiError> {
        match self.namespace {
            ApiNamespace::Agents => self
                .list_sessions(&SessionFilter::default())
                .await?
                .into_iter()
                .find(|s| s.id == id)
                .ok_or_else(|| ApiError::NotFound(id.to_string())),
            ApiNamespace::Sessions => {
                let path = format!("/api/clawdbot/sessions/{}", encode(id));
                let body = envelope(self.get(&path, &[]).await?, "session")?;
                SessionRecord::from_value(body).map_err(ApiError::decode)
            }
        }
    }

    /// Backend-computed statistics.
    pub async fn fetch_stats(&self) -> Result<SessionStats, ApiError> {
        let body = match self.namespace {
            ApiNamespace::Agents => self.get("/api/agents/stats", &[]).await?,
            ApiNamespace::Sessions => envelope(self.get("/api/clawdbot/stats", &[]).await?, "stats")?,
        };
        serde_json::from_value(body).map_err(ApiError::decode)
    }

    /// Log history of one session, oldest first.
    pub async fn fetch_logs(&self, id: &str) -> Result<Vec<LogEntry>, ApiError> {
        let body = match self.namespace {
            ApiNamespace::Agents => {
                self.get(&format!("/api/agents/{}/logs", encode(id)), &[]).await?
            }
            ApiNamespace::Sessions => {
                let path = format!("/api/clawdbot/sessions/{}/logs", encode(id));
                envelope(self.get(&path, &[]).await?, "logs")?
            }
        };
        decode_logs(body)
    }

    // === Commands ===

    /// Stop a session.
    pub async fn kill(&self, id: &str) -> Result<(), ApiError> {
        match self.namespace {
            ApiNamespace::Agents => self.control(id, ControlAction::Stop).await,
            ApiNamespace::Sessions => self.session_command(id, "kill").await,
        }
    }

    /// Restart a session.
    pub async fn restart(&self, id: &str) -> Result<(), ApiError> {
        match self.namespace {
            ApiNamespace::Agents => self.control(id, ControlAction::Restart).await,
            ApiNamespace::Sessions => self.session_command(id, "restart").await,
        }
    }

    /// Relay a text message to a session.
    pub async fn send_message(&self, id: &str, text: &str) -> Result<(), ApiError> {
        self.control(id, ControlAction::Message(text)).await
    }

    /// Download the plain-text log export of a session.
    pub async fn export_logs(&self, id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url(&format!("/api/agents/{}/logs/export", encode(id)));
        debug!(%url, "GET");
        let resp = check(self.http.get(&url).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // === Plumbing ===

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str, query: &[(&'static str, String)]) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%url, ?query, "GET");
        let resp = check(self.http.get(&url).query(query).send().await?).await?;
        resp.json().await.map_err(ApiError::decode)
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let mut req = self.http.post(&url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = check(req.send().await?).await?;
        // Command routes may answer with an empty body.
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    async fn control(&self, id: &str, action: ControlAction<'_>) -> Result<(), ApiError> {
        let path = format!("/api/agents/{}/control", encode(id));
        let body = self.post(&path, Some(action.body())).await?;
        reject_on_failure(&body)
    }

    async fn session_command(&self, id: &str, command: &str) -> Result<(), ApiError> {
        let path = format!("/api/clawdbot/sessions/{}/{command}", encode(id));
        let body = self.post(&path, None).await?;
        reject_on_failure(&body)
    }
}

fn encode(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}

/// Turn a non-2xx response into [`ApiError::Status`].
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), %body, "backend request failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

fn reject_on_failure(body: &Value) -> Result<(), ApiError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Rejected(error_message(body)));
    }
    Ok(())
}

fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string()
}

/// Unwrap `{success, <field>, error}`.
fn envelope(mut body: Value, field: &str) -> Result<Value, ApiError> {
    reject_on_failure(&body)?;
    body.get_mut(field)
        .map(Value::take)
        .ok_or_else(|| ApiError::Decode(format!("response has no `{field}` field")))
}

fn decode_sessions(body: Value) -> Result<Vec<SessionRecord>, ApiError> {
    let Value::Array(items) = body else {
        return Err(ApiError::decode("session list is not an array"));
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match SessionRecord::from_value(item) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "skipping malformed session");
                None
            }
        })
        .collect())
}

fn decode_logs(body: Value) -> Result<Vec<LogEntry>, ApiError> {
    let Value::Array(items) = body else {
        return Err(ApiError::decode("log list is not an array"));
    };
    Ok(items
        .iter()
        .filter_map(|item| match LogEntry::from_value(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping malformed log entry");
                None
            }
        })
        .collect())
}
