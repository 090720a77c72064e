//! In-process backend used by the network tests.
//!
//! Serves both REST namespaces and a WebSocket endpoint on an ephemeral port.
//! Tests seed its state, push frames to connected clients and inspect what the
//! client sent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Poll `cond` until it holds or three seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[derive(Clone, Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Mutable backend state.
#[derive(Default)]
pub struct Backend {
    sessions: Mutex<Vec<Value>>,
    stats: Mutex<Value>,
    logs: Mutex<HashMap<String, Vec<Value>>>,
    /// Listing answers with an error (500 or `success: false`).
    fail_list: AtomicBool,
    /// Control calls answer with 500.
    fail_control: AtomicBool,
    list_delay_ms: AtomicU64,
    list_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    commands: Mutex<Vec<String>>,
    queries: Mutex<Vec<HashMap<String, String>>>,
    bypass_headers: AtomicUsize,
    connections: AtomicUsize,
    received: Mutex<Vec<String>>,
    push_tx: Option<broadcast::Sender<Outgoing>>,
}

impl Backend {
    fn push_tx(&self) -> &broadcast::Sender<Outgoing> {
        self.push_tx.as_ref().expect("push channel")
    }

    fn record_headers(&self, headers: &HeaderMap) {
        let ok = headers
            .get("ngrok-skip-browser-warning")
            .is_some_and(|v| v == "true")
            && headers
                .get("bypass-tunnel-reminder")
                .is_some_and(|v| v == "true");
        if ok {
            self.bypass_headers.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A running backend. Aborted on drop.
pub struct TestBackend {
    pub addr: SocketAddr,
    pub state: Arc<Backend>,
    handle: JoinHandle<()>,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        let state = Arc::new(Backend {
            stats: Mutex::new(json!({})),
            push_tx: Some(tx),
            ..Backend::default()
        });

        let app = Router::new()
            .route("/ws", get(websocket_handler))
            .route("/api/agents", get(list_agents))
            .route("/api/agents/stats", get(agent_stats))
            .route("/api/agents/{id}/logs", get(agent_logs))
            .route("/api/agents/{id}/logs/export", get(export_logs))
            .route("/api/agents/{id}/control", post(agent_control))
            .route("/api/clawdbot/sessions", get(list_sessions))
            .route("/api/clawdbot/stats", get(session_stats))
            .route("/api/clawdbot/sessions/{id}", get(get_session))
            .route("/api/clawdbot/sessions/{id}/logs", get(session_logs))
            .route("/api/clawdbot/sessions/{id}/kill", post(kill_session))
            .route("/api/clawdbot/sessions/{id}/restart", post(restart_session))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test backend");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    // === Seeding ===

    pub fn set_sessions(&self, sessions: Vec<Value>) {
        *self.state.sessions.lock().unwrap() = sessions;
    }

    pub fn set_stats(&self, stats: Value) {
        *self.state.stats.lock().unwrap() = stats;
    }

    pub fn set_logs(&self, id: &str, logs: Vec<Value>) {
        self.state.logs.lock().unwrap().insert(id.to_string(), logs);
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_control(&self, fail: bool) {
        self.state.fail_control.store(fail, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.list_delay_ms.store(ms, Ordering::SeqCst);
    }

    // === Push ===

    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.state.push_tx().send(Outgoing::Text(text.to_string()));
    }

    /// Close every open socket from the server side.
    pub fn close_sockets(&self) {
        let _ = self.state.push_tx().send(Outgoing::Close);
    }

    // === Inspection ===

    /// Number of WebSocket connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Text frames received from clients.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    /// Control commands received, as `"<id> <action>[ <message>]"`.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Query strings seen by the session listing endpoint.
    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.state.queries.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.state.stats_calls.load(Ordering::SeqCst)
    }

    /// Requests that carried both tunnel-bypass headers.
    pub fn bypass_header_count(&self) -> usize {
        self.state.bypass_headers.load(Ordering::SeqCst)
    }
}

impl Drop for TestBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Shared = State<Arc<Backend>>;

fn failure(status: StatusCode, body: &str) -> Response {
    (status, body.to_string()).into_response()
}

async fn list_delay(state: &Backend) {
    let ms = state.list_delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

// === Agents namespace ===

async fn list_agents(State(state): Shared, headers: HeaderMap) -> Response {
    state.record_headers(&headers);
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    list_delay(&state).await;
    if state.fail_list.load(Ordering::SeqCst) {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable");
    }
    Json(Value::Array(state.sessions.lock().unwrap().clone())).into_response()
}

async fn agent_stats(State(state): Shared, headers: HeaderMap) -> Response {
    state.record_headers(&headers);
    state.stats_calls.fetch_add(1, Ordering::SeqCst);
    Json(state.stats.lock().unwrap().clone()).into_response()
}

async fn agent_logs(State(state): Shared, Path(id): Path<String>) -> Response {
    let logs = state.logs.lock().unwrap().get(&id).cloned().unwrap_or_default();
    Json(Value::Array(logs)).into_response()
}

async fn export_logs(State(state): Shared, Path(id): Path<String>) -> Response {
    let logs = state.logs.lock().unwrap().get(&id).cloned().unwrap_or_default();
    let text: String = logs
        .iter()
        .filter_map(|l| l.get("message").and_then(Value::as_str))
        .map(|m| format!("{m}\n"))
        .collect();
    Bytes::from(text).into_response()
}

async fn agent_control(
    State(state): Shared,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if state.fail_control.load(Ordering::SeqCst) {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "agent not responding");
    }
    let action = body.get("action").and_then(Value::as_str).unwrap_or("?");
    let command = match body.get("message").and_then(Value::as_str) {
        Some(message) => format!("{id} {action} {message}"),
        None => format!("{id} {action}"),
    };
    state.commands.lock().unwrap().push(command);
    Json(json!({"success": true})).into_response()
}

// === Sessions namespace ===

async fn list_sessions(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record_headers(&headers);
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    state.queries.lock().unwrap().push(query);
    list_delay(&state).await;
    if state.fail_list.load(Ordering::SeqCst) {
        return Json(json!({"success": false, "error": "gateway offline"})).into_response();
    }
    let sessions = state.sessions.lock().unwrap().clone();
    Json(json!({"success": true, "sessions": sessions})).into_response()
}

async fn session_stats(State(state): Shared, headers: HeaderMap) -> Response {
    state.record_headers(&headers);
    state.stats_calls.fetch_add(1, Ordering::SeqCst);
    let stats = state.stats.lock().unwrap().clone();
    Json(json!({"success": true, "stats": stats})).into_response()
}

async fn get_session(State(state): Shared, Path(id): Path<String>) -> Response {
    let found = state
        .sessions
        .lock()
        .unwrap()
        .iter()
        .find(|s| s.get("id").and_then(Value::as_str) == Some(id.as_str()))
        .cloned();
    match found {
        Some(session) => Json(json!({"success": true, "session": session})).into_response(),
        None => failure(StatusCode::NOT_FOUND, "session not found"),
    }
}

async fn session_logs(State(state): Shared, Path(id): Path<String>) -> Response {
    let logs = state.logs.lock().unwrap().get(&id).cloned().unwrap_or_default();
    Json(json!({"success": true, "logs": logs})).into_response()
}

async fn kill_session(State(state): Shared, Path(id): Path<String>) -> Response {
    session_command(&state, &id, "kill")
}

async fn restart_session(State(state): Shared, Path(id): Path<String>) -> Response {
    session_command(&state, &id, "restart")
}

fn session_command(state: &Backend, id: &str, action: &str) -> Response {
    if state.fail_control.load(Ordering::SeqCst) {
        return Json(json!({"success": false, "error": "session is locked"})).into_response();
    }
    state.commands.lock().unwrap().push(format!("{id} {action}"));
    Json(json!({"success": true})).into_response()
}

// === WebSocket ===

async fn websocket_handler(ws: WebSocketUpgrade, State(state): Shared) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: WebSocket, state: Arc<Backend>) {
    let mut rx = state.push_tx().subscribe();
    // Count only once subscribed, so a test that waits for the count cannot
    // push before this socket is listening.
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state.received.lock().unwrap().push(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            outgoing = rx.recv() => match outgoing {
                Ok(Outgoing::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Outgoing::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
