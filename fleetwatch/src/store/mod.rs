//! Session store: the local mirror of the backend's session collection.
//!
//! REST snapshots and push events are merged into one [`StoreState`] through
//! the same replace-by-id rule, so whichever write lands last wins. The state
//! sits behind a plain mutex that is never held across an await.
//!
//! Every mutation bumps a counter on a `watch` channel; renderers wait on
//! [`SessionStore::changes`] instead of polling.

mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{LogEntry, SessionFilter, SessionRecord, SessionStats};
use crate::push::{FrameError, PushEvent, PushFrame};

pub use state::StoreState;

struct Inner {
    api: ApiClient,
    state: Mutex<StoreState>,
    active: AtomicBool,
    changes: watch::Sender<u64>,
}

/// Shared handle to the store. Clones refer to the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(api: ApiClient) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(StoreState {
                    loading: true,
                    ..StoreState::default()
                }),
                active: AtomicBool::new(true),
                changes,
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the state and notify watchers.
    fn update<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let out = f(&mut *self.lock());
        self.inner.changes.send_modify(|n| *n = n.wrapping_add(1));
        out
    }

    fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&*self.lock())
    }

    // === Lifecycle ===

    /// Whether results are still being applied.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Stop applying results. Requests already in flight finish, but their
    /// outcome is discarded.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }

    /// Receiver bumped on every mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Drop everything held locally.
    pub fn clear(&self) {
        self.update(|s| {
            let filter = std::mem::take(&mut s.filter);
            *s = StoreState {
                filter,
                ..StoreState::default()
            };
        });
    }

    // === Snapshots ===

    pub fn set_filter(&self, filter: SessionFilter) {
        self.update(|s| s.filter = filter);
    }

    pub fn filter(&self) -> SessionFilter {
        self.read(|s| s.filter.clone())
    }

    /// Replace the collection with a fresh snapshot.
    ///
    /// On failure the previous collection stays and the error is recorded.
    pub async fn fetch_sessions(&self) {
        let filter = self.filter();
        let result = self.inner.api.list_sessions(&filter).await;
        if !self.is_active() {
            debug!("store inactive, discarding session snapshot");
            return;
        }
        match result {
            Ok(sessions) => {
                debug!(count = sessions.len(), "session snapshot");
                self.update(|s| s.replace_sessions(sessions));
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch sessions");
                self.update(|s| {
                    s.error = Some(format!("Failed to fetch sessions: {err}"));
                    s.loading = false;
                });
            }
        }
    }

    /// Refresh the cached backend statistics. Failures are logged only.
    pub async fn fetch_stats(&self) {
        let result = self.inner.api.fetch_stats().await;
        if !self.is_active() {
            return;
        }
        match result {
            Ok(stats) => self.update(|s| s.stats = Some(stats)),
            Err(err) => warn!(error = %err, "failed to fetch stats"),
        }
    }

    /// Fetch sessions and stats concurrently.
    pub async fn refresh(&self) {
        tokio::join!(self.fetch_sessions(), self.fetch_stats());
    }

    // === Commands ===

    /// Stop a session, then refresh.
    pub async fn kill_session(&self, id: &str) -> Result<(), ApiError> {
        self.command("kill", id, self.inner.api.kill(id)).await
    }

    /// Restart a session, then refresh.
    pub async fn restart_session(&self, id: &str) -> Result<(), ApiError> {
        self.command("restart", id, self.inner.api.restart(id)).await
    }

    /// Relay a message to a session, then refresh.
    pub async fn send_message(&self, id: &str, text: &str) -> Result<(), ApiError> {
        self.command("message", id, self.inner.api.send_message(id, text))
            .await
    }

    async fn command(
        &self,
        name: &str,
        id: &str,
        call: impl std::future::Future<Output = Result<(), ApiError>>,
    ) -> Result<(), ApiError> {
        if let Err(err) = call.await {
            warn!(command = name, session = id, error = %err, "command failed");
            return Err(err);
        }
        debug!(command = name, session = id, "command accepted");
        self.refresh().await;
        Ok(())
    }

    /// Plain-text log export of a session.
    pub async fn export_logs(&self, id: &str) -> Result<Vec<u8>, ApiError> {
        self.inner.api.export_logs(id).await
    }

    // === Push events ===

    /// Decode and merge one push frame.
    ///
    /// Malformed payloads are dropped. Session lifecycle events also schedule
    /// a stats refresh.
    pub fn handle_frame(&self, frame: &PushFrame) {
        let event = match PushEvent::decode(frame) {
            Ok(event) => event,
            Err(FrameError::UnknownType(kind)) => {
                debug!(%kind, "ignoring push frame");
                return;
            }
            Err(err) => {
                warn!(error = %err, "dropping push frame");
                return;
            }
        };
        if self.apply_event(event) {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let store = self.clone();
                runtime.spawn(async move { store.fetch_stats().await });
            }
        }
    }

    /// Merge a typed event. Returns whether cached stats went stale.
    pub fn apply_event(&self, event: PushEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        let stale = event.invalidates_stats();
        self.update(|s| s.apply(event));
        stale
    }

    // === Focus ===

    /// Focus a session: select it, reset its log buffer and load its history.
    ///
    /// The history is dropped if focus moved elsewhere before it arrived.
    /// Entries pushed while it was loading stay after it.
    pub async fn focus(&self, id: &str) {
        let known = self.update(|s| {
            s.focus(id);
            s.selected.is_some()
        });

        let result = self.inner.api.fetch_logs(id).await;
        if !self.is_active() {
            return;
        }
        match result {
            Ok(history) => self.update(|s| {
                if s.is_focused(id) {
                    let live = std::mem::replace(&mut s.logs, history);
                    s.logs.extend(live);
                }
            }),
            Err(err) => {
                warn!(session = id, error = %err, "failed to fetch logs");
                self.update(|s| {
                    if s.is_focused(id) {
                        s.error = Some(format!("Failed to fetch logs: {err}"));
                    }
                });
            }
        }

        if !known {
            match self.inner.api.fetch_session(id).await {
                Ok(record) if self.is_active() => self.update(|s| {
                    if s.is_focused(id) && s.selected.is_none() {
                        s.selected = Some(record);
                    }
                }),
                Ok(_) => {}
                Err(err) => debug!(session = id, error = %err, "focused session not found"),
            }
        }
    }

    pub fn clear_focus(&self) {
        self.update(StoreState::clear_focus);
    }

    // === Reads ===

    /// Full copy of the current state.
    pub fn snapshot(&self) -> StoreState {
        self.read(StoreState::clone)
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.read(|s| s.sessions.clone())
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.read(|s| s.session(id).cloned())
    }

    pub fn selected(&self) -> Option<SessionRecord> {
        self.read(|s| s.selected.clone())
    }

    pub fn focused_id(&self) -> Option<String> {
        self.read(|s| s.focused.clone())
    }

    /// Last statistics reported by the backend.
    pub fn stats(&self) -> Option<SessionStats> {
        self.read(|s| s.stats.clone())
    }

    /// Statistics computed from the current collection.
    pub fn derived_stats(&self) -> SessionStats {
        self.read(|s| SessionStats::derive(&s.sessions))
    }

    pub fn error(&self) -> Option<String> {
        self.read(|s| s.error.clone())
    }

    pub fn dismiss_error(&self) {
        self.update(|s| s.error = None);
    }

    pub fn is_loading(&self) -> bool {
        self.read(|s| s.loading)
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.read(|s| s.logs.clone())
    }

    /// Buffered entries matching a case-insensitive search term.
    pub fn filtered_logs(&self, term: &str) -> Vec<LogEntry> {
        self.read(|s| s.logs.iter().filter(|l| l.matches(term)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::ApiNamespace;
    use crate::models::SessionStatus;
    use crate::test_backend::{wait_until, TestBackend};
    use serde_json::json;

    fn store(backend: &TestBackend) -> SessionStore {
        SessionStore::new(ApiClient::new(backend.http_url(), ApiNamespace::Agents).unwrap())
    }

    fn seed(backend: &TestBackend) {
        backend.set_sessions(vec![
            json!({"id": "1", "status": "running", "model": "claude"}),
            json!({"id": "2", "status": "idle", "model": "claude"}),
        ]);
        backend.set_stats(json!({"totalSessions": 2, "activeSessions": 1}));
    }

    fn frame(v: serde_json::Value) -> PushFrame {
        PushFrame::parse(&v.to_string()).unwrap()
    }

    #[tokio::test]
    async fn refresh_loads_sessions_and_stats() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        assert!(store.is_loading());

        store.refresh().await;

        assert!(!store.is_loading());
        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.stats().map(|s| s.total_sessions), Some(2));
        assert_eq!(store.derived_stats().active_sessions, 1);
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_collection() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        store.fetch_sessions().await;

        backend.fail_list(true);
        store.fetch_sessions().await;
        assert_eq!(store.sessions().len(), 2);
        let error = store.error().unwrap();
        assert!(error.contains("database unavailable"), "{error}");

        backend.fail_list(false);
        store.fetch_sessions().await;
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn stats_failure_does_not_touch_error() {
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let store = SessionStore::new(
            ApiClient::new(format!("http://{addr}"), ApiNamespace::Agents).unwrap(),
        );

        store.fetch_stats().await;
        assert!(store.error().is_none());
        assert!(store.stats().is_none());

        store.fetch_sessions().await;
        assert!(store.error().is_some());
        store.dismiss_error();
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn filter_is_applied_to_snapshots() {
        let backend = TestBackend::spawn().await;
        backend.set_sessions(vec![
            json!({"id": "1", "status": "running"}),
            json!({"id": "2", "status": "completed"}),
        ]);
        let store = store(&backend);
        store.set_filter(SessionFilter {
            status: Some("completed".into()),
            ..SessionFilter::default()
        });

        store.fetch_sessions().await;
        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "2");
    }

    #[tokio::test]
    async fn successful_command_refreshes() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);

        store.kill_session("1").await.unwrap();
        store.send_message("2", "status?").await.unwrap();

        assert_eq!(backend.commands(), vec!["1 stop", "2 message status?"]);
        assert_eq!(backend.list_calls(), 2);
        assert_eq!(store.sessions().len(), 2);
    }

    #[tokio::test]
    async fn failed_command_leaves_state_alone() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        backend.fail_control(true);
        let store = store(&backend);

        let err = store.restart_session("1").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(backend.list_calls(), 0);
        assert!(store.sessions().is_empty());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn frames_are_merged_and_trigger_stats_refresh() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        store.fetch_sessions().await;

        store.handle_frame(&frame(json!({
            "type": "agent-started",
            "data": {"id": "3", "status": "starting"}
        })));
        assert_eq!(store.sessions()[0].id, "3");
        assert!(wait_until(|| backend.stats_calls() == 1).await);

        // Malformed and unknown frames change nothing.
        store.handle_frame(&frame(json!({"type": "session-updated", "data": {"status": "idle"}})));
        store.handle_frame(&frame(json!({"type": "pong"})));
        assert_eq!(store.sessions().len(), 3);
    }

    #[tokio::test]
    async fn two_session_scenario_through_frames() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        store.fetch_sessions().await;

        store.handle_frame(&frame(json!({"type": "session-completed", "data": {"id": "1"}})));

        assert_eq!(store.session("1").map(|s| s.status), Some(SessionStatus::Completed));
        assert_eq!(store.session("2").map(|s| s.status), Some(SessionStatus::Idle));
        assert_eq!(store.derived_stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn updated_frame_with_numeric_id_completes_one_session() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        store.fetch_sessions().await;
        let untouched = store.session("2").unwrap();

        store.handle_frame(&frame(json!({
            "type": "session-updated",
            "data": {"id": 1, "status": "completed"}
        })));

        let updated = store.session("1").unwrap();
        assert_eq!(updated.id, "1");
        assert_eq!(updated.status, SessionStatus::Completed);
        assert_eq!(store.session("2"), Some(untouched));
        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.derived_stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn completion_frame_with_status_keeps_counters() {
        let backend = TestBackend::spawn().await;
        backend.set_sessions(vec![
            json!({"id": "1", "status": "running", "model": "claude", "totalTokens": 10}),
        ]);
        let store = store(&backend);
        store.fetch_sessions().await;

        store.handle_frame(&frame(json!({
            "type": "session-completed",
            "data": {"id": "1", "status": "completed"}
        })));

        let record = store.session("1").unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.total_tokens, 10);
        assert_eq!(record.model.as_deref(), Some("claude"));
    }

    #[tokio::test]
    async fn failed_history_fetch_is_reported() {
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let store = SessionStore::new(
            ApiClient::new(format!("http://{addr}"), ApiNamespace::Agents).unwrap(),
        );

        store.focus("1").await;
        let error = store.error().unwrap();
        assert!(error.starts_with("Failed to fetch logs"), "{error}");
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn focus_loads_history_then_buffers_live_entries() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        backend.set_logs("1", vec![json!({"level": "info", "message": "booted", "timestamp": 10})]);
        let store = store(&backend);
        store.fetch_sessions().await;

        store.focus("1").await;
        assert_eq!(store.selected().map(|s| s.id), Some("1".to_string()));
        store.handle_frame(&frame(json!({
            "type": "log-update",
            "data": {"agentId": "1", "log": {"level": "tool", "message": "ran tests", "timestamp": 5}}
        })));
        store.handle_frame(&frame(json!({
            "type": "log-update",
            "data": {"agentId": "2", "log": {"message": "elsewhere"}}
        })));

        let logs: Vec<_> = store.logs().iter().map(|l| l.message.as_plain()).collect();
        assert_eq!(logs, vec!["booted", "ran tests"]);
        assert_eq!(store.filtered_logs("TOOL").len(), 1);

        store.clear_focus();
        assert!(store.logs().is_empty());
        assert!(store.selected().is_none());
    }

    #[tokio::test]
    async fn focus_on_unlisted_session_fetches_it() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);

        store.focus("2").await;
        assert_eq!(store.selected().map(|s| s.status), Some(SessionStatus::Idle));
    }

    #[tokio::test]
    async fn deactivated_store_discards_late_results() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        backend.set_list_delay(Duration::from_millis(200));
        let store = store(&backend);

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_sessions().await })
        };
        assert!(wait_until(|| backend.list_calls() == 1).await);
        store.deactivate();
        pending.await.unwrap();

        assert!(store.sessions().is_empty());
        assert!(!store.apply_event(PushEvent::Started(SessionRecord::new("9", SessionStatus::Running))));
        assert!(store.sessions().is_empty());
    }

    #[tokio::test]
    async fn mutations_notify_watchers() {
        let backend = TestBackend::spawn().await;
        seed(&backend);
        let store = store(&backend);
        let mut changes = store.changes();

        store.fetch_sessions().await;
        assert!(changes.has_changed().unwrap());
        let _ = changes.borrow_and_update();

        store.clear();
        assert!(changes.has_changed().unwrap());
        assert!(store.sessions().is_empty());
    }

    #[tokio::test]
    async fn export_passes_through() {
        let backend = TestBackend::spawn().await;
        backend.set_logs("1", vec![json!({"message": "only line"})]);
        let store = store(&backend);
        assert_eq!(store.export_logs("1").await.unwrap(), b"only line\n");
    }
}
