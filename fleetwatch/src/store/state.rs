//! Plain store state and the merge rules applied to it.
//!
//! Everything here is synchronous. [`super::SessionStore`] wraps it in a mutex
//! and feeds it REST results and push events.

use crate::models::{LogEntry, SessionFilter, SessionRecord, SessionStats};
use crate::push::{CompletedPayload, PushEvent};

/// Snapshot of everything the store holds.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// Session collection, one record per id.
    pub sessions: Vec<SessionRecord>,
    /// Last statistics reported by the backend.
    pub stats: Option<SessionStats>,
    /// Id of the focused session.
    pub focused: Option<String>,
    /// Latest known record of the focused session.
    pub selected: Option<SessionRecord>,
    /// Log buffer of the focused session, in arrival order.
    pub logs: Vec<LogEntry>,
    /// Waiting for the first snapshot.
    pub loading: bool,
    /// Last fetch failure, shown until dismissed or the next successful fetch.
    pub error: Option<String>,
    /// Criteria used by snapshot fetches.
    pub filter: SessionFilter,
}

impl StoreState {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }

    pub fn session(&self, id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut SessionRecord> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn is_focused(&self, id: &str) -> bool {
        self.focused.as_deref() == Some(id)
    }

    /// Replace the whole collection with a snapshot.
    pub fn replace_sessions(&mut self, sessions: Vec<SessionRecord>) {
        self.sessions = sessions;
        self.error = None;
        self.loading = false;
        self.sync_selection();
    }

    /// Point `selected` at the collection's copy of the focused session.
    fn sync_selection(&mut self) {
        let Some(id) = self.focused.as_deref() else {
            return;
        };
        if let Some(record) = self.session(id) {
            self.selected = Some(record.clone());
        }
    }

    fn select_if_focused(&mut self, record: &SessionRecord) {
        if self.is_focused(&record.id) {
            self.selected = Some(record.clone());
        }
    }

    /// Replace a held record. Records the collection does not hold are
    /// dropped, selection included.
    fn replace_existing(&mut self, record: SessionRecord) {
        let Some(i) = self.position(&record.id) else {
            return;
        };
        self.select_if_focused(&record);
        self.sessions[i] = record;
    }

    /// Start tracking a session: clear its buffer and select it.
    pub fn focus(&mut self, id: &str) {
        self.focused = Some(id.to_string());
        self.selected = self.session(id).cloned();
        self.logs.clear();
    }

    pub fn clear_focus(&mut self) {
        self.focused = None;
        self.selected = None;
        self.logs.clear();
    }

    /// Merge one push event.
    pub fn apply(&mut self, event: PushEvent) {
        match event {
            PushEvent::Started(record) => {
                self.select_if_focused(&record);
                match self.position(&record.id) {
                    Some(i) => self.sessions[i] = record,
                    None => self.sessions.insert(0, record),
                }
            }
            PushEvent::Updated(record)
            | PushEvent::Completed(CompletedPayload::Record(record)) => {
                self.replace_existing(record);
            }
            PushEvent::Completed(CompletedPayload::StatusOnly { id, status }) => {
                if let Some(slot) = self.session_mut(&id) {
                    slot.status = status;
                }
                if let Some(selected) = self.selected.as_mut().filter(|s| s.id == id) {
                    selected.status = status;
                }
            }
            PushEvent::LogAppended { session_id, entry } => {
                if self.is_focused(&session_id) {
                    self.logs.push(entry);
                }
            }
            PushEvent::LogsCleared { session_id } => {
                if self.is_focused(&session_id) {
                    self.logs.clear();
                }
            }
            PushEvent::StatsUpdated(stats) => self.stats = Some(stats),
        }
    }
}
