//! Plain-text rendering of store contents.
//!
//! Every function returns a `String` so output can be checked in tests.

use std::fmt::Write as _;

use crate::format;
use crate::models::{LogEntry, SessionRecord, SessionStats, SessionStatus};
use crate::push::ConnectionState;
use crate::store::StoreState;

const RULE_WIDTH: usize = 96;

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

const fn status_marker(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Starting => "◌",
        SessionStatus::Running => "●",
        SessionStatus::Idle => "○",
        SessionStatus::Completed => "✓",
        SessionStatus::Error => "✗",
    }
}

/// One-line summary: connection, active count, tokens, cost.
pub fn header(stats: &SessionStats, connection: ConnectionState) -> String {
    let cost = if stats.total_cost > 0.0 {
        stats.total_cost
    } else {
        format::estimated_cost(stats.total_tokens)
    };
    let marker = match connection {
        ConnectionState::Connected => "● live",
        ConnectionState::Connecting => "◌ connecting",
        ConnectionState::Disconnected => "○ offline",
    };
    format!(
        "{marker} | {} active / {} total | {} tokens | {}",
        stats.active_sessions,
        stats.total_sessions,
        format::compact(stats.total_tokens),
        format::money(cost)
    )
}

/// Session table.
pub fn session_table(sessions: &[SessionRecord], now_ms: i64) -> String {
    if sessions.is_empty() {
        return "No sessions found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:<22} {:<12} {:<18} {:>8} {:>10} {:<10}",
        "ID", "NAME", "STATUS", "MODEL", "TOKENS", "COST", "ACTIVITY"
    );
    let _ = writeln!(out, "{}", rule());
    for s in sessions {
        let name = s.name.as_deref().map_or_else(|| s.id.clone(), format::session_name);
        let activity = s.last_activity.or(s.start_time);
        let _ = writeln!(
            out,
            "{:<14} {:<22} {} {:<10} {:<18} {:>8} {:>10} {:<10}",
            format::truncate(&s.id, 14),
            format::truncate(&name, 22),
            status_marker(s.status),
            s.status.as_str(),
            format::truncate(s.model.as_deref().unwrap_or("-"), 18),
            format::compact(s.total_tokens),
            format::money(format::cost_of(s)),
            format::relative(activity, now_ms),
        );
    }
    out
}

/// Detailed view of one session.
pub fn session_detail(s: &SessionRecord, now_ms: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", status_marker(s.status), s.display_name());
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "ID:        {}", s.id);
    let _ = writeln!(out, "Status:    {}", s.status);
    let _ = writeln!(out, "Model:     {}", s.model.as_deref().unwrap_or("-"));
    if let Some(ref kind) = s.kind {
        let _ = writeln!(out, "Kind:      {kind}");
    }
    let _ = writeln!(out, "Started:   {}", format::datetime(s.start_time));
    if s.end_time.is_some() {
        let _ = writeln!(out, "Ended:     {}", format::datetime(s.end_time));
    }
    let _ = writeln!(out, "Elapsed:   {}", format::elapsed(s, now_ms));
    if let Some(pct) = s.progress_percent() {
        let _ = writeln!(out, "Progress:  {}", format::progress_bar(pct, 20));
    }
    let _ = writeln!(
        out,
        "Tokens:    {} in / {} out / {} total",
        format::grouped(s.input_tokens),
        format::grouped(s.output_tokens),
        format::grouped(s.total_tokens)
    );
    if let Some(pct) = s.context_usage_percent() {
        let _ = writeln!(
            out,
            "Context:   {pct:.1}% of {}",
            format::grouped(s.context_tokens)
        );
    }
    let _ = writeln!(out, "Cost:      {}", format::money(format::cost_of(s)));
    out
}

fn stats_column(out: &mut String, title: &str, stats: &SessionStats) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "  sessions:      {}", stats.total_sessions);
    let _ = writeln!(out, "  active:        {}", stats.active_sessions);
    let _ = writeln!(out, "  idle:          {}", stats.idle_sessions);
    let _ = writeln!(out, "  completed:     {}", stats.completed_sessions);
    let _ = writeln!(out, "  errors:        {}", stats.error_sessions);
    let _ = writeln!(out, "  tokens:        {}", format::grouped(stats.total_tokens));
    let _ = writeln!(out, "  cost:          {}", format::money(stats.total_cost));
    let _ = writeln!(
        out,
        "  avg duration:  {}",
        format::duration(stats.avg_session_duration)
    );
    if !stats.models.is_empty() {
        let _ = writeln!(out, "  models:        {}", stats.models.join(", "));
    }
}

/// Backend statistics (when available) followed by derived ones.
pub fn stats_report(backend: Option<&SessionStats>, derived: &SessionStats) -> String {
    let mut out = String::new();
    match backend {
        Some(stats) => {
            stats_column(&mut out, "Backend", stats);
            if !stats.daily_usage.is_empty() {
                let _ = writeln!(out, "  daily usage:");
                for bucket in &stats.daily_usage {
                    let total = if bucket.total_tokens > 0 {
                        bucket.total_tokens
                    } else {
                        bucket.tokens_in + bucket.tokens_out
                    };
                    let _ = writeln!(out, "    {:<12} {:>8}", bucket.label, format::compact(total));
                }
            }
        }
        None => {
            let _ = writeln!(out, "Backend\n  (unavailable)");
        }
    }
    let _ = writeln!(out);
    stats_column(&mut out, "Local", derived);
    out
}

/// Log lines, oldest first.
pub fn log_lines(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "No logs.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = write!(
            out,
            "[{}] {:<7} {}",
            format::clock(entry.timestamp),
            entry.level.as_str().to_uppercase(),
            entry.display_message()
        );
        if let Some(ref source) = entry.source {
            let _ = write!(out, " ({source})");
        }
        out.push('\n');
    }
    out
}

/// Full `watch` screen.
pub fn watch_screen(state: &StoreState, connection: ConnectionState, now_ms: i64) -> String {
    let mut out = String::new();
    let derived = SessionStats::derive(&state.sessions);
    let _ = writeln!(out, "{}", header(&derived, connection));
    if let Some(ref error) = state.error {
        let _ = writeln!(out, "! {error}");
    }
    out.push('\n');
    if state.loading {
        out.push_str("Loading sessions...\n");
    } else {
        out.push_str(&session_table(&state.sessions, now_ms));
    }

    if let Some(ref id) = state.focused {
        out.push('\n');
        match state.selected {
            Some(ref s) => out.push_str(&session_detail(s, now_ms)),
            None => {
                let _ = writeln!(out, "Session {id} (not found)");
            }
        }
        out.push('\n');
        let tail = state.logs.len().saturating_sub(20);
        out.push_str(&log_lines(&state.logs[tail..]));
    }
    out
}
