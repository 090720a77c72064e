//! Text formatting for terminal output.

use chrono::Local;

use crate::models::{to_datetime, SessionRecord};

/// Cost per token used when the backend reports no cost.
pub const ESTIMATED_COST_PER_TOKEN: f64 = 0.00002;

const NAME_WIDTH: usize = 20;

/// `950`, `1.2K`, `3.4M`.
#[allow(clippy::cast_precision_loss)]
pub fn compact(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// `1,234,567`.
pub fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `2h 5m`, `3m 12s`, `45s`.
pub fn duration(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

/// Run time of a session, measured to `now_ms` while it is still open.
pub fn elapsed(session: &SessionRecord, now_ms: i64) -> String {
    session
        .elapsed_ms(now_ms)
        .and_then(|ms| u64::try_from(ms).ok())
        .map_or_else(|| "-".to_string(), duration)
}

/// `12s ago`, `5m ago`, `3h ago`, `2d ago`.
pub fn relative(timestamp: Option<i64>, now_ms: i64) -> String {
    let Some(ts) = timestamp else {
        return "unknown".to_string();
    };
    let seconds = (now_ms.saturating_sub(ts) / 1000).max(0);
    match seconds {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// Local wall-clock time, `HH:MM:SS`.
pub fn clock(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(to_datetime)
        .map_or_else(
            || "--:--:--".to_string(),
            |t| t.with_timezone(&Local).format("%H:%M:%S").to_string(),
        )
}

/// Local date and time, `YYYY-MM-DD HH:MM:SS`.
pub fn datetime(timestamp: Option<i64>) -> String {
    timestamp.and_then(to_datetime).map_or_else(
        || "unknown".to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Short label from a colon-separated session key.
///
/// `agent:main:discord:channel:42` becomes `discord:channel:42`; anything
/// is cut to twenty characters.
pub fn session_name(key: &str) -> String {
    if key.is_empty() {
        return "Unknown Session".to_string();
    }
    let parts: Vec<&str> = key.split(':').collect();
    let name = if parts.len() > 2 {
        parts[2..].join(":")
    } else {
        key.to_string()
    };
    name.chars().take(NAME_WIDTH).collect()
}

/// Reported cost, or a per-token estimate when the backend sends none.
#[allow(clippy::cast_precision_loss)]
pub fn cost_of(session: &SessionRecord) -> f64 {
    if session.total_cost > 0.0 {
        session.total_cost
    } else {
        session.total_tokens as f64 * ESTIMATED_COST_PER_TOKEN
    }
}

/// Estimate for a token count.
#[allow(clippy::cast_precision_loss)]
pub fn estimated_cost(tokens: u64) -> f64 {
    tokens as f64 * ESTIMATED_COST_PER_TOKEN
}

pub fn money(cost: f64) -> String {
    format!("${cost:.4}")
}

/// `[######----] 60%`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn progress_bar(percent: f64, width: usize) -> String {
    let pct = percent.clamp(0.0, 100.0);
    let filled = ((pct / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}] {pct:.0}%",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    )
}

/// Cut to `width` characters, marking the cut with `…`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
