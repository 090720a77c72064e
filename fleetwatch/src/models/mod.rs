//! Data models mirrored from the backend.

mod filter;
mod log;
mod session;
mod stats;
mod timestamp;

pub use filter::{SessionFilter, SortOrder};
pub use log::{LogEntry, LogEntryError, LogLevel, LogMessage};
pub use session::{RecordError, SessionRecord, SessionStatus};
pub use stats::{SessionStats, UsageBucket};
pub use timestamp::{now_millis, parse_millis, to_datetime};
