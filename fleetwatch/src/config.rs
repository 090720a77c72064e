//! Runtime configuration from the environment.
//!
//! | Variable                    | Default                 |
//! |-----------------------------|-------------------------|
//! | `FLEETWATCH_API_URL`        | `http://localhost:3001` |
//! | `FLEETWATCH_WS_URL`         | `ws://localhost:3001`   |
//! | `FLEETWATCH_API_NAMESPACE`  | `agents`                |
//! | `FLEETWATCH_POLL_SECS`      | `10`                    |
//! | `FLEETWATCH_RECONNECT_SECS` | `3`                     |
//! | `FLEETWATCH_PING_SECS`      | `30`                    |

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::ApiNamespace;
use crate::push::{ConnectionSettings, DEFAULT_PING_INTERVAL, DEFAULT_RECONNECT_DELAY};

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_WS_URL: &str = "ws://localhost:3001";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Connection and timing settings for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub namespace: ApiNamespace,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            namespace: ApiNamespace::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys keep their defaults;
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            api_url: get("FLEETWATCH_API_URL").unwrap_or(defaults.api_url),
            ws_url: get("FLEETWATCH_WS_URL").unwrap_or(defaults.ws_url),
            namespace: parsed(get("FLEETWATCH_API_NAMESPACE"), "FLEETWATCH_API_NAMESPACE")
                .unwrap_or(defaults.namespace),
            poll_interval: seconds(get("FLEETWATCH_POLL_SECS"), "FLEETWATCH_POLL_SECS")
                .unwrap_or(defaults.poll_interval),
            reconnect_delay: seconds(get("FLEETWATCH_RECONNECT_SECS"), "FLEETWATCH_RECONNECT_SECS")
                .unwrap_or(defaults.reconnect_delay),
            ping_interval: seconds(get("FLEETWATCH_PING_SECS"), "FLEETWATCH_PING_SECS")
                .unwrap_or(defaults.ping_interval),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            url: self.ws_url.clone(),
            reconnect_delay: self.reconnect_delay,
            ping_interval: self.ping_interval,
        }
    }
}

fn parsed<T>(value: Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring invalid setting");
            None
        }
    }
}

/// Whole seconds, at least one.
fn seconds(value: Option<String>, key: &str) -> Option<Duration> {
    let secs: u64 = parsed(value, key)?;
    if secs == 0 {
        warn!(key, "interval must be at least one second, using default");
        return None;
    }
    Some(Duration::from_secs(secs))
}
