//! Fleetwatch - live monitor and control client for a fleet of agent sessions.
//!
//! The backend owns every session; this crate keeps a local mirror of it in
//! sync and relays operator commands.
//!
//! Architecture:
//! - `push` keeps one WebSocket open and fans frames out to subscribers
//! - `api` talks to the REST endpoints
//! - `store` merges REST snapshots and push events into one collection
//! - `monitor` wires the three together and runs the fallback poll
//! - `cli` renders the store as text

pub mod api;
pub mod cli;
pub mod config;
pub mod format;
pub mod models;
pub mod monitor;
pub mod push;
pub mod store;

#[cfg(test)]
mod test_backend;

pub use config::Config;
pub use monitor::Monitor;
pub use store::SessionStore;
