//! CLI command execution.
//!
//! Every command goes through a [`SessionStore`]; `watch` mounts a full
//! [`Monitor`] and re-renders on each store change.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::{now_millis, SessionFilter};
use crate::monitor::Monitor;
use crate::store::SessionStore;

use super::args::{Cli, Commands};
use super::render;

/// Clear screen and move the cursor home.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

// === Command Execution ===

pub async fn execute(cli: Cli, config: Config) -> Result<()> {
    debug!(?config, "configuration");
    match cli.command {
        Commands::Watch { filter, focus } => watch(&config, filter.into(), focus).await,
        Commands::List { filter } => list(&config, filter.into()).await,
        Commands::Stats => stats(&config).await,
        Commands::Show { id } => show(&config, &id).await,
        Commands::Logs { id, search } => logs(&config, &id, search.as_deref()).await,
        Commands::Kill { id, yes } => {
            if !yes && !confirm(&format!("Stop session {id}?"))? {
                println!("Cancelled.");
                return Ok(());
            }
            let store = open_store(&config)?;
            store
                .kill_session(&id)
                .await
                .with_context(|| format!("Failed to stop session {id}"))?;
            println!("Stopped {id}.");
            Ok(())
        }
        Commands::Restart { id } => {
            let store = open_store(&config)?;
            store
                .restart_session(&id)
                .await
                .with_context(|| format!("Failed to restart session {id}"))?;
            println!("Restarted {id}.");
            Ok(())
        }
        Commands::Send { id, message } => {
            let message = message.join(" ");
            if message.trim().is_empty() {
                bail!("Message is required for send command");
            }
            let store = open_store(&config)?;
            store
                .send_message(&id, &message)
                .await
                .with_context(|| format!("Failed to send message to {id}"))?;
            println!("Sent to {id}.");
            Ok(())
        }
        Commands::Export { id, output } => {
            let store = open_store(&config)?;
            let path = output.unwrap_or_else(|| default_export_path(&id));
            let written = export_to(&store, &id, &path).await?;
            println!("Wrote {written} bytes to {}", path.display());
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<SessionStore> {
    let api = ApiClient::new(config.api_url.as_str(), config.namespace)
        .context("Failed to build HTTP client")?;
    Ok(SessionStore::new(api))
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` is a no.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn default_export_path(id: &str) -> PathBuf {
    PathBuf::from(format!("agent-{id}-logs.txt"))
}

/// Download a session's log export into `path`. Returns the bytes written.
pub async fn export_to(store: &SessionStore, id: &str, path: &Path) -> Result<usize> {
    let bytes = store
        .export_logs(id)
        .await
        .with_context(|| format!("Failed to export logs for {id}"))?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(bytes.len())
}

async fn list(config: &Config, filter: SessionFilter) -> Result<()> {
    let store = open_store(config)?;
    store.set_filter(filter);
    store.fetch_sessions().await;
    if let Some(error) = store.error() {
        bail!(error);
    }
    print!("{}", render::session_table(&store.sessions(), now_millis()));
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    store.refresh().await;
    if let Some(error) = store.error() {
        eprintln!("Warning: {error}");
    }
    print!(
        "{}",
        render::stats_report(store.stats().as_ref(), &store.derived_stats())
    );
    Ok(())
}

async fn show(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let session = store
        .api()
        .fetch_session(id)
        .await
        .with_context(|| format!("Failed to load session {id}"))?;
    print!("{}", render::session_detail(&session, now_millis()));
    Ok(())
}

async fn logs(config: &Config, id: &str, search: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    store.focus(id).await;
    if let Some(error) = store.error() {
        bail!(error);
    }
    let entries = match search {
        Some(term) => store.filtered_logs(term),
        None => store.logs(),
    };
    print!("{}", render::log_lines(&entries));
    Ok(())
}

async fn watch(config: &Config, filter: SessionFilter, focus: Option<String>) -> Result<()> {
    let mut monitor = Monitor::mount(config, filter)
        .await
        .context("Failed to start monitor")?;
    if let Some(ref id) = focus {
        monitor.store().focus(id).await;
    }

    let mut changes = monitor.store().changes();
    let mut connection = monitor.watch_connection();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let screen = render::watch_screen(
            &monitor.store().snapshot(),
            *connection.borrow_and_update(),
            now_millis(),
        );
        print!("{CLEAR_SCREEN}{screen}");
        let _ = std::io::stdout().flush();

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    monitor.shutdown();
    println!();
    Ok(())
}
