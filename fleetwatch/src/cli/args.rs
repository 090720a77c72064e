//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::{SessionFilter, SortOrder};

/// Fleetwatch - watch and steer a fleet of agent sessions
#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Session filter flags shared by `watch` and `list`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only sessions with this status (running, idle, completed, ...)
    #[arg(long)]
    pub status: Option<String>,

    /// Only sessions using this model
    #[arg(long)]
    pub model: Option<String>,

    /// Only sessions of this kind
    #[arg(long)]
    pub kind: Option<String>,

    /// Field to sort by (startTime, lastActivity, totalTokens, ...)
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort direction
    #[arg(long, value_name = "asc|desc")]
    pub order: Option<SortOrder>,
}

impl From<FilterArgs> for SessionFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            status: args.status,
            model: args.model,
            kind: args.kind,
            sort_by: args.sort_by,
            sort_order: args.order,
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Live view of the fleet until Ctrl-C
    Watch {
        #[command(flatten)]
        filter: FilterArgs,

        /// Follow the logs of this session
        #[arg(long)]
        focus: Option<String>,
    },

    /// Print the current session list
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show backend statistics next to locally derived ones
    Stats,

    /// Show one session in detail
    Show {
        /// Session ID
        id: String,
    },

    /// Print the logs of a session
    Logs {
        /// Session ID
        id: String,

        /// Only entries containing this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Stop a session
    Kill {
        /// Session ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Restart a session
    Restart {
        /// Session ID
        id: String,
    },

    /// Send a message to a session
    Send {
        /// Session ID
        id: String,

        /// Message text
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Download the log export of a session
    Export {
        /// Session ID
        id: String,

        /// Output file (default: agent-<ID>-logs.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_become_session_filter() {
        let cli = Cli::try_parse_from([
            "fleetwatch", "list", "--status", "running", "--sort-by", "lastActivity", "--order", "asc",
        ])
        .unwrap();
        let Commands::List { filter } = cli.command else {
            panic!("expected list");
        };
        let filter = SessionFilter::from(filter);
        assert_eq!(filter.status.as_deref(), Some("running"));
        assert_eq!(filter.sort_by.as_deref(), Some("lastActivity"));
        assert_eq!(filter.sort_order, Some(SortOrder::Asc));
        assert!(filter.model.is_none());
    }

    #[test]
    fn bad_sort_order_is_rejected() {
        assert!(Cli::try_parse_from(["fleetwatch", "list", "--order", "sideways"]).is_err());
    }

    #[test]
    fn send_joins_trailing_words() {
        let cli = Cli::try_parse_from(["fleetwatch", "send", "a1", "please", "stop", "now"]).unwrap();
        match cli.command {
            Commands::Send { id, message } => {
                assert_eq!(id, "a1");
                assert_eq!(message.join(" "), "please stop now");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_requires_a_message() {
        assert!(Cli::try_parse_from(["fleetwatch", "send", "a1"]).is_err());
    }

    #[test]
    fn kill_confirmation_flag() {
        let cli = Cli::try_parse_from(["fleetwatch", "kill", "a1", "-y"]).unwrap();
        assert!(matches!(cli.command, Commands::Kill { yes: true, .. }));
    }
}
