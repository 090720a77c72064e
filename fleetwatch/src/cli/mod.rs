//! Command-line front end.

mod args;
mod commands;
mod render;

pub use args::Cli;
pub use commands::execute;
