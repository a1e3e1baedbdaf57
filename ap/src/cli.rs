//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Autopilot - clinic command bar
#[derive(Parser)]
#[command(
    name = "ap",
    about = "Turn clinic commands into reversible plans",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive command bar (default)
    Repl {
        /// Session id
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Dispatch a single command and print the outcome
    Dispatch {
        /// Command text, e.g. "reschedule Sarah to Thu 2:30pm and notify"
        text: String,

        /// Session id
        #[arg(short, long)]
        session: Option<String>,

        /// Run the plan if one was created
        #[arg(long)]
        run: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Output format for one-shot commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
