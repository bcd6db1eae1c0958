//! Command-line argument parsing.
//!
//! Usage:
//!   lingo [-c <config>] [-e <command>]... [-q] [-d] [<script>...]
//!
//! Scripts named on the command line load after those listed in the config
//! file.  Each `-e` line runs once everything is loaded; with at least one
//! `-e` the host exits afterwards instead of reading stdin.

use std::path::PathBuf;

use clap::Parser;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "lingo", version, about = "Natural-language scripting engine")]
pub struct CliArgs {
    /// Config file (default: the platform config directory's lingo.toml).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run a command line such as "/greet bob" after loading, then exit.
    #[arg(short = 'e', long = "exec", value_name = "COMMAND")]
    pub exec: Vec<String>,

    /// Only print script output; no banner or load summary.
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging (overrides the configured filter unless RUST_LOG is set).
    #[arg(short, long)]
    pub debug: bool,

    /// Script files or directories to load.
    #[arg(value_name = "SCRIPT")]
    pub scripts: Vec<PathBuf>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`, exiting with usage on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Parse a full argv (program name first) or return clap's error.
pub fn parse_argv<I, T>(argv: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    CliArgs::try_parse_from(argv)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
