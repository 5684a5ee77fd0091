// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag that has an environment variable can be set either way; the
//! flag wins. Values given here override the settings file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Overrides;
use crate::types::WatchBackend;

/// Command-line arguments for `rulereload`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rulereload",
    version,
    about = "Validate changed rule files and signal the security agent to reload them.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory holding the agent's configuration and rule files.
    #[arg(long, env = "FALCO_ROOTDIR", value_name = "DIR")]
    pub root_dir: Option<PathBuf>,

    /// Optional settings file (TOML).
    #[arg(long, env = "RULERELOAD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Change detection backend: `poll` or `events`.
    #[arg(long, env = "RULERELOAD_BACKEND", value_name = "BACKEND")]
    pub backend: Option<WatchBackend>,

    /// Polling period, e.g. `10s` or `500ms`.
    #[arg(long, env = "RULERELOAD_INTERVAL", value_name = "DURATION")]
    pub interval: Option<String>,

    /// Executable name of the agent to signal.
    #[arg(long, env = "RULERELOAD_PROCESS", value_name = "NAME")]
    pub process_name: Option<String>,

    /// Skip rule validation and signal on every change.
    #[arg(long)]
    pub no_validate: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RULERELOAD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve settings and print the tracked files, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root_dir: self.root_dir.clone(),
            backend: self.backend,
            poll_interval: self.interval.clone(),
            process_name: self.process_name.clone(),
            no_validate: self.no_validate,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
