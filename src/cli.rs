//! CLI definitions for Keystone.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Keystone CLI.
#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "Lifecycle supervisor for long-running services")]
#[command(version)]
pub(crate) struct Cli {
    /// Directory for daily-rotated log files (console only when unset)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the demo kernels until a shutdown signal (default)
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Env file layered under the process environment
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Fail at bootstrap if the env file is missing
    #[arg(long)]
    pub require_env_file: bool,

    /// Heartbeat interval in seconds
    #[arg(long, default_value_t = 5)]
    pub heartbeat: u64,

    /// Clock interval in seconds
    #[arg(long, default_value_t = 60)]
    pub clock: u64,

    /// Report a fatal error after this many seconds
    #[arg(long)]
    pub fail_after: Option<u64>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            env_file: None,
            require_env_file: false,
            heartbeat: 5,
            clock: 60,
            fail_after: None,
        }
    }
}
