//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "refill", version, about = "Water refill station controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/refill.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve tags and buttons until Ctrl-C, panic input, or end of tag input
    Run {
        /// Drive the station from a script instead of stdin
        #[arg(
            long,
            value_name = "FILE",
            long_help = "Drive the station from a script instead of stdin.\n\nOne command per line:\n  tag <uid> [content]   present a tag\n  press <channel>       button down\n  release <channel>     button up\n  panic                 trip the panic input\n  wait <ms>             pause the script\nBlank lines and lines starting with '#' are ignored."
        )]
        script: Option<PathBuf>,
        /// Keep serving buttons after the tag input ends
        #[arg(long, action = ArgAction::SetTrue)]
        keep_running: bool,
    },
    /// Load the config, open every output and verify it reads OFF
    SelfCheck,
    /// Decode a tag memory dump (hex) to its text record
    Decode {
        /// Raw block bytes as hex; ':' and whitespace separators allowed
        #[arg(value_name = "HEX")]
        hex: String,
    },
}

impl Commands {
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Decode { .. })
    }
}
