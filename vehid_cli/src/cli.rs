//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "vehid",
    version,
    about = "Identify a vehicle from bus traffic and drive its brand interface"
)]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fingerprint table TOML replacing the built-in signatures
    #[arg(long, value_name = "FILE")]
    pub fingerprints: Option<PathBuf>,

    /// Log and print results as JSON lines instead of pretty text
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
    /// Identify the vehicle from a recorded bus log
    Identify {
        /// Bus log CSV (strict header: t_ms,channel,id,data)
        #[arg(long, value_name = "FILE")]
        log: PathBuf,
        /// Fail instead of falling back when several vehicles match
        #[arg(long, action = ArgAction::SetTrue)]
        strict: bool,
    },
    /// Identify from a bus log, then replay the rest of it through the session
    Drive {
        /// Bus log CSV (strict header: t_ms,channel,id,data)
        #[arg(long, value_name = "FILE")]
        log: PathBuf,
        /// Engage after this many cycles
        #[arg(long, value_name = "CYCLES", default_value_t = 10)]
        engage_after: u64,
        /// Normalized steering request sent while engaged, in [-1, 1]
        #[arg(long, value_name = "REQ", default_value_t = 0.0, allow_hyphen_values = true)]
        steer: f32,
        /// Acceleration request sent while engaged (m/s^2)
        #[arg(long, value_name = "MPS2", default_value_t = 0.0, allow_hyphen_values = true)]
        accel: f32,
    },
    /// List every vehicle the catalog knows about
    List,
    /// Build a session for every registered vehicle and run the cycle checks
    SelfCheck,
}
