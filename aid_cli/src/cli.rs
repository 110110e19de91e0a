//! CLI argument definitions and shared statics.

use chrono::NaiveDateTime;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective cycle settings for the current run (for JSON error details).
pub static LAST_CYCLE: OnceLock<CliCycle> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliCycle {
    pub now: NaiveDateTime,
    pub dia_h: f64,
    pub step_min: u32,
    pub trend_window_min: u32,
}

#[derive(Parser, Debug)]
#[command(name = "aid", version, about = "Insulin delivery decision CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/aid_config.toml")]
    pub config: PathBuf,

    /// Directory with basal.csv, isf.csv, csf.csv and targets.csv; replaces
    /// the schedules in the config file
    #[arg(long = "schedule-dir", value_name = "DIR")]
    pub schedule_dir: Option<PathBuf>,

    /// Print results and errors as JSON instead of text
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
    /// Run one control cycle and print the recommended pump action
    Recommend {
        /// Cycle input JSON (treatment records, BG readings, carbs)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Cycle time, e.g. 2024-03-01T12:00:00 (takes precedence over the input file)
        #[arg(long, value_name = "TIME")]
        now: Option<NaiveDateTime>,
        /// Append the IOB snapshot to this JSONL file
        #[arg(long = "iob-log", value_name = "FILE")]
        iob_log: Option<PathBuf>,
    },
    /// Print current IOB and its decay over the next DIA
    Iob {
        /// Cycle input JSON; only treatment records are used
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Cycle time (takes precedence over the input file)
        #[arg(long, value_name = "TIME")]
        now: Option<NaiveDateTime>,
    },
    /// List IOB snapshots recorded with --iob-log
    Snapshots {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Validate the config and schedules, then exit
    CheckConfig,
}
