//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "probe_accuracy", version, about = "Probe accuracy test suite")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/probe_accuracy.toml")]
    pub config: PathBuf,

    /// Emit JSON lines (logs, results and errors) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to
    /// `logging.level` in the config, then `info`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the selected tests against the probe
    Run(TestArgs),
    /// Print the resolved test plan without probing
    Plan(TestArgs),
    /// Quick health check: config, plan and one probe sample
    SelfCheck,
}

/// Test selection and overrides. Selecting any test here replaces the
/// config's selection; with nothing selected anywhere, corner, repeatability
/// and drift run with default sizes.
#[derive(Args, Debug, Default, Clone)]
pub struct TestArgs {
    /// Corner test; optional samples per corner
    #[arg(
        short = 'c',
        long,
        value_name = "SAMPLES",
        num_args = 0..=1,
        default_missing_value = "30"
    )]
    pub corner: Option<usize>,

    /// Repeatability test; optional number of units
    #[arg(
        short = 'r',
        long,
        value_name = "UNITS",
        num_args = 0..=1,
        default_missing_value = "20"
    )]
    pub repeat: Option<usize>,

    /// Samples per repeatability unit
    #[arg(long, value_name = "N")]
    pub repeat_samples: Option<usize>,

    /// Drift test; optional number of samples
    #[arg(
        short = 'd',
        long,
        value_name = "SAMPLES",
        num_args = 0..=1,
        default_missing_value = "100"
    )]
    pub drift: Option<usize>,

    /// Speed sweep over a list of probe speeds (mm/s), e.g. `2,5,10`
    #[arg(long, value_name = "SPEEDS", value_delimiter = ',', conflicts_with = "speed_range")]
    pub speedtest: Option<Vec<f64>>,

    /// Speed sweep over `START,STOP,STEP` (mm/s); STOP is always included
    #[arg(long, value_name = "START,STOP,STEP", value_delimiter = ',')]
    pub speed_range: Option<Vec<f64>>,

    /// Samples per speed-sweep unit
    #[arg(long, value_name = "N")]
    pub speedtest_samples: Option<usize>,

    /// Dock the probe before every unit
    #[arg(long, action = ArgAction::SetTrue)]
    pub force_dock: bool,

    /// Keep the first reading of each unit
    #[arg(long, action = ArgAction::SetTrue)]
    pub keep_first: bool,

    /// Probe speed for all non-sweep units (mm/s)
    #[arg(short = 's', long, value_name = "MM_S")]
    pub speed: Option<f64>,

    /// Sample retract distance (mm)
    #[arg(long, value_name = "MM")]
    pub retract: Option<f64>,

    /// Outside-band threshold around the median (mm)
    #[arg(long, value_name = "MM")]
    pub band_mm: Option<f64>,

    /// Export samples and summaries as CSV
    #[arg(long, action = ArgAction::SetTrue)]
    pub export_csv: bool,

    /// Output folder for CSV exports
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl TestArgs {
    pub fn selects_tests(&self) -> bool {
        self.corner.is_some()
            || self.repeat.is_some()
            || self.drift.is_some()
            || self.speedtest.is_some()
            || self.speed_range.is_some()
    }
}
