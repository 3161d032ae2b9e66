#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod probe_run;
mod sink;

use std::path::Path;

use clap::Parser;
use probe_core::{AbortFlag, ProbeTestError};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    // Panics only; errors are rendered below.
    let _ = color_eyre::install();

    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    // Validate after the subscriber is up so config warnings are visible.
    cfg.validate()
        .map_err(|e| eyre::Report::new(ProbeTestError::Config(e.to_string())))?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run(args) => {
            let abort = AbortFlag::new();
            let handler = abort.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                tracing::warn!("abort requested; stopping before the next probe action");
                handler.trigger();
            }) {
                tracing::warn!(error = %e, "could not install Ctrl-C handler");
            }
            let report = probe_run::run_tests(&cfg, &args, cli.json, abort)?;
            if report.failed_count() > 0 {
                tracing::warn!(failed = report.failed_count(), "some units failed");
            }
            Ok(())
        }
        Commands::Plan(args) => probe_run::print_plan(&cfg, &args, cli.json),
        Commands::SelfCheck => probe_run::self_check(&cfg, cli.json),
    }
}

fn load_config(path: &Path) -> eyre::Result<probe_config::Config> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        eyre::Report::new(ProbeTestError::Config(format!(
            "read config {}: {e}",
            path.display()
        )))
    })?;
    probe_config::load_toml(&text).map_err(|e| {
        eyre::Report::new(ProbeTestError::Config(format!(
            "parse config {}: {e}",
            path.display()
        )))
    })
}

/// Console logs go to stderr (stdout carries results). With `logging.file`
/// set, JSON lines are also appended there through a non-blocking writer.
fn init_tracing(
    json: bool,
    level: Option<&str>,
    logging: &probe_config::Logging,
) -> eyre::Result<()> {
    let level = level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            eyre::Report::new(ProbeTestError::Config(format!("log level {level:?}: {e}")))
        })?,
    };

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().ok_or_else(|| {
                eyre::Report::new(ProbeTestError::Config(format!(
                    "logging.file {} has no file name",
                    path.display()
                )))
            })?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}
