//! Report sinks for the terminal and for CSV export.

use std::fs::File;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use probe_core::{FailedUnit, PlanUnit, ReportSink, SessionReport, TestKind, UnitReport};
use serde_json::json;

/// File name suffixes of the two CSV exports.
pub const SAMPLES_CSV_SUFFIX: &str = "_probe_accuracy_test.csv";
pub const SUMMARY_CSV_SUFFIX: &str = "_probe_accuracy_test_summary.csv";

fn opt(v: Option<f64>) -> String {
    v.map_or_else(String::new, |x| format!("{x:.6}"))
}

pub fn unit_json(unit: &PlanUnit) -> serde_json::Value {
    json!({
        "id": unit.id,
        "kind": unit.kind.name(),
        "position": unit.position.id.to_string(),
        "x": unit.position.x,
        "y": unit.position.y,
        "samples": unit.samples,
        "speed": unit.overrides.speed,
        "retract": unit.overrides.retract,
        "label": unit.label,
    })
}

/// Prints results as they arrive: text lines, or JSON lines with `--json`.
pub struct ConsoleSink {
    json: bool,
    planned: usize,
}

impl ConsoleSink {
    pub fn new(json: bool, planned: usize) -> Self {
        Self { json, planned }
    }

    fn print_summary(report: &SessionReport) {
        for kind in TestKind::ALL {
            let mut rows = report.completed_of(kind).peekable();
            if rows.peek().is_none() {
                continue;
            }
            println!();
            println!("== {kind} ==");
            println!(
                "{:<34} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>4}",
                "unit", "min", "max", "mean", "std", "median", "range", "out"
            );
            for r in rows {
                let s = &r.stats;
                println!(
                    "{:<34} {:>9.5} {:>9.5} {:>9.5} {:>9} {:>9.5} {:>9.5} {:>4}",
                    r.unit.label,
                    s.min,
                    s.max,
                    s.mean,
                    s.std_dev.map_or_else(|| "-".to_string(), |v| format!("{v:.5}")),
                    s.median,
                    s.range,
                    s.outside_band_count(),
                );
                if let Some(slope) = s.drift_slope {
                    println!(
                        "  drift: first {:.5} last {:.5} delta {:+.5} slope {:+.3e} mm/sample",
                        s.first, s.last, s.first_last_delta, slope
                    );
                }
            }
        }
        if !report.repeatability.is_empty() {
            println!();
            println!("== repeatability by samples per unit ==");
            println!(
                "{:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
                "samples", "mean", "min", "max", "std", "range"
            );
            for row in &report.repeatability {
                println!(
                    "{:>7} {:>9.5} {:>9.5} {:>9.5} {:>9} {:>9.5}",
                    row.sample_count,
                    row.mean,
                    row.min,
                    row.max,
                    row.std_dev.map_or_else(|| "-".to_string(), |v| format!("{v:.5}")),
                    row.range,
                );
            }
        }
        if !report.failed.is_empty() {
            println!();
            println!("== failed units ==");
            for f in &report.failed {
                println!("{:>3} {:<34} {}", f.unit.id, f.unit.label, f.error);
            }
        }
        println!();
        println!(
            "completed {} / failed {} / not run {} (of {})",
            report.completed.len(),
            report.failed_count(),
            report.not_run(),
            report.planned
        );
    }
}

impl ReportSink for ConsoleSink {
    fn unit_completed(&mut self, r: &UnitReport) {
        let s = &r.stats;
        if self.json {
            let line = json!({
                "event": "unit_completed",
                "unit": unit_json(&r.unit),
                "stats": {
                    "count": s.count,
                    "min": s.min,
                    "max": s.max,
                    "mean": s.mean,
                    "std_dev": s.std_dev,
                    "median": s.median,
                    "q1": s.q1,
                    "q3": s.q3,
                    "iqr": s.iqr,
                    "range": s.range,
                    "first": s.first,
                    "last": s.last,
                    "first_last_delta": s.first_last_delta,
                    "drift_slope": s.drift_slope,
                    "band_mm": s.band_mm,
                    "outside_band": s.outside_band_count(),
                },
            });
            println!("{line}");
        } else {
            println!(
                "[{:>3}/{}] {:<13} {}: median {:.5} range {:.5} outside band {}",
                r.unit.id,
                self.planned,
                r.unit.kind.name(),
                r.unit.label,
                s.median,
                s.range,
                s.outside_band_count()
            );
        }
    }

    fn unit_failed(&mut self, f: &FailedUnit) {
        if self.json {
            let line = json!({
                "event": "unit_failed",
                "unit": unit_json(&f.unit),
                "error": f.error.to_string(),
            });
            println!("{line}");
        } else {
            println!(
                "[{:>3}/{}] {:<13} {}: FAILED ({})",
                f.unit.id,
                self.planned,
                f.unit.kind.name(),
                f.unit.label,
                f.error
            );
        }
    }

    fn session_finished(&mut self, report: &SessionReport) {
        if self.json {
            let profile: Vec<serde_json::Value> = report
                .repeatability
                .iter()
                .map(|row| {
                    json!({
                        "samples": row.sample_count,
                        "mean": row.mean,
                        "min": row.min,
                        "max": row.max,
                        "std_dev": row.std_dev,
                        "range": row.range,
                    })
                })
                .collect();
            let line = json!({
                "event": "session_finished",
                "planned": report.planned,
                "completed": report.completed.len(),
                "failed": report.failed_count(),
                "not_run": report.not_run(),
                "repeatability": profile,
            });
            println!("{line}");
        } else {
            Self::print_summary(report);
        }
    }
}

/// Streams every sample and every unit summary into two CSV files.
///
/// Sink callbacks cannot fail, so the first write error is kept and
/// returned from `finish`.
pub struct CsvSink {
    samples: csv::Writer<File>,
    summary: csv::Writer<File>,
    paths: (PathBuf, PathBuf),
    error: Option<csv::Error>,
}

impl CsvSink {
    pub fn create(dir: &Path, run_id: &str) -> eyre::Result<Self> {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("create output dir {}", dir.display()))?;
        let samples_path = dir.join(format!("{run_id}{SAMPLES_CSV_SUFFIX}"));
        let summary_path = dir.join(format!("{run_id}{SUMMARY_CSV_SUFFIX}"));

        let mut samples = csv::Writer::from_path(&samples_path)
            .wrap_err_with(|| format!("create {}", samples_path.display()))?;
        samples.write_record([
            "test", "kind", "position", "sample_index", "order", "elapsed_ms", "x", "y", "z",
        ])?;
        let mut summary = csv::Writer::from_path(&summary_path)
            .wrap_err_with(|| format!("create {}", summary_path.display()))?;
        summary.write_record([
            "test", "kind", "position", "samples", "min", "max", "mean", "std_dev", "median",
            "q1", "q3", "range", "first", "last", "drift", "slope", "outside_band",
        ])?;

        Ok(Self {
            samples,
            summary,
            paths: (samples_path, summary_path),
            error: None,
        })
    }

    fn write_unit(&mut self, r: &UnitReport) -> Result<(), csv::Error> {
        let pos = &r.unit.position;
        for s in r.samples.samples() {
            self.samples.write_record(&[
                r.unit.label.clone(),
                s.kind.name().to_string(),
                s.position.to_string(),
                s.index.to_string(),
                s.order.to_string(),
                s.elapsed_ms.to_string(),
                format!("{:.3}", pos.x),
                format!("{:.3}", pos.y),
                format!("{:.6}", s.z),
            ])?;
        }
        let st = &r.stats;
        self.summary.write_record(&[
            r.unit.label.clone(),
            r.unit.kind.name().to_string(),
            pos.id.to_string(),
            st.count.to_string(),
            format!("{:.6}", st.min),
            format!("{:.6}", st.max),
            format!("{:.6}", st.mean),
            opt(st.std_dev),
            format!("{:.6}", st.median),
            format!("{:.6}", st.q1),
            format!("{:.6}", st.q3),
            format!("{:.6}", st.range),
            format!("{:.6}", st.first),
            format!("{:.6}", st.last),
            format!("{:.6}", st.first_last_delta),
            opt(st.drift_slope),
            st.outside_band_count().to_string(),
        ])?;
        Ok(())
    }

    /// Flush both files and return their paths.
    pub fn finish(mut self) -> eyre::Result<(PathBuf, PathBuf)> {
        if let Some(e) = self.error.take() {
            return Err(e).wrap_err("write csv export");
        }
        self.samples.flush()?;
        self.summary.flush()?;
        Ok(self.paths)
    }
}

impl ReportSink for CsvSink {
    fn unit_completed(&mut self, report: &UnitReport) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.write_unit(report) {
            tracing::error!(error = %e, "csv export failed; further rows skipped");
            self.error = Some(e);
        }
    }
}
