#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the probe accuracy test suite.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Test switches accept either a count or a boolean, speed sweeps accept
//!   either an explicit list or a `{ start, stop, step }` range.
use serde::Deserialize;

/// Historical upper bound above which probe speeds deserve a warning (mm/s).
pub const FAST_PROBE_SPEED: f64 = 35.0;
/// Upper bound on the number of speeds a range may expand to.
pub const MAX_SWEEP_SPEEDS: usize = 1000;
/// Corner ids are a single byte (`u8::MAX`).
pub const MAX_CORNERS: usize = 255;

/// A test toggle: `corner = 30`, `corner = true` (default count) or `corner = false`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum TestSwitch {
    Flag(bool),
    Count(usize),
}

impl TestSwitch {
    /// Resolve to a count, or `None` when disabled.
    pub fn count_or(self, default: usize) -> Option<usize> {
        match self {
            TestSwitch::Flag(true) => Some(default),
            TestSwitch::Flag(false) => None,
            TestSwitch::Count(n) => Some(n),
        }
    }
}

/// Probe speeds for the speed sweep.
///
/// Accepts either:
/// - a list: `speedtest = [2.5, 5.0, 10.0]`
/// - a range table: `speedtest = { start = 2.0, stop = 10.0, step = 2.0 }`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SpeedSweep {
    List(Vec<f64>),
    Range { start: f64, stop: f64, step: f64 },
}

impl SpeedSweep {
    /// Concrete speeds in sweep order.
    ///
    /// A range expands to `start, start + step, ...` below `stop`, then `stop`
    /// itself is appended, so the end point is always probed.
    pub fn speeds(&self) -> eyre::Result<Vec<f64>> {
        match self {
            SpeedSweep::List(v) => {
                if v.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                    eyre::bail!("tests.speedtest speeds must be finite and > 0");
                }
                Ok(v.clone())
            }
            SpeedSweep::Range { start, stop, step } => {
                let (start, stop, step) = (*start, *stop, *step);
                if !(step.is_finite() && step > 0.0) {
                    eyre::bail!("tests.speedtest.step must be > 0");
                }
                if !(start.is_finite() && start >= 1.0) {
                    eyre::bail!("tests.speedtest.start must be >= 1");
                }
                if !(stop.is_finite() && stop >= start) {
                    eyre::bail!("tests.speedtest.stop must be >= start");
                }
                if (stop - start) / step > MAX_SWEEP_SPEEDS as f64 {
                    eyre::bail!("tests.speedtest range yields more than {MAX_SWEEP_SPEEDS} speeds");
                }
                let eps = step * 1e-9;
                let mut out = Vec::new();
                let mut i = 0u32;
                loop {
                    let s = start + f64::from(i) * step;
                    if s >= stop - eps {
                        break;
                    }
                    out.push(s);
                    i += 1;
                }
                out.push(stop);
                Ok(out)
            }
        }
    }
}

/// How the firmware combines multiple samples into one probe result.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SamplesResult {
    #[default]
    Mean,
    Median,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TestsCfg {
    /// Samples per mesh corner, or a boolean toggle.
    pub corner: Option<TestSwitch>,
    /// Number of repeatability units, or a boolean toggle.
    pub repeat: Option<TestSwitch>,
    /// Samples per repeatability unit.
    pub repeat_samples: Option<usize>,
    /// Samples in the drift run, or a boolean toggle.
    pub drift: Option<TestSwitch>,
    pub speedtest: Option<SpeedSweep>,
    /// Samples per speed-sweep unit.
    pub speedtest_samples: Option<usize>,
    /// Dock the probe before every unit.
    pub force_dock: bool,
    /// Keep the first (first-contact) sample of each unit.
    pub keep_first: bool,
    /// Probe speed for every unit except speed-sweep units (mm/s).
    pub speed_override: Option<f64>,
    /// Sample retract distance (mm).
    pub retract_override: Option<f64>,
    /// Per-unit aggregate used by the repeatability profile.
    pub samples_result: SamplesResult,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatsCfg {
    /// Samples further than this from the median are flagged (mm).
    pub band_mm: f64,
}

impl Default for StatsCfg {
    fn default() -> Self {
        Self { band_mm: 0.005 }
    }
}

/// Bed geometry used to derive probing positions.
#[derive(Debug, Deserialize, Clone)]
pub struct BedCfg {
    /// `[bed_mesh] mesh_min` in nozzle coordinates.
    pub mesh_min: [f64; 2],
    /// `[bed_mesh] mesh_max` in nozzle coordinates.
    pub mesh_max: [f64; 2],
    /// Probe X/Y offset from the nozzle; subtracted from mesh corners.
    #[serde(default)]
    pub probe_offset: [f64; 2],
    /// Explicit bed center. Defaults to the midpoint of the axis limits, or of the mesh.
    #[serde(default)]
    pub center: Option<[f64; 2]>,
    #[serde(default)]
    pub axis_min: Option<[f64; 2]>,
    #[serde(default)]
    pub axis_max: Option<[f64; 2]>,
    /// Explicit corner list; replaces the corners derived from the mesh.
    #[serde(default)]
    pub corners: Option<Vec<[f64; 2]>>,
}

impl BedCfg {
    /// Corner points in probing order: back-left, back-right, front-left, front-right.
    pub fn corner_points(&self) -> Vec<[f64; 2]> {
        if let Some(c) = &self.corners {
            return c.clone();
        }
        let [ox, oy] = self.probe_offset;
        let (xmin, ymin) = (self.mesh_min[0] - ox, self.mesh_min[1] - oy);
        let (xmax, ymax) = (self.mesh_max[0] - ox, self.mesh_max[1] - oy);
        vec![[xmin, ymax], [xmax, ymax], [xmin, ymin], [xmax, ymin]]
    }

    pub fn center_point(&self) -> [f64; 2] {
        if let Some(c) = self.center {
            return c;
        }
        let (lo, hi) = match (self.axis_min, self.axis_max) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => (self.mesh_min, self.mesh_max),
        };
        [(lo[0] + hi[0]) / 2.0, (lo[1] + hi[1]) / 2.0]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportCfg {
    pub export_csv: bool,
    pub output_dir: String,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            export_csv: false,
            output_dir: "/tmp".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bed: BedCfg,
    #[serde(default)]
    pub tests: TestsCfg,
    #[serde(default)]
    pub stats: StatsCfg,
    #[serde(default)]
    pub report: ReportCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_path(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn check_count(name: &str, switch: Option<TestSwitch>) -> eyre::Result<()> {
    if let Some(TestSwitch::Count(0)) = switch {
        eyre::bail!("tests.{name} must be >= 1 (use false to disable)");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Tests
        check_count("corner", self.tests.corner)?;
        check_count("repeat", self.tests.repeat)?;
        check_count("drift", self.tests.drift)?;
        if self.tests.repeat_samples == Some(0) {
            eyre::bail!("tests.repeat_samples must be >= 1");
        }
        if self.tests.speedtest_samples == Some(0) {
            eyre::bail!("tests.speedtest_samples must be >= 1");
        }
        if let Some(sweep) = &self.tests.speedtest {
            let speeds = sweep.speeds()?;
            if speeds.is_empty() {
                eyre::bail!("tests.speedtest must list at least one speed");
            }
            if let Some(max) = speeds.iter().copied().reduce(f64::max)
                && max >= FAST_PROBE_SPEED
            {
                tracing::warn!(max_speed = max, "speed sweep reaches fast probe speeds");
            }
        }
        if let Some(s) = self.tests.speed_override
            && !(s.is_finite() && s > 0.0)
        {
            eyre::bail!("tests.speed_override must be > 0");
        }
        if let Some(r) = self.tests.retract_override
            && !(r.is_finite() && r >= 0.0)
        {
            eyre::bail!("tests.retract_override must be >= 0");
        }

        // Stats
        if !(self.stats.band_mm.is_finite() && self.stats.band_mm > 0.0) {
            eyre::bail!("stats.band_mm must be > 0");
        }

        // Bed
        let all_finite = self
            .bed
            .mesh_min
            .iter()
            .chain(self.bed.mesh_max.iter())
            .chain(self.bed.probe_offset.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            eyre::bail!("bed coordinates must be finite");
        }
        if self.bed.mesh_max[0] <= self.bed.mesh_min[0]
            || self.bed.mesh_max[1] <= self.bed.mesh_min[1]
        {
            eyre::bail!("bed.mesh_max must be greater than bed.mesh_min on both axes");
        }
        if let Some(corners) = &self.bed.corners
            && corners.len() > MAX_CORNERS
        {
            eyre::bail!("bed.corners lists more than {MAX_CORNERS} points");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
