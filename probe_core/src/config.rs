//! Runtime configuration for a probing session.
//!
//! These are resolved, typed values consumed by `TestPlan` and `Session`.
//! They are separate from the TOML-deserialized config in `probe_config`.

use probe_traits::{Position, PositionId};

use crate::error::ProbeTestError;

pub const DEFAULT_CORNER_SAMPLES: usize = 30;
pub const DEFAULT_REPEAT_UNITS: usize = 20;
pub const DEFAULT_REPEAT_SAMPLES: usize = 10;
pub const DEFAULT_DRIFT_SAMPLES: usize = 100;
pub const DEFAULT_SWEEP_SAMPLES: usize = 10;
pub const DEFAULT_BAND_MM: f64 = 0.005;
/// Corner runs shorter than this are accepted but rarely meaningful.
pub const MIN_USEFUL_CORNER_SAMPLES: usize = 10;

/// Per-unit aggregate the firmware reports for a multi-sample probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleAggregate {
    #[default]
    Mean,
    Median,
}

/// Which tests run and how they are shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCfg {
    /// Samples per corner; `None` disables the corner test.
    pub corner_samples: Option<usize>,
    /// Number of repeatability units; `None` disables the test.
    pub repeat_units: Option<usize>,
    pub repeat_samples: usize,
    /// Samples in the single drift unit; `None` disables the test.
    pub drift_samples: Option<usize>,
    /// Probe speeds for the sweep (mm/s); `None` disables the sweep.
    pub speed_sweep: Option<Vec<f64>>,
    pub sweep_samples: usize,
    pub force_dock: bool,
    pub keep_first: bool,
    /// Probe speed for all non-sweep units (mm/s).
    pub speed_override: Option<f64>,
    /// Sample retract distance (mm).
    pub retract_override: Option<f64>,
    /// Outside-band threshold around the median (mm).
    pub band_mm: f64,
    pub samples_result: SampleAggregate,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            corner_samples: None,
            repeat_units: None,
            repeat_samples: DEFAULT_REPEAT_SAMPLES,
            drift_samples: None,
            speed_sweep: None,
            sweep_samples: DEFAULT_SWEEP_SAMPLES,
            force_dock: false,
            keep_first: false,
            speed_override: None,
            retract_override: None,
            band_mm: DEFAULT_BAND_MM,
            samples_result: SampleAggregate::Mean,
        }
    }
}

impl SessionCfg {
    pub fn any_enabled(&self) -> bool {
        self.corner_samples.is_some()
            || self.repeat_units.is_some()
            || self.drift_samples.is_some()
            || self.speed_sweep.is_some()
    }

    /// Enable corner, repeatability and drift with their default sizes.
    pub fn enable_default_tests(&mut self) {
        self.corner_samples = Some(DEFAULT_CORNER_SAMPLES);
        self.repeat_units = Some(DEFAULT_REPEAT_UNITS);
        self.drift_samples = Some(DEFAULT_DRIFT_SAMPLES);
    }

    pub fn validate(&self) -> Result<(), ProbeTestError> {
        let bad = |msg: &str| Err(ProbeTestError::Config(msg.to_string()));
        if self.corner_samples == Some(0) {
            return bad("corner sample count must be >= 1");
        }
        if self.repeat_units == Some(0) {
            return bad("repeat unit count must be >= 1");
        }
        if self.repeat_units.is_some() && self.repeat_samples == 0 {
            return bad("repeat_samples must be >= 1");
        }
        if self.drift_samples == Some(0) {
            return bad("drift sample count must be >= 1");
        }
        if let Some(speeds) = &self.speed_sweep {
            if speeds.is_empty() {
                return bad("speed sweep enabled without any speeds");
            }
            if speeds.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return bad("speed sweep speeds must be finite and > 0");
            }
            if self.sweep_samples == 0 {
                return bad("speed sweep sample count must be >= 1");
            }
        }
        if let Some(s) = self.speed_override
            && !(s.is_finite() && s > 0.0)
        {
            return bad("speed override must be > 0");
        }
        if let Some(r) = self.retract_override
            && !(r.is_finite() && r >= 0.0)
        {
            return bad("retract override must be >= 0");
        }
        if !(self.band_mm.is_finite() && self.band_mm > 0.0) {
            return bad("outside-band threshold must be > 0");
        }
        Ok(())
    }
}

/// Probing locations resolved from the bed geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BedPositions {
    pub corners: Vec<Position>,
    pub center: Position,
}

impl BedPositions {
    /// Corners are numbered 1.. in the given order.
    pub fn new(corners: &[[f64; 2]], center: [f64; 2]) -> Self {
        let corners = corners
            .iter()
            .enumerate()
            .map(|(i, [x, y])| {
                let n = u8::try_from(i + 1).unwrap_or(u8::MAX);
                Position::new(PositionId::Corner(n), *x, *y)
            })
            .collect();
        Self {
            corners,
            center: Position::center(center[0], center[1]),
        }
    }
}
