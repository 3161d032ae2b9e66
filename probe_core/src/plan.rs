//! Test plan resolution.
//!
//! A `TestPlan` is the concrete, ordered list of units a session executes.
//! It is built once from `SessionCfg` and `BedPositions` and never changes
//! while the session runs.

use probe_config::MAX_CORNERS;
use probe_traits::Position;

use crate::config::{BedPositions, MIN_USEFUL_CORNER_SAMPLES, SessionCfg};
use crate::error::ProbeTestError;
use crate::sample::TestKind;

/// Speed/retract settings in force for a unit. `None` means firmware default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeOverrides {
    pub speed: Option<f64>,
    pub retract: Option<f64>,
}

/// One executable unit: probe `samples` times at `position`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanUnit {
    /// 1-based position in the plan.
    pub id: usize,
    pub kind: TestKind,
    pub position: Position,
    pub samples: usize,
    pub overrides: ProbeOverrides,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestPlan {
    units: Vec<PlanUnit>,
    force_dock: bool,
    keep_first: bool,
    baseline: ProbeOverrides,
    center: Position,
}

impl TestPlan {
    /// Resolve the plan: Corner → Repeatability → Drift → SpeedSweep.
    ///
    /// When no test is enabled, corner, repeatability and drift run with
    /// their default sizes.
    pub fn build(cfg: &SessionCfg, bed: &BedPositions) -> Result<Self, ProbeTestError> {
        let resolved;
        let cfg = if cfg.any_enabled() {
            cfg
        } else {
            tracing::info!("no test selected; running corner, repeatability and drift");
            let mut all = cfg.clone();
            all.enable_default_tests();
            resolved = all;
            &resolved
        };
        cfg.validate()?;

        let baseline = ProbeOverrides {
            speed: cfg.speed_override,
            retract: cfg.retract_override,
        };
        let center = bed.center;
        let mut units = Vec::new();
        let mut push = |kind, position, samples, overrides, label| {
            units.push(PlanUnit {
                id: units.len() + 1,
                kind,
                position,
                samples,
                overrides,
                label,
            });
        };

        if let Some(n) = cfg.corner_samples {
            if bed.corners.is_empty() {
                return Err(ProbeTestError::Config(
                    "corner test enabled but no corner positions are configured".into(),
                ));
            }
            if bed.corners.len() > MAX_CORNERS {
                return Err(ProbeTestError::Config(format!(
                    "at most {MAX_CORNERS} corner positions are supported"
                )));
            }
            if n < MIN_USEFUL_CORNER_SAMPLES {
                tracing::warn!(
                    samples = n,
                    recommended = MIN_USEFUL_CORNER_SAMPLES,
                    "corner sample count below recommended minimum"
                );
            }
            for (i, pos) in bed.corners.iter().enumerate() {
                let label = format!("{}: corner {n} samples ({:.0}, {:.0})", i + 1, pos.x, pos.y);
                push(TestKind::Corner, *pos, n, baseline, label);
            }
        }

        if let Some(units_n) = cfg.repeat_units {
            let n = cfg.repeat_samples;
            for i in 0..units_n {
                let label = format!("{:02}: center {n} samples", i + 1);
                push(TestKind::Repeatability, center, n, baseline, label);
            }
        }

        if let Some(n) = cfg.drift_samples {
            push(TestKind::Drift, center, n, baseline, format!("center {n} samples"));
        }

        if let Some(speeds) = &cfg.speed_sweep {
            let n = cfg.sweep_samples;
            for &speed in speeds {
                let overrides = ProbeOverrides {
                    speed: Some(speed),
                    ..baseline
                };
                let label = format!("speed {speed:.1} mm/s");
                push(TestKind::SpeedSweep, center, n, overrides, label);
            }
        }

        Ok(Self {
            units,
            force_dock: cfg.force_dock,
            keep_first: cfg.keep_first,
            baseline,
            center,
        })
    }

    pub fn units(&self) -> &[PlanUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn count(&self, kind: TestKind) -> usize {
        self.units.iter().filter(|u| u.kind == kind).count()
    }

    /// `(units, samples per unit)` for a kind, or `None` when it is not planned.
    pub fn shape(&self, kind: TestKind) -> Option<(usize, usize)> {
        let first = self.units.iter().find(|u| u.kind == kind)?;
        Some((self.count(kind), first.samples))
    }

    pub fn force_dock(&self) -> bool {
        self.force_dock
    }

    pub fn keep_first(&self) -> bool {
        self.keep_first
    }

    /// Session-wide overrides applied outside speed-sweep units.
    pub fn baseline(&self) -> ProbeOverrides {
        self.baseline
    }

    /// Where the toolhead parks when the session ends.
    pub fn center(&self) -> Position {
        self.center
    }
}
