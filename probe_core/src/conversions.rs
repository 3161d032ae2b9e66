//! Conversions bridging `probe_config` types to `probe_core` types.

use crate::config::{
    BedPositions, DEFAULT_CORNER_SAMPLES, DEFAULT_DRIFT_SAMPLES, DEFAULT_REPEAT_SAMPLES,
    DEFAULT_REPEAT_UNITS, DEFAULT_SWEEP_SAMPLES, SampleAggregate, SessionCfg,
};
use crate::error::ProbeTestError;

// ── SampleAggregate ──────────────────────────────────────────────────────────

impl From<probe_config::SamplesResult> for SampleAggregate {
    fn from(r: probe_config::SamplesResult) -> Self {
        match r {
            probe_config::SamplesResult::Mean => SampleAggregate::Mean,
            probe_config::SamplesResult::Median => SampleAggregate::Median,
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl TryFrom<&probe_config::Config> for SessionCfg {
    type Error = ProbeTestError;

    fn try_from(c: &probe_config::Config) -> Result<Self, Self::Error> {
        let t = &c.tests;
        let speed_sweep = t
            .speedtest
            .as_ref()
            .map(|s| s.speeds())
            .transpose()
            .map_err(|e| ProbeTestError::Config(e.to_string()))?;
        Ok(Self {
            corner_samples: t.corner.and_then(|s| s.count_or(DEFAULT_CORNER_SAMPLES)),
            repeat_units: t.repeat.and_then(|s| s.count_or(DEFAULT_REPEAT_UNITS)),
            repeat_samples: t.repeat_samples.unwrap_or(DEFAULT_REPEAT_SAMPLES),
            drift_samples: t.drift.and_then(|s| s.count_or(DEFAULT_DRIFT_SAMPLES)),
            speed_sweep,
            sweep_samples: t.speedtest_samples.unwrap_or(DEFAULT_SWEEP_SAMPLES),
            force_dock: t.force_dock,
            keep_first: t.keep_first,
            speed_override: t.speed_override,
            retract_override: t.retract_override,
            band_mm: c.stats.band_mm,
            samples_result: t.samples_result.into(),
        })
    }
}

// ── BedPositions ─────────────────────────────────────────────────────────────

impl From<&probe_config::BedCfg> for BedPositions {
    fn from(b: &probe_config::BedCfg) -> Self {
        BedPositions::new(&b.corner_points(), b.center_point())
    }
}
