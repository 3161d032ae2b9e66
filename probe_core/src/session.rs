//! Session execution: runs a `TestPlan` unit by unit against one probe.

use probe_traits::{BoxError, Clock, MonotonicClock, ProbeClient};

use crate::abort::AbortFlag;
use crate::collector::SampleCollector;
use crate::config::{SampleAggregate, SessionCfg};
use crate::error::{BuildError, ProbeTestError, Result, SessionAbort};
use crate::hw_error::map_probe_error;
use crate::plan::{PlanUnit, ProbeOverrides, TestPlan};
use crate::report::{FailedUnit, ReportSink, SessionReport, UnitReport};
use crate::sample::{SampleSet, TestKind};
use crate::stats::{StatsEngine, repeatability_profile};

fn mapped(e: BoxError) -> ProbeTestError {
    map_probe_error(e.as_ref())
}

/// Builder for `Session`. `probe` and `plan` are required.
pub struct SessionBuilder<P, C = MonotonicClock> {
    probe: Option<P>,
    plan: Option<TestPlan>,
    stats: StatsEngine,
    aggregate: SampleAggregate,
    clock: C,
    abort: AbortFlag,
}

impl<P: ProbeClient> Default for SessionBuilder<P, MonotonicClock> {
    fn default() -> Self {
        Self {
            probe: None,
            plan: None,
            stats: StatsEngine::default(),
            aggregate: SampleAggregate::default(),
            clock: MonotonicClock::new(),
            abort: AbortFlag::new(),
        }
    }
}

impl<P: ProbeClient, C: Clock> SessionBuilder<P, C> {
    pub fn with_probe(mut self, probe: P) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_plan(mut self, plan: TestPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_stats(mut self, stats: StatsEngine) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_aggregate(mut self, aggregate: SampleAggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Take the outside-band threshold and profile aggregate from `cfg`.
    pub fn with_cfg(self, cfg: &SessionCfg) -> Self {
        self.with_stats(StatsEngine::new(cfg.band_mm))
            .with_aggregate(cfg.samples_result)
    }

    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Swap the time source used to stamp samples.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SessionBuilder<P, C2> {
        SessionBuilder {
            probe: self.probe,
            plan: self.plan,
            stats: self.stats,
            aggregate: self.aggregate,
            clock,
            abort: self.abort,
        }
    }

    pub fn build(self) -> Result<Session<P, C>> {
        let probe = self
            .probe
            .ok_or_else(|| eyre::Report::new(BuildError::MissingProbe))?;
        let plan = self
            .plan
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPlan))?;
        if !(self.stats.band_mm().is_finite() && self.stats.band_mm() > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "band_mm must be > 0",
            )));
        }
        Ok(Session {
            probe,
            plan,
            stats: self.stats,
            aggregate: self.aggregate,
            collector: SampleCollector::new(self.clock, self.abort.clone()),
            abort: self.abort,
            applied: ProbeOverrides::default(),
            attached: false,
        })
    }
}

/// Executes a plan strictly in order, one probe action at a time.
pub struct Session<P: ProbeClient, C: Clock = MonotonicClock> {
    probe: P,
    plan: TestPlan,
    stats: StatsEngine,
    aggregate: SampleAggregate,
    collector: SampleCollector<C>,
    abort: AbortFlag,
    /// Overrides the probe currently has set by this session.
    applied: ProbeOverrides,
    /// A dockable probe was attached by this session and not docked since.
    attached: bool,
}

impl<P: ProbeClient> Session<P, MonotonicClock> {
    pub fn builder() -> SessionBuilder<P, MonotonicClock> {
        SessionBuilder::default()
    }
}

impl<P: ProbeClient, C: Clock> Session<P, C> {
    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Run every unit of the plan, streaming results to `sink`.
    ///
    /// Probe failures only fail their unit. Transport failures and aborts end
    /// the session; the returned `SessionAbort` still carries every finished
    /// unit. Cleanup runs on every exit path before `session_finished`.
    pub fn run(
        &mut self,
        sink: &mut dyn ReportSink,
    ) -> std::result::Result<SessionReport, SessionAbort> {
        let mut report = SessionReport {
            planned: self.plan.len(),
            ..SessionReport::default()
        };
        tracing::info!(units = report.planned, "probe accuracy session started");

        let outcome = self.execute(sink, &mut report);
        self.cleanup();

        let repeat_sets: Vec<&SampleSet> = report
            .completed_of(TestKind::Repeatability)
            .map(|r| &r.samples)
            .collect();
        report.repeatability = repeatability_profile(&repeat_sets, self.aggregate);
        sink.session_finished(&report);

        match outcome {
            Ok(()) => {
                tracing::info!(
                    completed = report.completed.len(),
                    failed = report.failed_count(),
                    "probe accuracy session finished"
                );
                Ok(report)
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    completed = report.completed.len(),
                    not_run = report.not_run(),
                    "probe accuracy session ended early"
                );
                Err(SessionAbort {
                    error,
                    partial: report,
                })
            }
        }
    }

    fn execute(
        &mut self,
        sink: &mut dyn ReportSink,
        report: &mut SessionReport,
    ) -> std::result::Result<(), ProbeTestError> {
        self.prepare()?;

        let units = self.plan.units().to_vec();
        let mut leveled_for_corner = false;
        let mut leveled_for_sweep = false;
        for (i, unit) in units.iter().enumerate() {
            let block_end = units.get(i + 1).is_none_or(|next| next.kind != unit.kind);

            if unit.kind == TestKind::Corner && !leveled_for_corner {
                leveled_for_corner = true;
                self.level(true)?;
            }
            if unit.kind == TestKind::SpeedSweep && !leveled_for_sweep {
                leveled_for_sweep = true;
                self.level(false)?;
            }

            tracing::info!(
                unit = unit.id,
                kind = %unit.kind,
                position = %unit.position.id,
                samples = unit.samples,
                "{}",
                unit.label
            );
            let attach = self.attaches_per_block() && !self.attached;
            match self.run_unit(unit, attach) {
                Ok(unit_report) => {
                    tracing::debug!(
                        unit = unit.id,
                        median = unit_report.stats.median,
                        range = unit_report.stats.range,
                        "unit completed"
                    );
                    sink.unit_completed(&unit_report);
                    report.completed.push(unit_report);
                }
                Err(error) => {
                    let fatal = error.is_fatal();
                    if fatal {
                        tracing::error!(unit = unit.id, kind = %unit.kind, %error, "unit interrupted");
                    } else {
                        tracing::warn!(unit = unit.id, kind = %unit.kind, %error, "unit failed; continuing");
                    }
                    let failure = FailedUnit {
                        unit: unit.clone(),
                        error: error.clone(),
                    };
                    sink.unit_failed(&failure);
                    report.failed.push(failure);
                    if fatal {
                        return Err(error);
                    }
                }
            }

            if block_end && self.attached {
                self.detach()?;
            }
        }
        Ok(())
    }

    /// Without `force_dock`, a dockable probe stays attached for a whole
    /// block of same-kind units and is docked once the block ends.
    fn attaches_per_block(&self) -> bool {
        !self.plan.force_dock() && self.probe.dockable()
    }

    fn attach(&mut self) -> std::result::Result<(), ProbeTestError> {
        self.abort.check()?;
        let attached = self.probe.undock().map_err(mapped);
        self.collector.invalidate_position();
        attached?;
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) -> std::result::Result<(), ProbeTestError> {
        self.abort.check()?;
        let docked = self.probe.dock().map_err(mapped);
        self.collector.invalidate_position();
        match docked {
            Ok(()) => {
                self.attached = false;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "could not dock probe after test block");
                Ok(())
            }
        }
    }

    /// Home, then put the session-wide overrides in place.
    fn prepare(&mut self) -> std::result::Result<(), ProbeTestError> {
        self.abort.check()?;
        self.probe.home_if_needed().map_err(|e| match mapped(e) {
            ProbeTestError::ProbeFailure(msg) => {
                ProbeTestError::Transport(format!("homing failed: {msg}"))
            }
            other => other,
        })?;
        self.collector.invalidate_position();
        self.abort.check()?;
        self.apply(self.plan.baseline())
    }

    fn level(&mut self, force: bool) -> std::result::Result<(), ProbeTestError> {
        self.abort.check()?;
        let result = self.probe.level_bed(force).map_err(mapped);
        self.collector.invalidate_position();
        match result {
            Err(ProbeTestError::ProbeFailure(msg)) => {
                tracing::warn!(force, reason = %msg, "bed leveling failed; continuing");
                Ok(())
            }
            other => other,
        }
    }

    fn run_unit(
        &mut self,
        unit: &PlanUnit,
        attach: bool,
    ) -> std::result::Result<UnitReport, ProbeTestError> {
        if self.plan.force_dock() {
            self.abort.check()?;
            let docked = self.probe.dock().map_err(mapped);
            self.collector.invalidate_position();
            docked?;
        } else if attach {
            self.attach()?;
        }
        // Every unit starts with its own approach move.
        self.collector.invalidate_position();

        if unit.overrides != self.applied {
            self.abort.check()?;
            self.apply(unit.overrides)?;
        }

        let collected = self.collector.collect(
            &mut self.probe,
            unit.kind,
            &unit.position,
            unit.samples,
            !self.plan.keep_first(),
        );

        // Restore even when collection failed so the next unit starts clean.
        // After an abort or a lost link only cleanup talks to the probe.
        let restored = match &collected {
            Err(e) if e.is_fatal() => Ok(()),
            _ => self.apply(self.plan.baseline()),
        };
        let samples = match (restored, collected) {
            (Ok(()), collected) => collected?,
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(unit_error)) if e.is_fatal() => {
                tracing::warn!(unit = unit.id, error = %unit_error, "unit failed, then restoring overrides lost the link");
                return Err(e);
            }
            (Err(e), Err(unit_error)) => {
                tracing::warn!(unit = unit.id, error = %e, "could not restore probe overrides");
                return Err(unit_error);
            }
        };
        let stats = self.stats.summarize(&samples).ok_or_else(|| {
            ProbeTestError::ProbeFailure(format!("unit {} produced no samples", unit.id))
        })?;
        Ok(UnitReport {
            unit: unit.clone(),
            samples,
            stats,
        })
    }

    /// Bring the probe's speed/retract to `target`, touching only what differs.
    fn apply(&mut self, target: ProbeOverrides) -> std::result::Result<(), ProbeTestError> {
        if target.speed != self.applied.speed {
            self.probe.set_speed(target.speed).map_err(mapped)?;
            self.applied.speed = target.speed;
        }
        if target.retract != self.applied.retract {
            self.probe.set_retract(target.retract).map_err(mapped)?;
            self.applied.retract = target.retract;
        }
        Ok(())
    }

    /// Best-effort exit path. Runs even after an abort; errors only warn.
    fn cleanup(&mut self) {
        if let Err(e) = self.apply(ProbeOverrides::default()) {
            tracing::warn!(error = %e, "cleanup: could not restore default speed/retract");
        }
        if self.plan.force_dock() || self.attached {
            match self.probe.dock().map_err(mapped) {
                Ok(()) => self.attached = false,
                Err(e) => tracing::warn!(error = %e, "cleanup: dock failed"),
            }
        }
        let center = self.plan.center();
        if let Err(e) = self.probe.move_to(&center).map_err(mapped) {
            tracing::warn!(error = %e, "cleanup: move to center failed");
        }
        self.collector.invalidate_position();
    }
}
