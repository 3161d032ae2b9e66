//! Per-unit results and the reporting boundary.

use crate::error::ProbeTestError;
use crate::plan::PlanUnit;
use crate::sample::{SampleSet, TestKind};
use crate::stats::{ProfileRow, SummaryStats};

/// A unit that finished with all of its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub unit: PlanUnit,
    pub samples: SampleSet,
    pub stats: SummaryStats,
}

/// A unit that failed with a recoverable probe failure, or the unit that was
/// running when the session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedUnit {
    pub unit: PlanUnit,
    pub error: ProbeTestError,
}

/// Everything a session produced, in plan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// Units in the plan, whether or not they ran.
    pub planned: usize,
    pub completed: Vec<UnitReport>,
    pub failed: Vec<FailedUnit>,
    /// Cross-unit profile over completed repeatability units; empty when
    /// none completed.
    pub repeatability: Vec<ProfileRow>,
}

impl SessionReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn completed_of(&self, kind: TestKind) -> impl Iterator<Item = &UnitReport> {
        self.completed.iter().filter(move |r| r.unit.kind == kind)
    }

    /// Units that neither completed nor failed.
    pub fn not_run(&self) -> usize {
        self.planned
            .saturating_sub(self.completed.len() + self.failed.len())
    }
}

/// Receives results as soon as each unit finishes.
///
/// Calls arrive in plan order, one at a time, from the session's thread.
pub trait ReportSink {
    fn unit_completed(&mut self, report: &UnitReport);

    fn unit_failed(&mut self, _failure: &FailedUnit) {}

    /// Called once, after cleanup, for finished and aborted sessions alike.
    fn session_finished(&mut self, _report: &SessionReport) {}
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn unit_completed(&mut self, report: &UnitReport) {
        (**self).unit_completed(report);
    }
    fn unit_failed(&mut self, failure: &FailedUnit) {
        (**self).unit_failed(failure);
    }
    fn session_finished(&mut self, report: &SessionReport) {
        (**self).session_finished(report);
    }
}

/// Fans every event out to several sinks in order.
#[derive(Default)]
pub struct TeeSink<'a> {
    sinks: Vec<&'a mut dyn ReportSink>,
}

impl<'a> TeeSink<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: &'a mut dyn ReportSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for TeeSink<'_> {
    fn unit_completed(&mut self, report: &UnitReport) {
        for s in &mut self.sinks {
            s.unit_completed(report);
        }
    }
    fn unit_failed(&mut self, failure: &FailedUnit) {
        for s in &mut self.sinks {
            s.unit_failed(failure);
        }
    }
    fn session_finished(&mut self, report: &SessionReport) {
        for s in &mut self.sinks {
            s.session_finished(report);
        }
    }
}
