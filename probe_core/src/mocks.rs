//! Test and helper mocks for probe_core

use crate::report::{FailedUnit, ReportSink, SessionReport, UnitReport};

/// Sink event, in the order it was delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Completed(usize),
    Failed(usize),
    Finished,
}

/// A sink that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
    pub completed: Vec<UnitReport>,
    pub failed: Vec<FailedUnit>,
    pub finished: Option<SessionReport>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingSink {
    fn unit_completed(&mut self, report: &UnitReport) {
        self.events.push(SinkEvent::Completed(report.unit.id));
        self.completed.push(report.clone());
    }

    fn unit_failed(&mut self, failure: &FailedUnit) {
        self.events.push(SinkEvent::Failed(failure.unit.id));
        self.failed.push(failure.clone());
    }

    fn session_finished(&mut self, report: &SessionReport) {
        self.events.push(SinkEvent::Finished);
        self.finished = Some(report.clone());
    }
}

/// Discards every event.
pub struct NullSink;

impl ReportSink for NullSink {
    fn unit_completed(&mut self, _report: &UnitReport) {}
}
