use probe_core::mocks::{RecordingSink, SinkEvent};
use probe_core::{
    AbortFlag, BedPositions, ProbeTestError, Session, SessionCfg, TestKind, TestPlan,
};
use probe_hardware::{SimEvent, SimulatedProbe};
use probe_traits::{BoxError, Position, PositionId, ProbeClient};
use rstest::rstest;

fn four_corners() -> BedPositions {
    BedPositions::new(
        &[[30.0, 270.0], [270.0, 270.0], [30.0, 30.0], [270.0, 30.0]],
        [150.0, 150.0],
    )
}

fn corner_cfg(samples: usize) -> SessionCfg {
    SessionCfg {
        corner_samples: Some(samples),
        ..SessionCfg::default()
    }
}

fn session_for(cfg: &SessionCfg, probe: SimulatedProbe) -> Session<SimulatedProbe> {
    let plan = TestPlan::build(cfg, &four_corners()).unwrap();
    Session::builder()
        .with_probe(probe)
        .with_plan(plan)
        .with_cfg(cfg)
        .build()
        .unwrap()
}

fn count(events: &[SimEvent], wanted: &SimEvent) -> usize {
    events.iter().filter(|e| *e == wanted).count()
}

#[test]
fn corner_only_plan_runs_four_units_of_five() {
    let cfg = corner_cfg(5);
    let mut session = session_for(&cfg, SimulatedProbe::new());
    let mut sink = RecordingSink::new();
    let report = session.run(&mut sink).unwrap();

    assert_eq!(report.planned, 4);
    assert_eq!(report.completed.len(), 4);
    assert_eq!(report.failed_count(), 0);
    for r in &report.completed {
        assert_eq!(r.unit.kind, TestKind::Corner);
        assert_eq!(r.samples.len(), 5);
        assert_eq!(r.stats.count, 5);
    }
    let corners: Vec<PositionId> = report.completed.iter().map(|r| r.unit.position.id).collect();
    assert_eq!(
        corners,
        (1..=4).map(PositionId::Corner).collect::<Vec<_>>()
    );
    for kind in [TestKind::Repeatability, TestKind::Drift, TestKind::SpeedSweep] {
        assert_eq!(report.completed_of(kind).count(), 0);
    }
    assert!(report.repeatability.is_empty());
}

#[test]
fn probe_failure_on_unit_two_is_isolated() {
    // 5 samples + 1 dropped = 6 calls per unit; call 9 falls in unit 2.
    let cfg = corner_cfg(5);
    let mut session = session_for(&cfg, SimulatedProbe::new().fail_on_call(9));
    let mut sink = RecordingSink::new();
    let report = session.run(&mut sink).unwrap();

    assert_eq!(report.completed.len(), 3);
    assert_eq!(report.failed_count(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.unit.id, 2);
    assert!(matches!(failed.error, ProbeTestError::ProbeFailure(_)));
    assert_eq!(
        sink.events,
        vec![
            SinkEvent::Completed(1),
            SinkEvent::Failed(2),
            SinkEvent::Completed(3),
            SinkEvent::Completed(4),
            SinkEvent::Finished,
        ]
    );
}

#[test]
fn each_corner_is_visited_once() {
    let cfg = corner_cfg(5);
    let mut session = session_for(&cfg, SimulatedProbe::new().fail_on_call(9));
    session.run(&mut RecordingSink::new()).unwrap();
    // One move per corner plus the exit move to center.
    let moves = session
        .probe()
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::Move(_)))
        .count();
    assert_eq!(moves, 5);
}

#[test]
fn transport_failure_keeps_partial_results_and_docks() {
    let cfg = corner_cfg(5);
    let probe = SimulatedProbe::new().with_dockable(true).transport_down_after(14);
    let mut session = session_for(&cfg, probe);
    let mut sink = RecordingSink::new();

    let abort = session.run(&mut sink).unwrap_err();
    assert!(matches!(abort.error, ProbeTestError::Transport(_)));
    assert_eq!(abort.partial.completed.len(), 2);
    assert_eq!(abort.partial.failed_count(), 1);
    assert_eq!(abort.partial.failed[0].unit.id, 3);
    assert_eq!(abort.partial.not_run(), 1);

    // Cleanup still attempts to dock and park even with the link down.
    let events = session.probe().events();
    assert!(events.ends_with(&[SimEvent::Dock, SimEvent::Move(PositionId::Center)]));
    assert_eq!(sink.events.last(), Some(&SinkEvent::Finished));
    assert_eq!(sink.finished.as_ref().map(|r| r.completed.len()), Some(2));
}

#[test]
fn homing_failure_is_fatal_before_any_probe() {
    let cfg = corner_cfg(5);
    let probe = SimulatedProbe::new().transport_down_after(0);
    let mut session = session_for(&cfg, probe);
    let abort = session.run(&mut RecordingSink::new()).unwrap_err();
    assert!(matches!(abort.error, ProbeTestError::Transport(_)));
    assert!(abort.partial.completed.is_empty());
    assert!(abort.partial.failed.is_empty());
    assert_eq!(session.probe().probe_calls(), 0);
}

#[rstest]
#[case(false, 0)]
#[case(true, 4 + 1)]
fn force_dock_docks_before_every_unit(#[case] force_dock: bool, #[case] docks: usize) {
    let cfg = SessionCfg {
        force_dock,
        ..corner_cfg(3)
    };
    let mut session = session_for(&cfg, SimulatedProbe::new());
    session.run(&mut RecordingSink::new()).unwrap();
    assert_eq!(count(session.probe().events(), &SimEvent::Dock), docks);
}

#[test]
fn sweep_overrides_are_restored_after_each_unit() {
    let cfg = SessionCfg {
        speed_sweep: Some(vec![2.0, 8.0]),
        sweep_samples: 3,
        ..SessionCfg::default()
    };
    // Fail inside the first sweep unit: restore must still happen.
    let mut session = session_for(&cfg, SimulatedProbe::new().fail_on_call(2));
    let report = session.run(&mut RecordingSink::new()).unwrap();
    assert_eq!(report.completed_of(TestKind::SpeedSweep).count(), 1);
    assert_eq!(report.failed_count(), 1);

    let speeds: Vec<&SimEvent> = session
        .probe()
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::SetSpeed(_)))
        .collect();
    assert_eq!(
        speeds,
        vec![
            &SimEvent::SetSpeed(Some(2.0)),
            &SimEvent::SetSpeed(None),
            &SimEvent::SetSpeed(Some(8.0)),
            &SimEvent::SetSpeed(None),
        ]
    );
    assert_eq!(session.probe().speed(), None);
}

#[test]
fn leveling_is_forced_for_corners_only() {
    let cfg = SessionCfg {
        corner_samples: Some(2),
        speed_sweep: Some(vec![3.0]),
        ..SessionCfg::default()
    };
    let mut session = session_for(&cfg, SimulatedProbe::new());
    session.run(&mut RecordingSink::new()).unwrap();
    let levels: Vec<&SimEvent> = session
        .probe()
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::Level { .. }))
        .collect();
    assert_eq!(
        levels,
        vec![
            &SimEvent::Level { force: true },
            &SimEvent::Level { force: false },
        ]
    );
    assert_eq!(session.probe().events()[0], SimEvent::Home);
}

#[test]
fn repeatability_units_produce_a_profile() {
    let cfg = SessionCfg {
        repeat_units: Some(3),
        repeat_samples: 4,
        ..SessionCfg::default()
    };
    let mut session = session_for(&cfg, SimulatedProbe::new());
    let report = session.run(&mut RecordingSink::new()).unwrap();
    assert_eq!(report.completed_of(TestKind::Repeatability).count(), 3);
    let ks: Vec<usize> = report.repeatability.iter().map(|r| r.sample_count).collect();
    assert_eq!(ks, vec![1, 2, 3, 4]);
}

#[test]
fn every_repeatability_unit_approaches_afresh() {
    let cfg = SessionCfg {
        repeat_units: Some(5),
        repeat_samples: 3,
        keep_first: true,
        ..SessionCfg::default()
    };
    let probe = SimulatedProbe::new()
        .with_noise(0.0)
        .with_first_contact_bias(0.01);
    let mut session = session_for(&cfg, probe);
    let report = session.run(&mut RecordingSink::new()).unwrap();

    // One approach per unit plus the exit move to center.
    let moves = session
        .probe()
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::Move(_)))
        .count();
    assert_eq!(moves, 5 + 1);
    for r in report.completed_of(TestKind::Repeatability) {
        let z = r.samples.heights();
        assert!((z[0] - 2.01).abs() < 1e-9, "unit {}: {z:?}", r.unit.id);
        assert!((z[1] - 2.0).abs() < 1e-9, "unit {}: {z:?}", r.unit.id);
    }
}

#[test]
fn dockable_probe_is_attached_once_per_test_block() {
    let cfg = SessionCfg {
        corner_samples: Some(2),
        repeat_units: Some(2),
        repeat_samples: 2,
        ..SessionCfg::default()
    };
    let mut session = session_for(&cfg, SimulatedProbe::new().with_dockable(true));
    let report = session.run(&mut RecordingSink::new()).unwrap();
    assert_eq!(report.completed.len(), 6);

    let events = session.probe().events();
    let docking: Vec<&SimEvent> = events
        .iter()
        .filter(|e| matches!(e, SimEvent::Dock | SimEvent::Undock))
        .collect();
    assert_eq!(
        docking,
        vec![
            &SimEvent::Undock,
            &SimEvent::Dock,
            &SimEvent::Undock,
            &SimEvent::Dock
        ]
    );
    // The probe is attached before the first corner approach.
    let undock = events.iter().position(|e| *e == SimEvent::Undock);
    let first_move = events.iter().position(|e| matches!(e, SimEvent::Move(_)));
    assert!(undock < first_move);
    assert!(events.ends_with(&[SimEvent::Dock, SimEvent::Move(PositionId::Center)]));
    assert!(session.probe().is_docked());
}

/// Fails selected `set_speed` calls (1-based) with the given message.
struct SpeedFaults {
    inner: SimulatedProbe,
    calls: usize,
    fail_on: usize,
    message: &'static str,
}

impl SpeedFaults {
    fn new(inner: SimulatedProbe, fail_on: usize, message: &'static str) -> Self {
        Self {
            inner,
            calls: 0,
            fail_on,
            message,
        }
    }
}

impl ProbeClient for SpeedFaults {
    fn move_to(&mut self, position: &Position) -> Result<(), BoxError> {
        self.inner.move_to(position)
    }
    fn probe_once(&mut self) -> Result<f64, BoxError> {
        self.inner.probe_once()
    }
    fn dock(&mut self) -> Result<(), BoxError> {
        self.inner.dock()
    }
    fn undock(&mut self) -> Result<(), BoxError> {
        self.inner.undock()
    }
    fn set_speed(&mut self, mm_per_s: Option<f64>) -> Result<(), BoxError> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(self.message.into());
        }
        self.inner.set_speed(mm_per_s)
    }
    fn set_retract(&mut self, mm: Option<f64>) -> Result<(), BoxError> {
        self.inner.set_retract(mm)
    }
}

fn sweep_session<P: ProbeClient>(speeds: Vec<f64>, probe: P) -> Session<P> {
    let cfg = SessionCfg {
        speed_sweep: Some(speeds),
        sweep_samples: 3,
        ..SessionCfg::default()
    };
    let plan = TestPlan::build(&cfg, &four_corners()).unwrap();
    Session::builder()
        .with_probe(probe)
        .with_plan(plan)
        .with_cfg(&cfg)
        .build()
        .unwrap()
}

#[test]
fn lost_link_while_restoring_overrides_is_fatal() {
    // Unit 1 fails a reading, then the restore (set_speed call 2) loses the link.
    let probe = SpeedFaults::new(
        SimulatedProbe::new().fail_on_call(2),
        2,
        "connection lost",
    );
    let mut session = sweep_session(vec![2.0, 8.0], probe);
    let abort = session.run(&mut RecordingSink::new()).unwrap_err();

    assert!(matches!(abort.error, ProbeTestError::Transport(_)));
    assert_eq!(abort.partial.failed.len(), 1);
    assert_eq!(abort.partial.failed[0].unit.id, 1);
    assert!(matches!(
        abort.partial.failed[0].error,
        ProbeTestError::Transport(_)
    ));
    assert!(abort.partial.completed.is_empty());
    assert_eq!(abort.partial.not_run(), 1);
}

#[test]
fn failed_restore_does_not_leak_into_the_next_unit() {
    // The restore after unit 1 fails without losing the link.
    let probe = SpeedFaults::new(SimulatedProbe::new(), 2, "firmware rejected speed");
    let mut session = sweep_session(vec![4.0, 6.0], probe);
    let report = session.run(&mut RecordingSink::new()).unwrap();

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].unit.id, 1);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].unit.overrides.speed, Some(6.0));

    let inner = &session.probe().inner;
    let speeds: Vec<&SimEvent> = inner
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::SetSpeed(_)))
        .collect();
    assert_eq!(
        speeds,
        vec![
            &SimEvent::SetSpeed(Some(4.0)),
            &SimEvent::SetSpeed(Some(6.0)),
            &SimEvent::SetSpeed(None),
        ]
    );
    assert_eq!(inner.speed(), None);
}

/// Triggers the abort flag from inside the probe after a number of readings.
struct AbortAfter {
    inner: SimulatedProbe,
    abort: AbortFlag,
    after: usize,
}

impl ProbeClient for AbortAfter {
    fn move_to(&mut self, position: &Position) -> Result<(), BoxError> {
        self.inner.move_to(position)
    }
    fn probe_once(&mut self) -> Result<f64, BoxError> {
        let z = self.inner.probe_once()?;
        if self.inner.probe_calls() == self.after {
            self.abort.trigger();
        }
        Ok(z)
    }
    fn dock(&mut self) -> Result<(), BoxError> {
        self.inner.dock()
    }
    fn undock(&mut self) -> Result<(), BoxError> {
        self.inner.undock()
    }
    fn set_speed(&mut self, mm_per_s: Option<f64>) -> Result<(), BoxError> {
        self.inner.set_speed(mm_per_s)
    }
    fn set_retract(&mut self, mm: Option<f64>) -> Result<(), BoxError> {
        self.inner.set_retract(mm)
    }
    fn dockable(&self) -> bool {
        self.inner.dockable()
    }
}

#[test]
fn abort_stops_before_the_next_probe_call() {
    let cfg = SessionCfg {
        drift_samples: Some(50),
        keep_first: true,
        ..SessionCfg::default()
    };
    let abort = AbortFlag::new();
    let probe = AbortAfter {
        inner: SimulatedProbe::new().with_dockable(true),
        abort: abort.clone(),
        after: 7,
    };
    let plan = TestPlan::build(&cfg, &four_corners()).unwrap();
    let mut session = Session::builder()
        .with_probe(probe)
        .with_plan(plan)
        .with_abort(abort)
        .build()
        .unwrap();

    let aborted = session.run(&mut RecordingSink::new()).unwrap_err();
    assert_eq!(aborted.error, ProbeTestError::Aborted);
    assert_eq!(aborted.partial.failed[0].error, ProbeTestError::Aborted);
    let inner = &session.probe().inner;
    assert_eq!(inner.probe_calls(), 7);
    assert!(inner.is_docked());
    assert_eq!(
        inner.events().last(),
        Some(&SimEvent::Move(PositionId::Center))
    );
}

#[test]
fn abort_leaves_override_reset_to_cleanup() {
    let cfg = SessionCfg {
        speed_override: Some(4.0),
        speed_sweep: Some(vec![8.0]),
        sweep_samples: 5,
        ..SessionCfg::default()
    };
    let abort = AbortFlag::new();
    let probe = AbortAfter {
        inner: SimulatedProbe::new(),
        abort: abort.clone(),
        after: 2,
    };
    let plan = TestPlan::build(&cfg, &four_corners()).unwrap();
    let mut session = Session::builder()
        .with_probe(probe)
        .with_plan(plan)
        .with_abort(abort)
        .build()
        .unwrap();

    let aborted = session.run(&mut RecordingSink::new()).unwrap_err();
    assert_eq!(aborted.error, ProbeTestError::Aborted);
    let speeds: Vec<&SimEvent> = session
        .probe()
        .inner
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::SetSpeed(_)))
        .collect();
    // No restore to the 4.0 baseline between the abort and cleanup.
    assert_eq!(
        speeds,
        vec![
            &SimEvent::SetSpeed(Some(4.0)),
            &SimEvent::SetSpeed(Some(8.0)),
            &SimEvent::SetSpeed(None),
        ]
    );
}
