//! Fixed-position sample acquisition.

use std::time::Instant;

use probe_traits::{Clock, Position, ProbeClient};

use crate::abort::AbortFlag;
use crate::error::ProbeTestError;
use crate::hw_error::map_probe_error;
use crate::sample::{Sample, SampleSet, TestKind};

/// Issues probe calls for one unit at a time and tags the readings.
///
/// Tracks where the toolhead is so consecutive units at the same position
/// skip the move, and hands out a session-wide acquisition order.
pub struct SampleCollector<C: Clock> {
    clock: C,
    epoch: Instant,
    next_order: u64,
    at: Option<Position>,
    abort: AbortFlag,
}

impl<C: Clock> SampleCollector<C> {
    pub fn new(clock: C, abort: AbortFlag) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            epoch,
            next_order: 0,
            at: None,
            abort,
        }
    }

    /// Forget the toolhead position, e.g. after docking moved it.
    pub fn invalidate_position(&mut self) {
        self.at = None;
    }

    /// Total samples recorded so far, dropped ones included.
    pub fn raw_samples_taken(&self) -> u64 {
        self.next_order
    }

    /// Take `count` samples at `position`.
    ///
    /// With `drop_first`, one extra probe call is made and its reading is
    /// discarded: the first contact after a move tends to read off.
    pub fn collect<P: ProbeClient + ?Sized>(
        &mut self,
        probe: &mut P,
        kind: TestKind,
        position: &Position,
        count: usize,
        drop_first: bool,
    ) -> Result<SampleSet, ProbeTestError> {
        if count == 0 {
            return Err(ProbeTestError::Config("sample count must be >= 1".into()));
        }
        let result = self.collect_inner(probe, kind, position, count, drop_first);
        if result.is_err() {
            // A failed unit may have left the toolhead anywhere.
            self.at = None;
        }
        result
    }

    fn collect_inner<P: ProbeClient + ?Sized>(
        &mut self,
        probe: &mut P,
        kind: TestKind,
        position: &Position,
        count: usize,
        drop_first: bool,
    ) -> Result<SampleSet, ProbeTestError> {
        if self.at.as_ref() != Some(position) {
            self.abort.check()?;
            probe
                .move_to(position)
                .map_err(|e| map_probe_error(e.as_ref()))?;
            self.at = Some(*position);
        }

        let raw_calls = count + usize::from(drop_first);
        let mut set = SampleSet::with_capacity(kind, *position, count);
        for index in 0..raw_calls {
            self.abort.check()?;
            let z = probe
                .probe_once()
                .map_err(|e| map_probe_error(e.as_ref()))?;
            if !z.is_finite() {
                return Err(ProbeTestError::ProbeFailure(format!(
                    "non-finite reading {z} at {position}"
                )));
            }
            let order = self.next_order;
            self.next_order += 1;

            if drop_first && index == 0 {
                tracing::trace!(%kind, position = %position.id, z, "dropped first sample");
                continue;
            }
            tracing::debug!(%kind, position = %position.id, index, z, "sample");
            set.record(Sample {
                kind,
                position: position.id,
                index,
                order,
                elapsed_ms: self.clock.ms_since(self.epoch),
                z,
            });
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_traits::{BoxError, ManualClock};

    /// Replays scripted readings and counts calls.
    struct Scripted {
        readings: Vec<f64>,
        probes: usize,
        moves: usize,
    }

    impl Scripted {
        fn new(readings: Vec<f64>) -> Self {
            Self {
                readings,
                probes: 0,
                moves: 0,
            }
        }
    }

    impl ProbeClient for Scripted {
        fn move_to(&mut self, _p: &Position) -> Result<(), BoxError> {
            self.moves += 1;
            Ok(())
        }
        fn probe_once(&mut self) -> Result<f64, BoxError> {
            let z = self
                .readings
                .get(self.probes)
                .copied()
                .ok_or("probe returned no value")?;
            self.probes += 1;
            Ok(z)
        }
        fn dock(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
        fn undock(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
        fn set_speed(&mut self, _s: Option<f64>) -> Result<(), BoxError> {
            Ok(())
        }
        fn set_retract(&mut self, _r: Option<f64>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn center() -> Position {
        Position::center(150.0, 150.0)
    }

    #[test]
    fn skips_move_when_already_in_place() {
        let mut probe = Scripted::new(vec![1.0; 10]);
        let mut c = SampleCollector::new(ManualClock::new(), AbortFlag::new());
        c.collect(&mut probe, TestKind::Repeatability, &center(), 2, false)
            .unwrap();
        c.collect(&mut probe, TestKind::Repeatability, &center(), 2, false)
            .unwrap();
        assert_eq!(probe.moves, 1);
        c.invalidate_position();
        c.collect(&mut probe, TestKind::Repeatability, &center(), 2, false)
            .unwrap();
        assert_eq!(probe.moves, 2);
    }

    #[test]
    fn dropped_sample_keeps_raw_indices() {
        let mut probe = Scripted::new(vec![9.0, 1.0, 2.0]);
        let mut c = SampleCollector::new(ManualClock::new(), AbortFlag::new());
        let set = c
            .collect(&mut probe, TestKind::Drift, &center(), 2, true)
            .unwrap();
        let idx: Vec<usize> = set.samples().iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![1, 2]);
        assert_eq!(set.heights(), vec![1.0, 2.0]);
        assert_eq!(c.raw_samples_taken(), 3);
    }

    #[test]
    fn missing_value_is_a_probe_failure() {
        let mut probe = Scripted::new(vec![1.0]);
        let mut c = SampleCollector::new(ManualClock::new(), AbortFlag::new());
        let err = c
            .collect(&mut probe, TestKind::Corner, &center(), 3, false)
            .unwrap_err();
        assert!(matches!(err, ProbeTestError::ProbeFailure(_)));
    }

    #[test]
    fn non_finite_reading_is_a_probe_failure() {
        let mut probe = Scripted::new(vec![f64::NAN]);
        let mut c = SampleCollector::new(ManualClock::new(), AbortFlag::new());
        let err = c
            .collect(&mut probe, TestKind::Corner, &center(), 1, false)
            .unwrap_err();
        assert!(matches!(err, ProbeTestError::ProbeFailure(_)));
    }

    #[test]
    fn abort_stops_before_the_next_call() {
        let mut probe = Scripted::new(vec![1.0; 10]);
        let abort = AbortFlag::new();
        abort.trigger();
        let mut c = SampleCollector::new(ManualClock::new(), abort);
        let err = c
            .collect(&mut probe, TestKind::Corner, &center(), 3, false)
            .unwrap_err();
        assert_eq!(err, ProbeTestError::Aborted);
        assert_eq!(probe.moves, 0);
        assert_eq!(probe.probes, 0);
    }

    #[test]
    fn samples_are_stamped_with_clock_time() {
        let clock = ManualClock::new();
        let mut probe = Scripted::new(vec![1.0, 2.0]);
        let mut c = SampleCollector::new(clock.clone(), AbortFlag::new());
        clock.advance(std::time::Duration::from_millis(40));
        let set = c
            .collect(&mut probe, TestKind::Drift, &center(), 2, false)
            .unwrap();
        assert!(set.samples().iter().all(|s| s.elapsed_ms == 40));
    }
}
