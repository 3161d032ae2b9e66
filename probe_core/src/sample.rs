//! Sample data model.

use std::fmt;

use probe_traits::{Position, PositionId};

/// The four kinds of test a session can run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestKind {
    Corner,
    Repeatability,
    Drift,
    SpeedSweep,
}

impl TestKind {
    pub const ALL: [TestKind; 4] = [
        TestKind::Corner,
        TestKind::Repeatability,
        TestKind::Drift,
        TestKind::SpeedSweep,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TestKind::Corner => "corner",
            TestKind::Repeatability => "repeatability",
            TestKind::Drift => "drift",
            TestKind::SpeedSweep => "speed",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One height reading, tagged where and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub kind: TestKind,
    pub position: PositionId,
    /// Raw probe-call index within the unit. Starts at 1 when the first
    /// reading was dropped.
    pub index: usize,
    /// Session-wide acquisition order.
    pub order: u64,
    /// Milliseconds since the session epoch.
    pub elapsed_ms: u64,
    /// Measured height (mm).
    pub z: f64,
}

/// Ordered readings from one test unit at one position.
///
/// Samples can only be appended by the collector; consumers get a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    kind: TestKind,
    position: Position,
    samples: Vec<Sample>,
}

impl SampleSet {
    pub(crate) fn with_capacity(kind: TestKind, position: Position, cap: usize) -> Self {
        Self {
            kind,
            position,
            samples: Vec::with_capacity(cap),
        }
    }

    pub(crate) fn record(&mut self, sample: Sample) {
        debug_assert_eq!(sample.position, self.position.id);
        debug_assert_eq!(sample.kind, self.kind);
        self.samples.push(sample);
    }

    /// Build a set from bare heights, indexed and ordered from 0.
    pub fn from_heights(kind: TestKind, position: Position, heights: &[f64]) -> Self {
        let mut set = Self::with_capacity(kind, position, heights.len());
        for (i, &z) in heights.iter().enumerate() {
            set.record(Sample {
                kind,
                position: position.id,
                index: i,
                order: i as u64,
                elapsed_ms: 0,
                z,
            });
        }
        set
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Heights in acquisition order.
    pub fn heights(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.z).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_heights_tags_every_sample() {
        let pos = Position::center(150.0, 150.0);
        let set = SampleSet::from_heights(TestKind::Drift, pos, &[1.0, 2.0, 3.0]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.heights(), vec![1.0, 2.0, 3.0]);
        for (i, s) in set.samples().iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.kind, TestKind::Drift);
            assert_eq!(s.position, PositionId::Center);
        }
    }

    #[test]
    fn kinds_display_lowercase() {
        let names: Vec<String> = TestKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["corner", "repeatability", "drift", "speed"]);
    }
}
