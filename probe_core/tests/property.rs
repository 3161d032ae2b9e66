use probe_core::{SampleSet, StatsEngine, TestKind};
use probe_traits::Position;
use proptest::prelude::*;

fn set(kind: TestKind, zs: &[f64]) -> SampleSet {
    SampleSet::from_heights(kind, Position::center(0.0, 0.0), zs)
}

proptest! {
    #[test]
    fn quartiles_are_ordered(zs in prop::collection::vec(-50.0f64..50.0, 1..200)) {
        let s = StatsEngine::default().summarize(&set(TestKind::Corner, &zs)).unwrap();
        prop_assert!(s.min <= s.q1);
        prop_assert!(s.q1 <= s.median);
        prop_assert!(s.median <= s.q3);
        prop_assert!(s.q3 <= s.max);
        prop_assert_eq!(s.count, zs.len());
        prop_assert_eq!(s.outside_band.len(), zs.len());
    }

    #[test]
    fn sample_order_does_not_change_quantiles(zs in prop::collection::vec(0.0f64..5.0, 1..64)) {
        let engine = StatsEngine::default();
        let a = engine.summarize(&set(TestKind::Drift, &zs)).unwrap();
        let mut rev = zs.clone();
        rev.reverse();
        let b = engine.summarize(&set(TestKind::Drift, &rev)).unwrap();
        prop_assert_eq!(a.min, b.min);
        prop_assert_eq!(a.max, b.max);
        prop_assert_eq!(a.median, b.median);
        prop_assert_eq!(a.q1, b.q1);
        prop_assert_eq!(a.q3, b.q3);
    }

    #[test]
    fn constant_series_has_zero_slope(z in -10.0f64..10.0, n in 2usize..300) {
        let zs = vec![z; n];
        let s = StatsEngine::default().summarize(&set(TestKind::Drift, &zs)).unwrap();
        prop_assert_eq!(s.drift_slope, Some(0.0));
        prop_assert_eq!(s.range, 0.0);
        prop_assert_eq!(s.outside_band_count(), 0);
    }

    #[test]
    fn increasing_series_has_positive_slope(
        start in -10.0f64..10.0,
        steps in prop::collection::vec(0.0001f64..0.01, 1..100),
    ) {
        let mut zs = vec![start];
        for step in steps {
            let last = zs[zs.len() - 1];
            zs.push(last + step);
        }
        let s = StatsEngine::default().summarize(&set(TestKind::Drift, &zs)).unwrap();
        prop_assert!(s.drift_slope.unwrap() > 0.0);
    }
}
