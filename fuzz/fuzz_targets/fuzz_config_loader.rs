#![no_main]
use libfuzzer_sys::fuzz_target;
use probe_core::{BedPositions, SessionCfg, TestPlan};

fuzz_target!(|data: &str| {
    // Arbitrary TOML must be rejected with an error, never a panic, all the
    // way from parsing through plan resolution.
    let Ok(cfg) = toml::from_str::<probe_config::Config>(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    let Ok(session) = SessionCfg::try_from(&cfg) else {
        return;
    };
    // Huge counts are valid config; only resolve plans of sane size.
    let big = |n: Option<usize>| n.is_some_and(|n| n > 10_000);
    if big(session.repeat_units) || session.speed_sweep.as_ref().is_some_and(|s| s.len() > 10_000) {
        return;
    }
    let bed = BedPositions::from(&cfg.bed);
    if let Ok(plan) = TestPlan::build(&session, &bed) {
        assert_eq!(plan.units().iter().map(|u| u.id).max(), Some(plan.len()));
    }
});
