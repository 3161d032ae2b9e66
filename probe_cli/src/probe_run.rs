//! Config mapping, probe assembly and test execution.

use std::path::PathBuf;
use std::str::FromStr;

use probe_config::SpeedSweep;
use probe_core::hw_error::map_probe_error;
use probe_core::{
    AbortFlag, BedPositions, ProbeTestError, Session, SessionCfg, SessionReport, TeeSink, TestPlan,
};
use probe_hardware::SimulatedProbe;
use probe_traits::ProbeClient;

use crate::cli::TestArgs;
use crate::sink::{ConsoleSink, CsvSink, unit_json};

fn config_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(ProbeTestError::Config(msg.into()))
}

/// Everything a run needs, after config and flags are merged.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub session: SessionCfg,
    pub bed: BedPositions,
    pub export_csv: bool,
    pub output_dir: PathBuf,
}

/// Merge flags over the config. Selecting any test on the command line
/// replaces the config's test selection; other flags override one value each.
pub fn resolve(cfg: &probe_config::Config, args: &TestArgs) -> eyre::Result<Resolved> {
    let mut session = SessionCfg::try_from(cfg).map_err(eyre::Report::new)?;

    if args.selects_tests() {
        session.corner_samples = args.corner;
        session.repeat_units = args.repeat;
        session.drift_samples = args.drift;
        session.speed_sweep = match (&args.speedtest, &args.speed_range) {
            (Some(list), _) => Some(SpeedSweep::List(list.clone()).speeds()),
            (None, Some(r)) => match r.as_slice() {
                &[start, stop, step] => Some(SpeedSweep::Range { start, stop, step }.speeds()),
                _ => return Err(config_error("--speed-range takes START,STOP,STEP")),
            },
            (None, None) => None,
        }
        .transpose()
        .map_err(|e| config_error(e.to_string()))?;
    }
    if let Some(n) = args.repeat_samples {
        session.repeat_samples = n;
    }
    if let Some(n) = args.speedtest_samples {
        session.sweep_samples = n;
    }
    session.force_dock |= args.force_dock;
    session.keep_first |= args.keep_first;
    if args.speed.is_some() {
        session.speed_override = args.speed;
    }
    if args.retract.is_some() {
        session.retract_override = args.retract;
    }
    if let Some(b) = args.band_mm {
        session.band_mm = b;
    }
    session.validate().map_err(eyre::Report::new)?;

    Ok(Resolved {
        session,
        bed: BedPositions::from(&cfg.bed),
        export_csv: args.export_csv || cfg.report.export_csv,
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&cfg.report.output_dir)),
    })
}

fn env_parse<T: FromStr>(name: &str) -> eyre::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| config_error(format!("{name}={v:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Simulated probe, tunable through `PROBE_TEST_SIM_*` variables for tests
/// and dry runs.
pub fn build_probe() -> eyre::Result<SimulatedProbe> {
    let mut probe = SimulatedProbe::new();
    if let Some(n) = env_parse::<f64>("PROBE_TEST_SIM_NOISE")? {
        probe = probe.with_noise(n);
    }
    if let Some(d) = env_parse::<f64>("PROBE_TEST_SIM_DRIFT")? {
        probe = probe.with_drift(d);
    }
    if let Some(s) = env_parse::<u32>("PROBE_TEST_SIM_SEED")? {
        probe = probe.with_seed(s);
    }
    if let Some(d) = env_parse::<bool>("PROBE_TEST_SIM_DOCKABLE")? {
        probe = probe.with_dockable(d);
    }
    if let Some(n) = env_parse::<usize>("PROBE_TEST_SIM_TRANSPORT_DOWN_AFTER")? {
        probe = probe.transport_down_after(n);
    }
    if let Ok(calls) = std::env::var("PROBE_TEST_SIM_FAIL_CALLS") {
        for c in calls.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let n = c
                .parse::<usize>()
                .map_err(|e| config_error(format!("PROBE_TEST_SIM_FAIL_CALLS={c:?}: {e}")))?;
            probe = probe.fail_on_call(n);
        }
    }
    Ok(probe)
}

/// Execute the plan and stream results to the console (and CSV if enabled).
pub fn run_tests(
    cfg: &probe_config::Config,
    args: &TestArgs,
    json: bool,
    abort: AbortFlag,
) -> eyre::Result<SessionReport> {
    let resolved = resolve(cfg, args)?;
    let plan = TestPlan::build(&resolved.session, &resolved.bed).map_err(eyre::Report::new)?;
    tracing::info!(
        units = plan.len(),
        force_dock = plan.force_dock(),
        keep_first = plan.keep_first(),
        "test plan resolved"
    );

    let probe = build_probe()?;
    let mut console = ConsoleSink::new(json, plan.len());
    let mut csv = if resolved.export_csv {
        let run_id = chrono::Local::now().format("%Y%m%d_%H%M").to_string();
        Some(CsvSink::create(&resolved.output_dir, &run_id)?)
    } else {
        None
    };

    let mut session = Session::builder()
        .with_probe(probe)
        .with_plan(plan)
        .with_cfg(&resolved.session)
        .with_abort(abort)
        .build()?;

    let outcome = {
        let mut tee = TeeSink::new().with(&mut console);
        if let Some(c) = csv.as_mut() {
            tee = tee.with(c);
        }
        session.run(&mut tee)
    };

    // Partial results are exported too, so write files before reporting errors.
    if let Some(c) = csv {
        let (samples, summary) = c.finish()?;
        tracing::info!(samples = %samples.display(), summary = %summary.display(), "csv export written");
    }
    outcome.map_err(eyre::Report::new)
}

/// Print the resolved plan without touching the probe.
pub fn print_plan(cfg: &probe_config::Config, args: &TestArgs, json: bool) -> eyre::Result<()> {
    let resolved = resolve(cfg, args)?;
    let plan = TestPlan::build(&resolved.session, &resolved.bed).map_err(eyre::Report::new)?;
    if json {
        for unit in plan.units() {
            println!("{}", unit_json(unit));
        }
        return Ok(());
    }
    for unit in plan.units() {
        let speed = unit
            .overrides
            .speed
            .map_or_else(|| "default".to_string(), |s| format!("{s:.1} mm/s"));
        println!(
            "{:>3}  {:<13} {:<8} {:>4} samples  speed {:<10} {}",
            unit.id,
            unit.kind.name(),
            unit.position.id.to_string(),
            unit.samples,
            speed,
            unit.label
        );
    }
    println!(
        "{} units; force_dock={} keep_first={}",
        plan.len(),
        plan.force_dock(),
        plan.keep_first()
    );
    Ok(())
}

/// Config, plan and a single probe sample at bed center.
pub fn self_check(cfg: &probe_config::Config, json: bool) -> eyre::Result<()> {
    let resolved = resolve(cfg, &TestArgs::default())?;
    let plan = TestPlan::build(&resolved.session, &resolved.bed).map_err(eyre::Report::new)?;
    let mut probe = build_probe()?;
    let fail = |e: probe_traits::BoxError| eyre::Report::new(map_probe_error(e.as_ref()));
    probe.home_if_needed().map_err(fail)?;
    if probe.dockable() {
        probe.undock().map_err(fail)?;
    }
    probe.move_to(&plan.center()).map_err(fail)?;
    let z = probe.probe_once().map_err(fail)?;
    if probe.dockable() {
        probe.dock().map_err(fail)?;
    }
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "z": z, "units": plan.len() })
        );
    } else {
        println!("ok: probe reading {z:.5} mm at {}; plan has {} units", plan.center(), plan.len());
    }
    Ok(())
}
