#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core probe accuracy testing (hardware-agnostic).
//!
//! All machine interaction goes through `probe_traits::ProbeClient`; this
//! crate decides what to probe, in which order, and what the readings mean.
//!
//! ## Architecture
//!
//! - **Planning**: `SessionCfg` + `BedPositions` resolve into a fixed
//!   `TestPlan` of units (`plan` module)
//! - **Acquisition**: `SampleCollector` takes one unit's samples, with
//!   optional first-sample drop (`collector` module)
//! - **Statistics**: `StatsEngine` summarizes each unit; the repeatability
//!   profile aggregates across units (`stats` module)
//! - **Execution**: `Session` runs the plan, isolates unit failures and
//!   always runs the exit cleanup (`session` module)
//! - **Reporting**: results stream to a `ReportSink` (`report` module)
//!
//! Heights are `f64` millimetres throughout.

pub mod abort;
pub mod collector;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod plan;
pub mod report;
pub mod sample;
pub mod session;
pub mod stats;

pub use abort::AbortFlag;
pub use collector::SampleCollector;
pub use config::{BedPositions, SampleAggregate, SessionCfg};
pub use error::{BuildError, ProbeTestError, Result, SessionAbort};
pub use plan::{PlanUnit, ProbeOverrides, TestPlan};
pub use report::{FailedUnit, ReportSink, SessionReport, TeeSink, UnitReport};
pub use sample::{Sample, SampleSet, TestKind};
pub use session::{Session, SessionBuilder};
pub use stats::{ProfileRow, StatsEngine, SummaryStats};
