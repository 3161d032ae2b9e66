use thiserror::Error;

use crate::report::SessionReport;

/// Failure taxonomy of a probing session.
///
/// Only `ProbeFailure` is recoverable: it fails the current unit and the
/// session moves on. Everything else ends the session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeTestError {
    #[error("probe failure: {0}")]
    ProbeFailure(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session aborted by user")]
    Aborted,
}

impl ProbeTestError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProbeTestError::ProbeFailure(_))
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing probe client")]
    MissingProbe,
    #[error("missing test plan")]
    MissingPlan,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// A session that ended early. `partial` holds every unit finished before the
/// failure; those results stay valid.
#[derive(Debug, Error)]
#[error("session aborted: {error}")]
pub struct SessionAbort {
    pub error: ProbeTestError,
    pub partial: SessionReport,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
