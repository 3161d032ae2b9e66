use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    /// Firmware gave up after exhausting its sample retries (samples_tolerance).
    #[error("probe samples exceed tolerance after {retries} retries")]
    ToleranceExceeded { retries: u32 },
    #[error("probe returned no measurement")]
    NoReading,
    #[error("probe timeout")]
    Timeout,
    #[error("firmware unreachable: {0}")]
    Transport(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
