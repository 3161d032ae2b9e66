//! Maps `Box<dyn Error>` from the `ProbeClient` boundary to `ProbeTestError`.
//!
//! The trait uses untyped errors so any transport can implement it; this
//! module decides which failures are unit-level and which end the session,
//! with a feature-gated path for `probe_hardware::HwError` downcasting.

use crate::error::ProbeTestError;

/// Classify a trait-boundary error.
///
/// Known hardware error types are downcast first, then `std::io::Error`
/// kinds, then string heuristics. Anything unrecognized is treated as a
/// probe failure so a single odd reply cannot end the session.
pub fn map_probe_error(e: &(dyn std::error::Error + 'static)) -> ProbeTestError {
    #[cfg(feature = "hardware-errors")]
    {
        use probe_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::ToleranceExceeded { .. } | HwError::NoReading | HwError::Timeout => {
                    ProbeTestError::ProbeFailure(hw.to_string())
                }
                HwError::Transport(_) | HwError::Io(_) => ProbeTestError::Transport(hw.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind::*;
        return match io.kind() {
            TimedOut | InvalidData => ProbeTestError::ProbeFailure(io.to_string()),
            _ => ProbeTestError::Transport(io.to_string()),
        };
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    let unreachable = ["unreachable", "connection", "transport", "broken pipe", "disconnected"];
    if unreachable.iter().any(|k| lower.contains(k)) {
        ProbeTestError::Transport(s)
    } else {
        ProbeTestError::ProbeFailure(s)
    }
}
