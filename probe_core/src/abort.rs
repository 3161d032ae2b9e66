//! User-initiated abort shared between a signal handler and the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ProbeTestError;

/// Cloneable abort latch. Once triggered it stays set for the session.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Aborted)` once triggered; call before every probe action.
    pub fn check(&self) -> Result<(), ProbeTestError> {
        if self.is_set() {
            Err(ProbeTestError::Aborted)
        } else {
            Ok(())
        }
    }
}
