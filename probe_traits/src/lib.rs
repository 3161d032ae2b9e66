pub mod clock;
pub mod position;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use position::{Position, PositionId};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Firmware-facing probe capability.
///
/// Every call is a physical machine action; callers must never have two calls
/// in flight at once. Errors cross this boundary untyped and are classified by
/// the core (probe failure vs. transport failure).
pub trait ProbeClient {
    /// Move the toolhead so the probe sits above `position`.
    fn move_to(&mut self, position: &Position) -> Result<(), BoxError>;

    /// Take a single probe sample and return the measured height in mm.
    fn probe_once(&mut self) -> Result<f64, BoxError>;

    fn dock(&mut self) -> Result<(), BoxError>;
    fn undock(&mut self) -> Result<(), BoxError>;

    /// Override the probing speed in mm/s. `None` restores the firmware default.
    fn set_speed(&mut self, mm_per_s: Option<f64>) -> Result<(), BoxError>;

    /// Override the sample retract distance in mm. `None` restores the firmware default.
    fn set_retract(&mut self, mm: Option<f64>) -> Result<(), BoxError>;

    /// Whether the probe must be docked when idle (Klicky-style probes).
    fn dockable(&self) -> bool {
        false
    }

    /// Home all axes unless the machine reports they are already homed.
    fn home_if_needed(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Run gantry leveling. Without `force`, skipped when already applied.
    fn level_bed(&mut self, _force: bool) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<P: ProbeClient + ?Sized> ProbeClient for Box<P> {
    fn move_to(&mut self, position: &Position) -> Result<(), BoxError> {
        (**self).move_to(position)
    }
    fn probe_once(&mut self) -> Result<f64, BoxError> {
        (**self).probe_once()
    }
    fn dock(&mut self) -> Result<(), BoxError> {
        (**self).dock()
    }
    fn undock(&mut self) -> Result<(), BoxError> {
        (**self).undock()
    }
    fn set_speed(&mut self, mm_per_s: Option<f64>) -> Result<(), BoxError> {
        (**self).set_speed(mm_per_s)
    }
    fn set_retract(&mut self, mm: Option<f64>) -> Result<(), BoxError> {
        (**self).set_retract(mm)
    }
    fn dockable(&self) -> bool {
        (**self).dockable()
    }
    fn home_if_needed(&mut self) -> Result<(), BoxError> {
        (**self).home_if_needed()
    }
    fn level_bed(&mut self, force: bool) -> Result<(), BoxError> {
        (**self).level_bed(force)
    }
}
