//! Probe backends.
//!
//! Only the simulator lives here; a firmware transport (Moonraker HTTP or a
//! serial G-code link) plugs in by implementing `probe_traits::ProbeClient`.
pub mod error;

use std::collections::BTreeSet;

use probe_traits::{BoxError, Position, PositionId, ProbeClient};

use crate::error::HwError;

/// Every call the simulator received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Home,
    Level { force: bool },
    Move(PositionId),
    Probe,
    Dock,
    Undock,
    SetSpeed(Option<f64>),
    SetRetract(Option<f64>),
}

/// Deterministic software probe.
///
/// Readings follow `base + tilt(corner) + drift * n + noise`, with an extra
/// bias on the first contact after each move. Faults are scripted by probe
/// call number (1-based) so tests can target a specific unit.
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    base_z: f64,
    noise_mm: f64,
    drift_per_sample: f64,
    first_contact_bias: f64,
    corner_tilt: f64,
    rng: u32,
    dockable: bool,
    docked: bool,
    at: Option<PositionId>,
    fresh_contact: bool,
    speed: Option<f64>,
    retract: Option<f64>,
    probe_calls: usize,
    tolerance_faults: BTreeSet<usize>,
    transport_down_after: Option<usize>,
    events: Vec<SimEvent>,
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProbe {
    pub fn new() -> Self {
        Self {
            base_z: 2.0,
            noise_mm: 0.0015,
            drift_per_sample: 0.0,
            first_contact_bias: 0.004,
            corner_tilt: 0.0,
            rng: 0x2545_f491,
            dockable: false,
            docked: true,
            at: None,
            fresh_contact: true,
            speed: None,
            retract: None,
            probe_calls: 0,
            tolerance_faults: BTreeSet::new(),
            transport_down_after: None,
            events: Vec::new(),
        }
    }

    pub fn with_base_z(mut self, z: f64) -> Self {
        self.base_z = z;
        self
    }

    /// Peak amplitude of the uniform noise added to each reading.
    pub fn with_noise(mut self, amplitude_mm: f64) -> Self {
        self.noise_mm = amplitude_mm.abs();
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.rng = seed.max(1);
        self
    }

    /// Linear drift added per probe call (thermal creep).
    pub fn with_drift(mut self, mm_per_sample: f64) -> Self {
        self.drift_per_sample = mm_per_sample;
        self
    }

    pub fn with_first_contact_bias(mut self, mm: f64) -> Self {
        self.first_contact_bias = mm;
        self
    }

    /// Height step applied per corner index, emulating an untrammed gantry.
    pub fn with_corner_tilt(mut self, mm_per_corner: f64) -> Self {
        self.corner_tilt = mm_per_corner;
        self
    }

    /// Report the probe as dockable (Klicky-style, docked when idle).
    pub fn with_dockable(mut self, yes: bool) -> Self {
        self.dockable = yes;
        self
    }

    /// Fail the given probe call (1-based) with a tolerance error.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.tolerance_faults.insert(call);
        self
    }

    /// After `calls` successful probe calls, every further call fails at transport level.
    pub fn transport_down_after(mut self, calls: usize) -> Self {
        self.transport_down_after = Some(calls);
        self
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls
    }

    pub fn is_docked(&self) -> bool {
        self.docked
    }

    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn retract(&self) -> Option<f64> {
        self.retract
    }

    fn link_ok(&self) -> Result<(), HwError> {
        match self.transport_down_after {
            Some(n) if self.probe_calls >= n => {
                Err(HwError::Transport("simulated link down".into()))
            }
            _ => Ok(()),
        }
    }

    // xorshift32 mapped to [-1, 1)
    fn next_noise(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (f64::from(x) / (f64::from(u32::MAX) + 1.0)) * 2.0 - 1.0
    }

    fn tilt(&self) -> f64 {
        match self.at {
            Some(PositionId::Corner(n)) => self.corner_tilt * f64::from(n),
            _ => 0.0,
        }
    }
}

impl ProbeClient for SimulatedProbe {
    fn move_to(&mut self, position: &Position) -> Result<(), BoxError> {
        self.events.push(SimEvent::Move(position.id));
        self.link_ok()?;
        self.at = Some(position.id);
        self.fresh_contact = true;
        tracing::trace!(position = %position, "sim move");
        Ok(())
    }

    fn probe_once(&mut self) -> Result<f64, BoxError> {
        self.events.push(SimEvent::Probe);
        self.link_ok()?;
        self.probe_calls += 1;
        self.docked = false;
        if self.tolerance_faults.contains(&self.probe_calls) {
            return Err(Box::new(HwError::ToleranceExceeded { retries: 3 }));
        }

        // Faster probing widens the scatter.
        let speed_gain = self.speed.map_or(1.0, |s| (s / 5.0).max(0.2));
        let noise = self.next_noise() * self.noise_mm * speed_gain;
        let bias = if self.fresh_contact {
            self.first_contact_bias
        } else {
            0.0
        };
        self.fresh_contact = false;
        let z = self.base_z
            + self.tilt()
            + self.drift_per_sample * self.probe_calls as f64
            + bias
            + noise;
        tracing::debug!(call = self.probe_calls, z, "sim probe");
        Ok(z)
    }

    fn dock(&mut self) -> Result<(), BoxError> {
        self.events.push(SimEvent::Dock);
        self.link_ok()?;
        self.docked = true;
        // Docking travels to the dock, so the next probe is a fresh contact.
        self.at = None;
        self.fresh_contact = true;
        Ok(())
    }

    fn undock(&mut self) -> Result<(), BoxError> {
        self.events.push(SimEvent::Undock);
        self.link_ok()?;
        self.docked = false;
        Ok(())
    }

    fn set_speed(&mut self, mm_per_s: Option<f64>) -> Result<(), BoxError> {
        self.events.push(SimEvent::SetSpeed(mm_per_s));
        self.link_ok()?;
        self.speed = mm_per_s;
        Ok(())
    }

    fn set_retract(&mut self, mm: Option<f64>) -> Result<(), BoxError> {
        self.events.push(SimEvent::SetRetract(mm));
        self.link_ok()?;
        self.retract = mm;
        Ok(())
    }

    fn dockable(&self) -> bool {
        self.dockable
    }

    fn home_if_needed(&mut self) -> Result<(), BoxError> {
        self.events.push(SimEvent::Home);
        self.link_ok()?;
        Ok(())
    }

    fn level_bed(&mut self, force: bool) -> Result<(), BoxError> {
        self.events.push(SimEvent::Level { force });
        self.link_ok()?;
        Ok(())
    }
}
