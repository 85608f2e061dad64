//! The simulation clock, sole writer of [`VehicleState`].
//!
//! Two independent periodic ticks drive the model: dynamics every 50 ms and
//! fuel every 100 ms. Each tick computes a whole new snapshot before anyone
//! can observe it.

use tracing::{debug, trace};

use crate::timer::Timers;
use crate::vehicle::{ControlInputs, VehicleState};

/// Dynamics tick period (20 Hz snapshot rate).
pub const DYNAMICS_PERIOD_MS: u64 = 50;
/// Fuel consumption tick period.
pub const FUEL_PERIOD_MS: u64 = 100;

/// Receives each new snapshot synchronously, right after a dynamics tick.
pub trait SnapshotObserver {
    fn on_snapshot(&mut self, at_ms: u64, state: &VehicleState, controls: &ControlInputs);
}

/// Observer that ignores every snapshot.
impl SnapshotObserver for () {
    fn on_snapshot(&mut self, _at_ms: u64, _state: &VehicleState, _controls: &ControlInputs) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Dynamics,
    Fuel,
}

/// Owns the vehicle state and its two fixed-period schedulers.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    state: VehicleState,
    controls: ControlInputs,
    timers: Timers<Tick>,
    dynamics_ticks: u64,
    fuel_ticks: u64,
}

impl SimulationClock {
    pub fn new(initial: VehicleState) -> Self {
        let mut timers = Timers::new();
        timers.schedule_every(DYNAMICS_PERIOD_MS, DYNAMICS_PERIOD_MS, Tick::Dynamics);
        timers.schedule_every(FUEL_PERIOD_MS, FUEL_PERIOD_MS, Tick::Fuel);
        SimulationClock {
            state: initial,
            controls: ControlInputs::default(),
            timers,
            dynamics_ticks: 0,
            fuel_ticks: 0,
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> VehicleState {
        self.state
    }

    pub fn controls(&self) -> ControlInputs {
        self.controls
    }

    /// Replace the control inputs; read at the start of the next tick.
    pub fn set_controls(&mut self, controls: ControlInputs) {
        if controls != self.controls {
            trace!(?controls, "Control inputs changed");
        }
        self.controls = controls;
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn dynamics_ticks(&self) -> u64 {
        self.dynamics_ticks
    }

    pub fn fuel_ticks(&self) -> u64 {
        self.fuel_ticks
    }

    /// Run every tick due up to `now_ms`, in deadline order.
    ///
    /// `observer` sees each dynamics snapshot before the next tick runs.
    pub fn advance_to<O: SnapshotObserver + ?Sized>(&mut self, now_ms: u64, observer: &mut O) {
        while let Some((at_ms, tick)) = self.timers.pop_due(now_ms) {
            match tick {
                Tick::Dynamics => {
                    self.dynamics_tick();
                    observer.on_snapshot(at_ms, &self.state, &self.controls);
                }
                Tick::Fuel => {
                    self.fuel_tick();
                }
            }
        }
        self.timers.set_now(now_ms);
    }

    /// One dynamics tick: speed, gear, neutral.
    pub fn dynamics_tick(&mut self) -> VehicleState {
        self.state = self.state.step_dynamics(&self.controls);
        self.dynamics_ticks += 1;
        self.state
    }

    /// One fuel tick: fuel, range, trip distance.
    pub fn fuel_tick(&mut self) -> VehicleState {
        self.state = self.state.step_fuel(&self.controls);
        self.fuel_ticks += 1;
        self.state
    }

    /// Cancel both schedulers. The snapshot stays readable.
    pub fn stop(&mut self) {
        if !self.timers.is_empty() {
            debug!(
                dynamics_ticks = self.dynamics_ticks,
                fuel_ticks = self.fuel_ticks,
                "Simulation clock stopped"
            );
        }
        self.timers.cancel_all();
    }

    pub fn is_running(&self) -> bool {
        !self.timers.is_empty()
    }
}
