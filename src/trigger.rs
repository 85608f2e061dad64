//! Edge detection for one-shot effects.

use crate::vehicle::VehicleState;

/// Speed drop (km/h per tick) that counts as a hard deceleration.
const RAPID_DECEL_KMH: f64 = 5.0;
/// A downshift only pops above this speed.
const DOWNSHIFT_MIN_SPEED: f64 = 20.0;

/// Previous tick's speed and gear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEdgeState {
    pub previous_speed: f64,
    pub previous_gear: u8,
}

impl Default for TriggerEdgeState {
    fn default() -> Self {
        TriggerEdgeState {
            previous_speed: 0.0,
            previous_gear: 1,
        }
    }
}

/// Exhaust pop predicate.
///
/// Fires on a hard deceleration or a downshift while moving, and never at a
/// standstill.
pub fn exhaust_pop_fires(previous_speed: f64, previous_gear: u8, speed: f64, gear: u8) -> bool {
    let rapid_decel = previous_speed - speed > RAPID_DECEL_KMH;
    let downshift = gear < previous_gear && speed > DOWNSHIFT_MIN_SPEED;
    speed > 0.0 && (rapid_decel || downshift)
}

/// Compares successive snapshots and decides whether the exhaust pops.
///
/// No debouncing: a deceleration that stays above the threshold for several
/// ticks pops on every one of them.
#[derive(Debug, Clone, Default)]
pub struct TriggerDetector {
    edge: TriggerEdgeState,
}

impl TriggerDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate this tick's snapshot, then remember it for the next one.
    pub fn evaluate(&mut self, state: &VehicleState) -> bool {
        let fires = exhaust_pop_fires(
            self.edge.previous_speed,
            self.edge.previous_gear,
            state.speed,
            state.gear,
        );
        self.edge = TriggerEdgeState {
            previous_speed: state.speed,
            previous_gear: state.gear,
        };
        fires
    }

    pub fn edge(&self) -> TriggerEdgeState {
        self.edge
    }
}
