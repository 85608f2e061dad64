//! Vehicle dynamics: speed, gear, fuel and range.
//!
//! A stylized model, not a physics engine. Every update is a pure function
//! of the previous [`VehicleState`] and the current [`ControlInputs`]; the
//! caller replaces its snapshot wholesale with the returned value.

use serde::{Deserialize, Serialize};

/// Top speed in km/h.
pub const MAX_SPEED: f64 = 180.0;
/// Highest gear.
pub const TOP_GEAR: u8 = 6;
/// Range in km on a full tank.
pub const FULL_TANK_RANGE_KM: f64 = 80.0;
/// Distance credited to the trip meter per fuel tick while driving.
pub const TRIP_STEP_KM: f64 = 0.001;

/// Brake deceleration per dynamics tick (km/h).
const BRAKE_DECEL: f64 = 2.5;

/// Upper speed bound (exclusive) for gears 1..=5; gear 6 covers the rest.
const GEAR_UPPER_BOUNDS: [f64; 5] = [20.0, 40.0, 65.0, 95.0, 130.0];

/// Acceleration per dynamics tick (km/h) indexed by `gear - 1`.
const GEAR_ACCEL: [f64; 6] = [1.5, 1.2, 1.0, 0.8, 0.7, 0.6];

/// Rider control inputs, written only by the input collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlInputs {
    pub throttle_on: bool,
    pub brake_on: bool,
    pub turn_left_on: bool,
    pub turn_right_on: bool,
}

impl ControlInputs {
    /// Either indicator is switched on.
    pub fn indicating(&self) -> bool {
        self.turn_left_on || self.turn_right_on
    }
}

/// Read-only snapshot of the simulated motorcycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    /// km/h, always an integer value in `[0, 180]`.
    pub speed: f64,
    /// `1..=6`, derived from `speed`.
    pub gear: u8,
    /// True iff `speed == 0`.
    pub neutral: bool,
    /// Percent, `[0, 100]`, never increases.
    pub fuel_level: f64,
    /// km, `round(fuel_level / 100 * 80)`.
    pub range: f64,
    /// km, never decreases.
    pub trip_distance: f64,
}

impl VehicleState {
    /// A stationary bike with the given tank level and trip meter reading.
    pub fn new(initial_fuel: f64, initial_trip_km: f64) -> Self {
        let fuel_level = initial_fuel.clamp(0.0, 100.0);
        VehicleState {
            speed: 0.0,
            gear: 1,
            neutral: true,
            fuel_level,
            range: range_for_fuel(fuel_level),
            trip_distance: initial_trip_km.max(0.0),
        }
    }

    /// Advance one dynamics tick: speed, then gear and neutral from the new speed.
    pub fn step_dynamics(&self, controls: &ControlInputs) -> VehicleState {
        let speed = next_speed(self.speed, self.gear, controls);
        VehicleState {
            speed,
            gear: gear_for_speed(speed),
            neutral: speed == 0.0,
            ..*self
        }
    }

    /// Advance one fuel tick. Only burns fuel while throttled and moving.
    pub fn step_fuel(&self, controls: &ControlInputs) -> VehicleState {
        if !(controls.throttle_on && self.speed > 0.0) {
            return *self;
        }
        let fuel_level = (self.fuel_level - fuel_burn(self.speed)).max(0.0);
        VehicleState {
            fuel_level,
            range: range_for_fuel(fuel_level),
            trip_distance: self.trip_distance + TRIP_STEP_KM,
            ..*self
        }
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        VehicleState::new(70.0, 124.0)
    }
}

/// Gear for a given speed. Total over `[0, 180]`; speed 0 is first gear in neutral.
pub fn gear_for_speed(speed: f64) -> u8 {
    GEAR_UPPER_BOUNDS
        .iter()
        .position(|&bound| speed < bound)
        .map_or(TOP_GEAR, |idx| idx as u8 + 1)
}

/// Throttle acceleration (km/h per tick) in the given gear.
pub fn acceleration(gear: u8) -> f64 {
    let idx = gear.clamp(1, TOP_GEAR) as usize - 1;
    GEAR_ACCEL[idx]
}

/// Engine-braking deceleration (km/h per tick) while coasting.
pub fn engine_braking(speed: f64) -> f64 {
    if speed > 80.0 {
        1.2
    } else if speed > 40.0 {
        0.9
    } else {
        0.6
    }
}

/// Fuel burned (percent) in one fuel tick at the given speed.
pub fn fuel_burn(speed: f64) -> f64 {
    if speed > 100.0 {
        0.015
    } else if speed > 60.0 {
        0.01
    } else {
        0.005
    }
}

/// Remaining range in whole km for a tank level.
pub fn range_for_fuel(fuel_level: f64) -> f64 {
    (fuel_level / 100.0 * FULL_TANK_RANGE_KM).round()
}

/// Speed after one dynamics tick, rounded to whole km/h.
///
/// Throttle wins over brake; with neither, engine braking slows a moving bike.
pub fn next_speed(speed: f64, gear: u8, controls: &ControlInputs) -> f64 {
    let raw = if controls.throttle_on {
        (speed + acceleration(gear)).min(MAX_SPEED)
    } else if controls.brake_on {
        (speed - BRAKE_DECEL).max(0.0)
    } else if speed > 0.0 {
        (speed - engine_braking(speed)).max(0.0)
    } else {
        speed
    };
    raw.round().clamp(0.0, MAX_SPEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THROTTLE: ControlInputs = ControlInputs {
        throttle_on: true,
        brake_on: false,
        turn_left_on: false,
        turn_right_on: false,
    };

    const BRAKE: ControlInputs = ControlInputs {
        throttle_on: false,
        brake_on: true,
        turn_left_on: false,
        turn_right_on: false,
    };

    fn at_speed(speed: f64) -> VehicleState {
        VehicleState {
            speed,
            gear: gear_for_speed(speed),
            neutral: speed == 0.0,
            ..VehicleState::default()
        }
    }

    #[test]
    fn gear_table_is_total() {
        for s in 0..=180 {
            let speed = s as f64;
            let expected = match s {
                0..=19 => 1,
                20..=39 => 2,
                40..=64 => 3,
                65..=94 => 4,
                95..=129 => 5,
                _ => 6,
            };
            assert_eq!(gear_for_speed(speed), expected, "wrong gear at {s} km/h");
        }
    }

    #[test]
    fn neutral_only_when_stopped() {
        let stopped = at_speed(1.0).step_dynamics(&ControlInputs::default());
        assert_eq!(stopped.speed, 0.0);
        assert!(stopped.neutral);
        assert_eq!(stopped.gear, 1);

        let moving = stopped.step_dynamics(&THROTTLE);
        assert!(!moving.neutral);
        assert_eq!(moving.gear, 1);
    }

    #[test]
    fn first_tick_from_rest_rounds_up() {
        let next = VehicleState::default().step_dynamics(&THROTTLE);
        // 0 + 1.5 rounds to 2
        assert_eq!(next.speed, 2.0);
    }

    #[test]
    fn throttle_from_rest_shifts_into_second() {
        let mut state = VehicleState::default();
        let mut seen_second = false;
        for _ in 0..40 {
            let prev = state;
            state = state.step_dynamics(&THROTTLE);
            let delta = state.speed - prev.speed;
            if prev.gear == 1 {
                assert_eq!(delta, 2.0, "gear-1 step from {} (1.5 rounded)", prev.speed);
            } else {
                // 1.2 and 1.0 both round to a whole km/h
                assert_eq!(delta, 1.0, "gear-{} step from {}", prev.gear, prev.speed);
            }
            assert_eq!(state.gear, gear_for_speed(state.speed));
            if (20.0..40.0).contains(&state.speed) {
                assert_eq!(state.gear, 2);
                seen_second = true;
            }
        }
        assert!(seen_second);
        // 10 ticks of +2 reach 20, then 30 ticks of +1
        assert_eq!(state.speed, 50.0);
        assert_eq!(state.gear, 3);
    }

    #[test]
    fn coasting_above_eighty_uses_strongest_engine_braking() {
        let next = at_speed(100.0).step_dynamics(&ControlInputs::default());
        // 100 - 1.2 = 98.8, rounded
        assert_eq!(next.speed, 99.0);
        assert_eq!(engine_braking(100.0), 1.2);
        assert_eq!(engine_braking(80.0), 0.9);
        assert_eq!(engine_braking(40.0), 0.6);
    }

    #[test]
    fn throttle_overrides_brake() {
        let both = ControlInputs {
            brake_on: true,
            ..THROTTLE
        };
        let next = at_speed(50.0).step_dynamics(&both);
        assert_eq!(next.speed, 51.0);
    }

    #[test]
    fn brake_clamps_at_zero() {
        let next = at_speed(2.0).step_dynamics(&BRAKE);
        assert_eq!(next.speed, 0.0);
        assert!(next.neutral);
    }

    #[test]
    fn throttle_clamps_at_top_speed() {
        let mut state = at_speed(179.0);
        for _ in 0..10 {
            state = state.step_dynamics(&THROTTLE);
            assert!(state.speed <= MAX_SPEED);
        }
        assert_eq!(state.speed, MAX_SPEED);
        assert_eq!(state.gear, 6);
    }

    #[test]
    fn stationary_without_input_stays_put() {
        let state = VehicleState::default();
        assert_eq!(state.step_dynamics(&ControlInputs::default()), state);
    }

    #[test]
    fn fuel_burn_rates() {
        assert_eq!(fuel_burn(101.0), 0.015);
        assert_eq!(fuel_burn(100.0), 0.01);
        assert_eq!(fuel_burn(61.0), 0.01);
        assert_eq!(fuel_burn(60.0), 0.005);
    }

    #[test]
    fn fuel_tick_requires_throttle_and_motion() {
        let parked = VehicleState::default();
        assert_eq!(parked.step_fuel(&THROTTLE), parked);

        let coasting = at_speed(50.0);
        assert_eq!(coasting.step_fuel(&ControlInputs::default()), coasting);

        let driving = coasting.step_fuel(&THROTTLE);
        assert!(driving.fuel_level < coasting.fuel_level);
        assert!((driving.trip_distance - (coasting.trip_distance + TRIP_STEP_KM)).abs() < 1e-12);
    }

    #[test]
    fn fuel_floors_at_zero() {
        let state = VehicleState {
            fuel_level: 0.02,
            ..at_speed(70.0)
        };
        let next = state.step_fuel(&THROTTLE);
        assert!((next.fuel_level - 0.01).abs() < 1e-12, "got {}", next.fuel_level);
        assert_eq!(next.range, 0.0);

        let nearly_dry = VehicleState {
            fuel_level: 0.003,
            ..at_speed(50.0)
        };
        let next = nearly_dry.step_fuel(&THROTTLE);
        assert_eq!(next.fuel_level, 0.0);
        assert_eq!(next.step_fuel(&THROTTLE).fuel_level, 0.0);
    }

    #[test]
    fn range_tracks_fuel() {
        assert_eq!(VehicleState::default().range, 56.0);
        assert_eq!(range_for_fuel(100.0), 80.0);
        assert_eq!(range_for_fuel(0.0), 0.0);

        let mut state = at_speed(120.0);
        for _ in 0..500 {
            state = state.step_fuel(&THROTTLE);
            assert_eq!(state.range, range_for_fuel(state.fuel_level));
            assert!((0.0..=100.0).contains(&state.fuel_level));
        }
    }

    #[test]
    fn new_clamps_initial_values() {
        let state = VehicleState::new(150.0, -3.0);
        assert_eq!(state.fuel_level, 100.0);
        assert_eq!(state.trip_distance, 0.0);
        assert_eq!(state.range, 80.0);
    }
}
