//! Audio engine. Sonifies the vehicle state.
//!
//! On every snapshot the engine retunes the continuous engine loop (pitch
//! from a per-gear rpm model, gain from throttle and speed), asks the
//! [`TriggerDetector`] whether the exhaust pops, and keeps the turn
//! indicator relay ticking. The horn and the one-time startup rev are
//! driven from outside the tick loop.
//!
//! The engine owns its backend outright; nothing else holds a playback
//! handle. Playback failures are logged and dropped so a broken audio path
//! can never stall the simulation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::assets::SampleBank;
use super::backend::{AudioBackend, SampleSlot, SoftwareBackend};
use super::sampler::{SampleBuffer, ENGINE_REFERENCE_RPM};
use super::voice::ToneVoice;
use crate::clock::SnapshotObserver;
use crate::config::ClusterConfig;
use crate::error::AudioError;
use crate::timer::{TimerId, Timers};
use crate::trigger::TriggerDetector;
use crate::vehicle::{ControlInputs, VehicleState};

/// Engine speed with the throttle closed at a standstill.
pub const IDLE_RPM: f64 = 1000.0;
/// Engine speed when revving at a standstill.
pub const STATIONARY_REV_RPM: f64 = 3500.0;
pub const THROTTLE_RPM_BOOST: f64 = 1500.0;
pub const MIN_RPM: f64 = 1000.0;
pub const MAX_RPM: f64 = 10000.0;

/// rpm at top speed, indexed by `gear - 1`.
pub const GEAR_RPM_RATIOS: [f64; 6] = [8000.0, 6500.0, 5500.0, 4800.0, 4200.0, 3800.0];

pub const MIN_PLAYBACK_RATE: f64 = 0.5;
pub const MAX_PLAYBACK_RATE: f64 = 2.5;

const COAST_GAIN: f64 = 0.3;
const THROTTLE_GAIN: f64 = 0.65;
/// Below this the engine loop is stopped rather than left barely audible.
pub const GAIN_FLOOR: f64 = 0.05;
const BRAKE_FADE_PER_TICK: f64 = 0.15;
const COAST_FADE_PER_TICK: f64 = 0.08;
const RATE_FADE_PER_TICK: f64 = 0.05;
/// Braking below this speed fades the engine fastest.
const BRAKE_FADE_BELOW_KMH: f64 = 10.0;

pub const TURN_CLICK_INTERVAL_MS: u64 = 500;

// Startup rev: offsets from the first successful start.
const REV_START_GAIN: f64 = 0.5;
const REV_START_RATE: f64 = 0.8;
const REV_PEAK_RATE: f64 = 1.5;
const REV_IDLE_RATE: f64 = 0.7;
const REV_IDLE_GAIN: f64 = 0.3;
const REV_UP_AT_MS: u64 = 300;
const REV_SETTLE_AT_MS: u64 = 800;
const REV_STOP_AT_MS: u64 = 1500;

/// Continuous engine-tone parameters for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTuning {
    pub target_rpm: f64,
    pub playback_rate: f64,
    pub gain: f64,
}

/// Modelled engine speed.
pub fn engine_rpm(state: &VehicleState, controls: &ControlInputs) -> f64 {
    let base = if state.speed > 0.0 {
        let idx = state.gear.clamp(1, 6) as usize - 1;
        state.speed / crate::vehicle::MAX_SPEED * GEAR_RPM_RATIOS[idx]
    } else if controls.throttle_on {
        STATIONARY_REV_RPM
    } else {
        IDLE_RPM
    };
    let boost = if controls.throttle_on { THROTTLE_RPM_BOOST } else { 0.0 };
    (base + boost).clamp(MIN_RPM, MAX_RPM)
}

/// Playback rate relative to the 3500 rpm reference recording.
pub fn playback_rate_for_rpm(rpm: f64) -> f64 {
    (rpm / ENGINE_REFERENCE_RPM).clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Loudness: louder on the throttle and with speed, never below coasting level.
pub fn engine_gain(speed: f64, throttle_on: bool) -> f64 {
    let speed_factor = (speed / 100.0).min(1.0);
    let level = if throttle_on { THROTTLE_GAIN } else { COAST_GAIN };
    (level * (0.5 + 0.5 * speed_factor)).max(COAST_GAIN)
}

pub fn engine_tuning(state: &VehicleState, controls: &ControlInputs) -> AudioTuning {
    let target_rpm = engine_rpm(state, controls);
    AudioTuning {
        target_rpm,
        playback_rate: playback_rate_for_rpm(target_rpm),
        gain: engine_gain(state.speed, controls.throttle_on),
    }
}

/// The engine loop sounds while on the throttle or rolling off the brake.
pub fn tone_active(state: &VehicleState, controls: &ControlInputs) -> bool {
    controls.throttle_on || (state.speed > 0.0 && !controls.brake_on)
}

/// Gain removed per tick while the tone fades out.
pub fn fade_step(state: &VehicleState, controls: &ControlInputs) -> f64 {
    if controls.brake_on && state.speed < BRAKE_FADE_BELOW_KMH {
        BRAKE_FADE_PER_TICK
    } else {
        COAST_FADE_PER_TICK
    }
}

/// Whether audio may start yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

/// Progress of the one-time startup rev.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupRev {
    /// Waiting for audio and dashboard readiness.
    Pending,
    /// Playing; the rev owns the engine loop until it stops or driving takes over.
    Running,
    /// First attempt was blocked; retried once on the next user interaction.
    AwaitingGesture,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineTimer {
    TurnClick,
    RevUp,
    RevSettle,
    RevStop,
    LoadTimeout,
    DashboardReady,
}

/// Counts of effects that actually started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub exhaust_pops: u64,
    pub turn_clicks: u64,
    pub sampled_horns: u64,
    pub synthesized_horns: u64,
}

/// The audio engine for one session.
pub struct AudioEngine<B: AudioBackend = SoftwareBackend> {
    backend: B,
    timers: Timers<EngineTimer>,
    trigger: TriggerDetector,
    readiness: Readiness,
    dashboard_ready: bool,
    startup: StartupRev,
    turn_ticker: Option<TimerId>,
    /// Indicator pair the ticker was started for.
    turn_pair: (bool, bool),
    load_timeout: Option<TimerId>,
    state: VehicleState,
    controls: ControlInputs,
    tuning: Option<AudioTuning>,
    stats: EngineStats,
    closed: bool,
}

impl<B: AudioBackend> AudioEngine<B> {
    /// Create the engine. Audio starts not-ready; call
    /// [`AudioEngine::mark_audio_ready`] once samples are loaded, or let the
    /// load timeout do it.
    pub fn new(backend: B, config: &ClusterConfig) -> Self {
        let mut timers = Timers::new();
        let load_timeout = Some(timers.schedule_once(config.audio.load_timeout_ms, EngineTimer::LoadTimeout));
        if let Some(after) = config.startup.dashboard_ready_after_ms {
            timers.schedule_once(after, EngineTimer::DashboardReady);
        }
        AudioEngine {
            backend,
            timers,
            trigger: TriggerDetector::new(),
            readiness: Readiness::NotReady,
            dashboard_ready: false,
            startup: StartupRev::Pending,
            turn_ticker: None,
            turn_pair: (false, false),
            load_timeout,
            state: VehicleState::new(config.vehicle.initial_fuel, config.vehicle.initial_trip_km),
            controls: ControlInputs::default(),
            tuning: None,
            stats: EngineStats::default(),
            closed: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn startup_rev(&self) -> StartupRev {
        self.startup
    }

    /// Tuning computed on the latest snapshot.
    pub fn tuning(&self) -> Option<AudioTuning> {
        self.tuning
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn turn_ticker_active(&self) -> bool {
        self.turn_ticker.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Run engine timers due up to `now_ms`.
    pub fn advance_to(&mut self, now_ms: u64) {
        while let Some((_, timer)) = self.timers.pop_due(now_ms) {
            self.on_timer(timer);
        }
        self.timers.set_now(now_ms);
    }

    /// Samples are in place; audio may start.
    pub fn mark_audio_ready(&mut self) {
        if self.closed || self.readiness == Readiness::Ready {
            return;
        }
        info!("Audio ready");
        self.become_ready();
    }

    /// The dashboard has finished its greeting and is showing gauges.
    pub fn set_dashboard_ready(&mut self) {
        if self.closed || self.dashboard_ready {
            return;
        }
        debug!("Dashboard ready");
        self.dashboard_ready = true;
        self.maybe_start_rev();
    }

    /// Control inputs changed. The indicator relay reacts immediately.
    pub fn on_controls(&mut self, controls: &ControlInputs) {
        if self.closed {
            return;
        }
        self.controls = *controls;
        self.update_turn_ticker();
    }

    /// A user gesture: lifts the autoplay lock and retries a blocked startup rev once.
    pub fn on_user_interaction(&mut self) {
        if self.closed {
            return;
        }
        self.backend.unlock();
        if self.startup == StartupRev::AwaitingGesture {
            debug!("Retrying startup rev after user interaction");
            self.attempt_startup_rev(true);
        }
    }

    /// Sound the horn: the sample if there is one, otherwise (or if it
    /// fails) the synthesized dual tone.
    pub fn horn(&mut self) {
        if self.closed {
            return;
        }
        if self.readiness == Readiness::Ready && self.backend.has_sample(SampleSlot::Horn) {
            match self.backend.restart(SampleSlot::Horn) {
                Ok(()) => {
                    self.stats.sampled_horns += 1;
                    return;
                }
                Err(e) => warn!("Horn sample failed, using synthesized horn: {e}"),
            }
        }
        let voice = ToneVoice::horn(self.backend.sample_rate() as f64);
        match self.backend.play_voice(voice) {
            Ok(()) => self.stats.synthesized_horns += 1,
            Err(e) => log_dropped("horn", &e),
        }
    }

    /// Render the next block of output.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.closed {
            out.fill(0.0);
            return;
        }
        self.backend.render(out);
    }

    /// Cancel every timer and silence all playback. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.timers.cancel_all();
        self.turn_ticker = None;
        self.load_timeout = None;
        self.backend.stop_all();
        info!(stats = ?self.stats, "Audio engine shut down");
    }

    // ── Per-tick work ────────────────────────────────────────

    fn update_engine_tone(&mut self) {
        let tuning = engine_tuning(&self.state, &self.controls);
        self.tuning = Some(tuning);

        if tone_active(&self.state, &self.controls) {
            self.backend.set_playback_rate(SampleSlot::Engine, tuning.playback_rate);
            self.backend.set_gain(SampleSlot::Engine, tuning.gain);
            if !self.backend.is_playing(SampleSlot::Engine) {
                if let Err(e) = self.backend.start(SampleSlot::Engine) {
                    log_dropped("engine loop", &e);
                }
            }
            return;
        }

        if self.startup == StartupRev::Running || !self.backend.is_playing(SampleSlot::Engine) {
            return;
        }

        let gain = self.backend.gain(SampleSlot::Engine) - fade_step(&self.state, &self.controls);
        if gain < GAIN_FLOOR {
            trace!("Engine loop faded out");
            self.backend.stop(SampleSlot::Engine);
            self.backend.rewind(SampleSlot::Engine);
        } else {
            let rate = self.backend.playback_rate(SampleSlot::Engine) - RATE_FADE_PER_TICK;
            self.backend.set_gain(SampleSlot::Engine, gain);
            self.backend.set_playback_rate(SampleSlot::Engine, rate.max(MIN_PLAYBACK_RATE));
        }
    }

    fn evaluate_exhaust_pop(&mut self) {
        // The edge state moves every tick, ready or not.
        let fires = self.trigger.evaluate(&self.state);
        if !fires || self.readiness != Readiness::Ready {
            return;
        }
        match self.backend.restart(SampleSlot::ExhaustPop) {
            Ok(()) => {
                self.stats.exhaust_pops += 1;
                debug!(speed = self.state.speed, gear = self.state.gear, "Exhaust pop");
            }
            Err(AudioError::MissingSample(_)) => debug!("Exhaust pop skipped, no sample"),
            Err(e) => log_dropped("exhaust pop", &e),
        }
    }

    fn update_turn_ticker(&mut self) {
        let pair = (self.controls.turn_left_on, self.controls.turn_right_on);
        let wanted = self.controls.indicating();
        if self.turn_ticker.is_some() && (!wanted || pair != self.turn_pair) {
            if let Some(id) = self.turn_ticker.take() {
                self.timers.cancel(id);
            }
            if !wanted {
                debug!("Turn indicator off");
            }
        }
        if wanted && self.turn_ticker.is_none() {
            debug!(left = pair.0, right = pair.1, "Turn indicator on");
            self.turn_pair = pair;
            self.play_turn_click();
            self.turn_ticker = Some(self.timers.schedule_every(
                TURN_CLICK_INTERVAL_MS,
                TURN_CLICK_INTERVAL_MS,
                EngineTimer::TurnClick,
            ));
        }
    }

    fn play_turn_click(&mut self) {
        let voice = ToneVoice::turn_click(self.backend.sample_rate() as f64);
        match self.backend.play_voice(voice) {
            Ok(()) => self.stats.turn_clicks += 1,
            Err(e) => log_dropped("turn click", &e),
        }
    }

    // ── Readiness and startup rev ────────────────────────────

    fn become_ready(&mut self) {
        self.readiness = Readiness::Ready;
        if let Some(id) = self.load_timeout.take() {
            self.timers.cancel(id);
        }
        self.maybe_start_rev();
    }

    fn maybe_start_rev(&mut self) {
        if self.startup == StartupRev::Pending
            && self.readiness == Readiness::Ready
            && self.dashboard_ready
        {
            self.attempt_startup_rev(false);
        }
    }

    fn attempt_startup_rev(&mut self, is_retry: bool) {
        self.backend.set_gain(SampleSlot::Engine, REV_START_GAIN);
        self.backend.set_playback_rate(SampleSlot::Engine, REV_START_RATE);
        match self.backend.start(SampleSlot::Engine) {
            Ok(()) => {
                info!(retry = is_retry, "Startup rev");
                self.startup = StartupRev::Running;
                self.timers.schedule_once(REV_UP_AT_MS, EngineTimer::RevUp);
                self.timers.schedule_once(REV_SETTLE_AT_MS, EngineTimer::RevSettle);
                self.timers.schedule_once(REV_STOP_AT_MS, EngineTimer::RevStop);
            }
            Err(e) if e.is_blocked() && !is_retry => {
                info!("Startup rev blocked, waiting for user interaction");
                self.startup = StartupRev::AwaitingGesture;
            }
            Err(e) => {
                warn!(retry = is_retry, "Startup rev failed: {e}");
                self.startup = StartupRev::Done;
            }
        }
    }

    fn driving(&self) -> bool {
        self.state.speed > 0.0 || self.controls.throttle_on
    }

    fn on_timer(&mut self, timer: EngineTimer) {
        match timer {
            EngineTimer::TurnClick => self.play_turn_click(),
            EngineTimer::RevUp => {
                if self.startup == StartupRev::Running {
                    self.backend.set_playback_rate(SampleSlot::Engine, REV_PEAK_RATE);
                }
            }
            EngineTimer::RevSettle => {
                if self.startup == StartupRev::Running && !self.driving() {
                    self.backend.set_playback_rate(SampleSlot::Engine, REV_IDLE_RATE);
                    self.backend.set_gain(SampleSlot::Engine, REV_IDLE_GAIN);
                }
            }
            EngineTimer::RevStop => {
                if self.startup == StartupRev::Running {
                    if !self.driving() {
                        self.backend.stop(SampleSlot::Engine);
                        self.backend.rewind(SampleSlot::Engine);
                    }
                    debug!("Startup rev finished");
                    self.startup = StartupRev::Done;
                }
            }
            EngineTimer::LoadTimeout => {
                self.load_timeout = None;
                if self.readiness == Readiness::NotReady {
                    warn!("Audio not ready before load timeout, continuing without it");
                    self.become_ready();
                }
            }
            EngineTimer::DashboardReady => self.set_dashboard_ready(),
        }
    }
}

impl AudioEngine<SoftwareBackend> {
    /// Swap in samples that finished loading, then mark audio ready.
    pub fn install_samples(&mut self, bank: &SampleBank) {
        if self.closed {
            return;
        }
        self.backend.install(bank);
        self.mark_audio_ready();
    }

    /// Replace one slot's sample without touching readiness.
    pub fn set_sample(&mut self, slot: SampleSlot, buffer: Arc<SampleBuffer>) {
        if !self.closed {
            self.backend.set_sample(slot, buffer);
        }
    }
}

impl<B: AudioBackend> SnapshotObserver for AudioEngine<B> {
    fn on_snapshot(&mut self, at_ms: u64, state: &VehicleState, controls: &ControlInputs) {
        if self.closed {
            return;
        }
        // Fire engine timers that fall before this tick first.
        self.advance_to(at_ms);
        self.state = *state;
        self.controls = *controls;
        self.update_turn_ticker();
        if self.readiness == Readiness::Ready {
            self.update_engine_tone();
        }
        self.evaluate_exhaust_pop();
    }
}

/// Playback failures never propagate; blocked ones are expected before a gesture.
fn log_dropped(what: &str, e: &AudioError) {
    if e.is_blocked() {
        debug!("{what} dropped: {e}");
    } else {
        warn!("{what} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::gear_for_speed;

    const SR: u32 = 8000;

    fn config() -> ClusterConfig {
        let mut c = ClusterConfig::default();
        c.audio.sample_rate = SR;
        c.startup.dashboard_ready_after_ms = None;
        c
    }

    fn engine() -> AudioEngine {
        let backend = SoftwareBackend::new(&SampleBank::empty(), SR, 0.8);
        AudioEngine::new(backend, &config())
    }

    fn ready_engine() -> AudioEngine {
        let mut e = engine();
        e.mark_audio_ready();
        e
    }

    fn state(speed: f64) -> VehicleState {
        VehicleState {
            speed,
            gear: gear_for_speed(speed),
            neutral: speed == 0.0,
            ..VehicleState::default()
        }
    }

    fn controls(throttle: bool, brake: bool) -> ControlInputs {
        ControlInputs {
            throttle_on: throttle,
            brake_on: brake,
            ..ControlInputs::default()
        }
    }

    fn with_pop() -> SampleBank {
        SampleBank {
            exhaust_pop: Some(Arc::new(SampleBuffer::new(
                vec![0.3; 800],
                SR,
            ))),
            ..SampleBank::empty()
        }
    }

    #[test]
    fn rpm_model() {
        // stationary idle and stationary rev
        assert_eq!(engine_rpm(&state(0.0), &controls(false, false)), 1000.0);
        assert_eq!(engine_rpm(&state(0.0), &controls(true, false)), 5000.0);
        // 90 km/h in 4th: 90/180*4800 = 2400, plus throttle
        assert_eq!(engine_rpm(&state(90.0), &controls(false, false)), 2400.0);
        assert_eq!(engine_rpm(&state(90.0), &controls(true, false)), 3900.0);
        // low speed clamps to the floor
        assert_eq!(engine_rpm(&state(5.0), &controls(false, false)), MIN_RPM);
        // rpm never exceeds the ceiling
        for s in 0..=180 {
            let rpm = engine_rpm(&state(s as f64), &controls(true, false));
            assert!((MIN_RPM..=MAX_RPM).contains(&rpm));
        }
    }

    #[test]
    fn playback_rate_is_relative_to_reference() {
        assert_eq!(playback_rate_for_rpm(3500.0), 1.0);
        assert_eq!(playback_rate_for_rpm(1000.0), 0.5);
        assert_eq!(playback_rate_for_rpm(10000.0), 2.5);
        assert!((playback_rate_for_rpm(5250.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn gain_model() {
        assert_eq!(engine_gain(50.0, false), 0.3);
        assert!((engine_gain(100.0, true) - 0.65).abs() < 1e-12);
        assert!((engine_gain(150.0, true) - 0.65).abs() < 1e-12);
        assert!((engine_gain(0.0, true) - 0.325).abs() < 1e-12);
        assert!(engine_gain(60.0, true) > engine_gain(60.0, false));
    }

    #[test]
    fn tone_activity() {
        assert!(tone_active(&state(0.0), &controls(true, false)));
        assert!(tone_active(&state(30.0), &controls(false, false)));
        assert!(!tone_active(&state(30.0), &controls(false, true)));
        assert!(!tone_active(&state(0.0), &controls(false, false)));
        assert_eq!(fade_step(&state(5.0), &controls(false, true)), 0.15);
        assert_eq!(fade_step(&state(30.0), &controls(false, true)), 0.08);
        assert_eq!(fade_step(&state(5.0), &controls(false, false)), 0.08);
    }

    #[test]
    fn nothing_plays_before_ready() {
        let mut e = engine();
        e.on_snapshot(50, &state(30.0), &controls(true, false));
        assert!(!e.backend().is_playing(SampleSlot::Engine));
        assert_eq!(e.tuning(), None);
    }

    #[test]
    fn throttle_starts_and_tunes_engine_loop() {
        let mut e = ready_engine();
        e.on_snapshot(50, &state(90.0), &controls(true, false));
        let b = e.backend();
        assert!(b.is_playing(SampleSlot::Engine));
        assert!((b.playback_rate(SampleSlot::Engine) - 3900.0 / 3500.0).abs() < 1e-12);
        assert!((b.gain(SampleSlot::Engine) - engine_gain(90.0, true)).abs() < 1e-12);
        assert_eq!(e.tuning().map(|t| t.target_rpm), Some(3900.0));
    }

    #[test]
    fn coasting_fade_then_stop_and_rewind() {
        let mut e = ready_engine();
        e.on_snapshot(50, &state(30.0), &controls(true, false));
        let start_gain = e.backend().gain(SampleSlot::Engine);
        e.render(&mut [0.0; 400]);
        assert!(e.backend().position(SampleSlot::Engine).is_some_and(|p| p > 0.0));

        // braking at speed: slow fade
        e.on_snapshot(100, &state(28.0), &controls(false, true));
        assert!((e.backend().gain(SampleSlot::Engine) - (start_gain - 0.08)).abs() < 1e-12);
        assert!(e.backend().is_playing(SampleSlot::Engine));

        let mut t = 150;
        while e.backend().is_playing(SampleSlot::Engine) {
            e.on_snapshot(t, &state(5.0), &controls(false, true));
            t += 50;
            assert!(t < 2000, "engine never stopped");
        }
        assert!(e.backend().gain(SampleSlot::Engine) >= GAIN_FLOOR);
        assert_eq!(e.backend().position(SampleSlot::Engine), Some(0.0));
    }

    #[test]
    fn hard_braking_fades_fastest() {
        let mut slow = ready_engine();
        let mut fast = ready_engine();
        for e in [&mut slow, &mut fast] {
            e.on_snapshot(50, &state(8.0), &controls(true, false));
        }
        slow.on_snapshot(100, &state(0.0), &controls(false, false));
        fast.on_snapshot(100, &state(6.0), &controls(false, true));
        assert!(fast.backend().gain(SampleSlot::Engine) < slow.backend().gain(SampleSlot::Engine));
    }

    #[test]
    fn exhaust_pop_on_hard_deceleration() {
        let mut e = ready_engine();
        e.install_samples(&with_pop());
        e.on_snapshot(50, &state(60.0), &controls(false, false));
        assert_eq!(e.stats().exhaust_pops, 0);
        e.on_snapshot(100, &state(50.0), &controls(false, true));
        assert_eq!(e.stats().exhaust_pops, 1);
        assert!(e.backend().is_playing(SampleSlot::ExhaustPop));
        e.on_snapshot(150, &state(40.0), &controls(false, true));
        assert_eq!(e.stats().exhaust_pops, 2, "no debouncing");
    }

    #[test]
    fn exhaust_pop_without_sample_is_silent_no_op() {
        let mut e = ready_engine();
        e.on_snapshot(50, &state(60.0), &controls(false, false));
        e.on_snapshot(100, &state(50.0), &controls(false, true));
        assert_eq!(e.stats().exhaust_pops, 0);
    }

    #[test]
    fn edge_state_tracks_ticks_before_ready() {
        let mut e = engine();
        e.on_snapshot(50, &state(60.0), &controls(false, false));
        e.on_snapshot(100, &state(50.0), &controls(false, true));
        e.install_samples(&with_pop());
        assert_eq!(e.readiness(), Readiness::Ready);
        // compared against 50, not the stale 60
        e.on_snapshot(150, &state(48.0), &controls(false, true));
        assert_eq!(e.stats().exhaust_pops, 0);
    }

    #[test]
    fn horn_falls_back_to_synthesis() {
        let mut e = ready_engine();
        e.horn();
        assert_eq!(e.stats().synthesized_horns, 1);
        assert_eq!(e.backend().active_voices(), 1);
    }

    #[test]
    fn horn_prefers_sample() {
        let mut e = ready_engine();
        let bank = SampleBank {
            horn: Some(Arc::new(SampleBuffer::new(vec![0.2; 400], SR))),
            ..SampleBank::empty()
        };
        e.install_samples(&bank);
        e.horn();
        assert_eq!(e.stats().sampled_horns, 1);
        assert_eq!(e.stats().synthesized_horns, 0);
        assert!(e.backend().is_playing(SampleSlot::Horn));
    }

    #[test]
    fn blocked_horn_sample_falls_back_and_is_dropped() {
        let backend = SoftwareBackend::new(&SampleBank::empty(), SR, 0.8).locked();
        let mut e = AudioEngine::new(backend, &config());
        e.mark_audio_ready();
        e.horn();
        assert_eq!(e.stats(), EngineStats::default());
    }

    #[test]
    fn turn_clicks_every_500ms_and_stop_immediately() {
        let mut e = ready_engine();
        let left = ControlInputs {
            turn_left_on: true,
            ..ControlInputs::default()
        };
        e.on_controls(&left);
        assert_eq!(e.stats().turn_clicks, 1, "clicks immediately");
        e.advance_to(499);
        assert_eq!(e.stats().turn_clicks, 1);
        e.advance_to(500);
        assert_eq!(e.stats().turn_clicks, 2);
        e.advance_to(1600);
        assert_eq!(e.stats().turn_clicks, 4);

        e.on_controls(&ControlInputs::default());
        assert!(!e.turn_ticker_active());
        e.advance_to(5000);
        assert_eq!(e.stats().turn_clicks, 4, "no trailing click");
    }

    #[test]
    fn switching_indicator_restarts_relay() {
        let mut e = ready_engine();
        e.on_controls(&ControlInputs {
            turn_left_on: true,
            ..ControlInputs::default()
        });
        e.advance_to(200);
        e.on_controls(&ControlInputs {
            turn_right_on: true,
            ..ControlInputs::default()
        });
        assert_eq!(e.stats().turn_clicks, 2);
        assert_eq!(e.next_deadline(), Some(700));
    }

    #[test]
    fn load_timeout_fails_open() {
        let mut e = engine();
        e.advance_to(1999);
        assert_eq!(e.readiness(), Readiness::NotReady);
        e.advance_to(2000);
        assert_eq!(e.readiness(), Readiness::Ready);
    }

    #[test]
    fn startup_rev_sequence_at_idle() {
        let mut e = ready_engine();
        e.set_dashboard_ready();
        assert_eq!(e.startup_rev(), StartupRev::Running);
        assert!(e.backend().is_playing(SampleSlot::Engine));
        assert_eq!(e.backend().playback_rate(SampleSlot::Engine), 0.8);
        assert_eq!(e.backend().gain(SampleSlot::Engine), 0.5);

        // idle ticks do not fade the rev away
        for t in (50..=250).step_by(50) {
            e.on_snapshot(t, &state(0.0), &controls(false, false));
        }
        assert!(e.backend().is_playing(SampleSlot::Engine));

        e.advance_to(300);
        assert_eq!(e.backend().playback_rate(SampleSlot::Engine), 1.5);
        e.advance_to(800);
        assert_eq!(e.backend().playback_rate(SampleSlot::Engine), 0.7);
        assert_eq!(e.backend().gain(SampleSlot::Engine), 0.3);
        e.advance_to(1500);
        assert!(!e.backend().is_playing(SampleSlot::Engine));
        assert_eq!(e.startup_rev(), StartupRev::Done);

        // at most once per session
        e.set_dashboard_ready();
        e.on_user_interaction();
        assert!(!e.backend().is_playing(SampleSlot::Engine));
    }

    #[test]
    fn driving_skips_idle_settle() {
        let mut e = ready_engine();
        e.set_dashboard_ready();
        e.on_snapshot(400, &state(10.0), &controls(true, false));
        e.advance_to(1500);
        assert_eq!(e.startup_rev(), StartupRev::Done);
        assert!(e.backend().is_playing(SampleSlot::Engine));
        assert_ne!(e.backend().gain(SampleSlot::Engine), 0.3);
    }

    #[test]
    fn blocked_startup_retries_once_on_interaction() {
        let backend = SoftwareBackend::new(&SampleBank::empty(), SR, 0.8).locked();
        let mut e = AudioEngine::new(backend, &config());
        e.mark_audio_ready();
        e.set_dashboard_ready();
        assert_eq!(e.startup_rev(), StartupRev::AwaitingGesture);
        assert!(!e.backend().is_playing(SampleSlot::Engine));

        e.on_user_interaction();
        assert_eq!(e.startup_rev(), StartupRev::Running);
        assert!(e.backend().is_playing(SampleSlot::Engine));
    }

    /// Autoplay lock that a gesture never lifts.
    struct StuckLock {
        inner: SoftwareBackend,
        start_attempts: usize,
    }

    impl AudioBackend for StuckLock {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
        fn has_sample(&self, slot: SampleSlot) -> bool {
            self.inner.has_sample(slot)
        }
        fn start(&mut self, _slot: SampleSlot) -> Result<(), AudioError> {
            self.start_attempts += 1;
            Err(AudioError::PlaybackBlocked)
        }
        fn stop(&mut self, slot: SampleSlot) {
            self.inner.stop(slot)
        }
        fn rewind(&mut self, slot: SampleSlot) {
            self.inner.rewind(slot)
        }
        fn is_playing(&self, slot: SampleSlot) -> bool {
            self.inner.is_playing(slot)
        }
        fn playback_rate(&self, slot: SampleSlot) -> f64 {
            self.inner.playback_rate(slot)
        }
        fn set_playback_rate(&mut self, slot: SampleSlot, rate: f64) {
            self.inner.set_playback_rate(slot, rate)
        }
        fn gain(&self, slot: SampleSlot) -> f64 {
            self.inner.gain(slot)
        }
        fn set_gain(&mut self, slot: SampleSlot, gain: f64) {
            self.inner.set_gain(slot, gain)
        }
        fn play_voice(&mut self, _voice: ToneVoice) -> Result<(), AudioError> {
            Err(AudioError::PlaybackBlocked)
        }
        fn unlock(&mut self) {}
        fn stop_all(&mut self) {
            self.inner.stop_all()
        }
        fn render(&mut self, out: &mut [f32]) {
            self.inner.render(out)
        }
    }

    #[test]
    fn blocked_retry_gives_up_after_one_attempt() {
        let backend = StuckLock {
            inner: SoftwareBackend::new(&SampleBank::empty(), SR, 0.8),
            start_attempts: 0,
        };
        let mut e = AudioEngine::new(backend, &config());
        e.mark_audio_ready();
        e.set_dashboard_ready();
        assert_eq!(e.startup_rev(), StartupRev::AwaitingGesture);
        assert_eq!(e.backend().start_attempts, 1);

        e.on_user_interaction();
        assert_eq!(e.startup_rev(), StartupRev::Done);
        assert_eq!(e.backend().start_attempts, 2);

        e.on_user_interaction();
        e.advance_to(5000);
        assert_eq!(e.startup_rev(), StartupRev::Done);
        assert_eq!(e.backend().start_attempts, 2);
        assert!(!e.backend().is_playing(SampleSlot::Engine));
    }

    #[test]
    fn configured_dashboard_ready_timer() {
        let mut c = config();
        c.startup.dashboard_ready_after_ms = Some(2300);
        let mut e = AudioEngine::new(SoftwareBackend::new(&SampleBank::empty(), SR, 0.8), &c);
        e.mark_audio_ready();
        e.advance_to(2299);
        assert_eq!(e.startup_rev(), StartupRev::Pending);
        e.advance_to(2300);
        assert_eq!(e.startup_rev(), StartupRev::Running);
    }

    #[test]
    fn shutdown_silences_and_cancels() {
        let mut e = ready_engine();
        e.on_controls(&ControlInputs {
            turn_right_on: true,
            ..ControlInputs::default()
        });
        e.on_snapshot(50, &state(40.0), &controls(true, false));
        e.shutdown();
        assert_eq!(e.next_deadline(), None);
        assert!(!e.backend().is_playing(SampleSlot::Engine));

        let clicks = e.stats().turn_clicks;
        e.advance_to(10_000);
        e.on_snapshot(10_050, &state(40.0), &controls(true, false));
        e.horn();
        assert_eq!(e.stats().turn_clicks, clicks);
        assert!(!e.backend().is_playing(SampleSlot::Engine));

        let mut block = vec![1.0_f32; 64];
        e.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }
}
