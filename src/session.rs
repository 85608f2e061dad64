//! Cluster session: one simulation clock and one audio engine on a shared
//! virtual timeline.
//!
//! [`Cluster::advance`] walks the timeline deadline by deadline: audio is
//! rendered up to each deadline, then engine timers due there fire, then
//! clock ticks (each handing its snapshot to the engine). The same session
//! drives offline rendering, the WASM bindings and the real-time runtime.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::clock::SimulationClock;
use crate::config::ClusterConfig;
use crate::dsp::assets::SampleBank;
use crate::dsp::backend::{AudioBackend, SampleSlot, SoftwareBackend};
use crate::dsp::engine::{AudioEngine, AudioTuning, EngineStats};
use crate::dsp::sampler::SampleBuffer;
use crate::error::ClusterError;
use crate::vehicle::{ControlInputs, VehicleState};

/// Everything the dashboard needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub at_ms: u64,
    pub vehicle: VehicleState,
    pub controls: ControlInputs,
    pub tuning: Option<AudioTuning>,
}

pub struct Cluster<B: AudioBackend = SoftwareBackend> {
    clock: SimulationClock,
    engine: AudioEngine<B>,
    sample_rate: u32,
    rendered_frames: u64,
    closed: bool,
}

impl Cluster<SoftwareBackend> {
    /// Load assets synchronously and start with audio ready.
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let bank = SampleBank::load(&config.assets);
        let mut cluster = Self::with_backend(software_backend(&config, &bank), config)?;
        cluster.engine.mark_audio_ready();
        Ok(cluster)
    }

    /// Start before any asset has loaded. Audio becomes ready on
    /// [`Cluster::install_samples`] or when the load timeout expires.
    pub fn without_samples(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        Self::with_backend(software_backend(&config, &SampleBank::empty()), config)
    }

    /// Install samples loaded in the background.
    pub fn install_samples(&mut self, bank: &SampleBank) {
        self.engine.install_samples(bank);
    }

    /// Put one decoded sample in place. Call [`Cluster::mark_audio_ready`]
    /// once every sample has arrived.
    pub fn load_sample(&mut self, slot: SampleSlot, buffer: SampleBuffer) {
        self.engine.set_sample(slot, Arc::new(buffer));
    }
}

impl<B: AudioBackend> Cluster<B> {
    /// Wrap an arbitrary backend. Audio is not ready until
    /// [`Cluster::mark_audio_ready`] or the load timeout.
    pub fn with_backend(backend: B, config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let initial = VehicleState::new(config.vehicle.initial_fuel, config.vehicle.initial_trip_km);
        info!(
            sample_rate = backend.sample_rate(),
            fuel = initial.fuel_level,
            trip_km = initial.trip_distance,
            "Cluster session started"
        );
        Ok(Cluster {
            clock: SimulationClock::new(initial),
            sample_rate: backend.sample_rate(),
            engine: AudioEngine::new(backend, &config),
            rendered_frames: 0,
            closed: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn vehicle(&self) -> VehicleState {
        self.clock.snapshot()
    }

    pub fn controls(&self) -> ControlInputs {
        self.clock.controls()
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            at_ms: self.now_ms(),
            vehicle: self.clock.snapshot(),
            controls: self.clock.controls(),
            tuning: self.engine.tuning(),
        }
    }

    pub fn engine(&self) -> &AudioEngine<B> {
        &self.engine
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Earliest pending clock or engine deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        [self.clock.next_deadline(), self.engine.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// New control inputs. The clock reads them at its next tick; the
    /// turn indicator relay reacts now.
    pub fn set_controls(&mut self, controls: ControlInputs) {
        if self.closed {
            return;
        }
        self.clock.set_controls(controls);
        self.engine.on_controls(&controls);
    }

    pub fn horn(&mut self) {
        self.engine.horn();
    }

    pub fn user_interaction(&mut self) {
        self.engine.on_user_interaction();
    }

    pub fn dashboard_ready(&mut self) {
        self.engine.set_dashboard_ready();
    }

    pub fn mark_audio_ready(&mut self) {
        self.engine.mark_audio_ready();
    }

    /// Advance the timeline by `dt_ms`, appending the audio rendered over
    /// that span to `out`.
    pub fn advance(&mut self, dt_ms: u64, out: &mut Vec<f32>) {
        let target = self.now_ms() + dt_ms;
        while let Some(at) = self.next_deadline().filter(|&at| at <= target) {
            self.render_until(at, out);
            self.engine.advance_to(at);
            self.clock.advance_to(at, &mut self.engine);
        }
        self.render_until(target, out);
        self.engine.advance_to(target);
        self.clock.advance_to(target, &mut self.engine);
    }

    /// Advance without keeping the audio.
    pub fn run_for(&mut self, dt_ms: u64) {
        let mut scratch = Vec::new();
        self.advance(dt_ms, &mut scratch);
    }

    /// Stop both schedulers and silence audio. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.clock.stop();
        self.engine.shutdown();
        info!(at_ms = self.now_ms(), "Cluster session closed");
    }

    fn render_until(&mut self, at_ms: u64, out: &mut Vec<f32>) {
        let end = at_ms * self.sample_rate as u64 / 1000;
        if end <= self.rendered_frames {
            return;
        }
        let start = out.len();
        out.resize(start + (end - self.rendered_frames) as usize, 0.0);
        self.engine.render(&mut out[start..]);
        self.rendered_frames = end;
    }
}

impl<B: AudioBackend> Drop for Cluster<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn software_backend(config: &ClusterConfig, bank: &SampleBank) -> SoftwareBackend {
    let backend = SoftwareBackend::new(bank, config.audio.sample_rate, config.audio.master_gain);
    if config.audio.require_gesture {
        backend.locked()
    } else {
        backend
    }
}
