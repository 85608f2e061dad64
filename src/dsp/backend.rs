//! Audio backend, the leaf that actually makes sound.
//!
//! [`AudioBackend`] hides whether a sound comes from a recorded sample or
//! from synthesis. [`SoftwareBackend`] renders everything in software into
//! mono `f32` blocks; callers push those blocks to a device, a WAV file or a
//! browser audio worklet.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::assets::SampleBank;
use super::mixer::Mixer;
use super::sampler::{procedural_engine_loop, SampleBuffer, SamplePlayer};
use super::voice::ToneVoice;
use crate::error::AudioError;

/// Sample-backed sounds, each with its own playback handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleSlot {
    /// Continuous engine loop.
    Engine,
    ExhaustPop,
    Horn,
}

impl SampleSlot {
    pub const ALL: [SampleSlot; 3] = [SampleSlot::Engine, SampleSlot::ExhaustPop, SampleSlot::Horn];

    /// Gain each slot is created at.
    pub fn default_gain(self) -> f64 {
        match self {
            SampleSlot::Engine => 0.4,
            SampleSlot::ExhaustPop => 0.6,
            SampleSlot::Horn => 0.7,
        }
    }

    /// Only the engine loops.
    pub fn loops(self) -> bool {
        matches!(self, SampleSlot::Engine)
    }

    fn index(self) -> usize {
        match self {
            SampleSlot::Engine => 0,
            SampleSlot::ExhaustPop => 1,
            SampleSlot::Horn => 2,
        }
    }
}

/// Playback control over sample slots plus fire-and-forget synthesis.
///
/// Controls on a slot without a sample are no-ops, except [`start`] which
/// reports [`AudioError::MissingSample`].
///
/// [`start`]: AudioBackend::start
pub trait AudioBackend {
    fn sample_rate(&self) -> u32;

    fn has_sample(&self, slot: SampleSlot) -> bool;

    /// Start (or resume) a slot from its current position. No-op if playing.
    fn start(&mut self, slot: SampleSlot) -> Result<(), AudioError>;

    /// Pause a slot, keeping its position.
    fn stop(&mut self, slot: SampleSlot);

    /// Move a slot back to time zero without changing whether it plays.
    fn rewind(&mut self, slot: SampleSlot);

    fn is_playing(&self, slot: SampleSlot) -> bool;

    fn playback_rate(&self, slot: SampleSlot) -> f64;

    fn set_playback_rate(&mut self, slot: SampleSlot, rate: f64);

    fn gain(&self, slot: SampleSlot) -> f64;

    fn set_gain(&mut self, slot: SampleSlot, gain: f64);

    /// Play a synthesized voice to completion.
    fn play_voice(&mut self, voice: ToneVoice) -> Result<(), AudioError>;

    /// Lift the autoplay lock after a user gesture.
    fn unlock(&mut self);

    /// Silence everything: pause every slot and drop synthesized voices.
    fn stop_all(&mut self);

    /// Render the next block of mono output.
    fn render(&mut self, out: &mut [f32]);

    /// Stop, rewind, start: play from time zero, cutting off any earlier
    /// playback. Safe on an already stopped slot.
    fn restart(&mut self, slot: SampleSlot) -> Result<(), AudioError> {
        self.stop(slot);
        self.rewind(slot);
        self.start(slot)
    }
}

/// Software mixer backend.
pub struct SoftwareBackend {
    sample_rate: u32,
    players: [Option<SamplePlayer>; 3],
    voices: Vec<ToneVoice>,
    mixer: Mixer,
    locked: bool,
}

impl SoftwareBackend {
    /// Build from decoded samples. A missing engine sample is replaced by a
    /// procedural loop, so the engine slot always has something to play.
    pub fn new(bank: &SampleBank, sample_rate: u32, master_gain: f64) -> Self {
        let mut backend = SoftwareBackend {
            sample_rate,
            players: [None, None, None],
            voices: Vec::new(),
            mixer: Mixer::new(master_gain),
            locked: false,
        };
        backend.install(bank);
        backend
    }

    /// Start locked; every start fails with [`AudioError::PlaybackBlocked`]
    /// until [`AudioBackend::unlock`].
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Replace the sample in every slot the bank provides.
    pub fn install(&mut self, bank: &SampleBank) {
        for slot in SampleSlot::ALL {
            if let Some(buffer) = bank.get(slot) {
                self.set_sample(slot, Arc::clone(buffer));
            }
        }
        if self.players[SampleSlot::Engine.index()].is_none() {
            debug!("No engine sample, synthesizing engine loop");
            self.set_sample(SampleSlot::Engine, Arc::new(procedural_engine_loop(self.sample_rate)));
        }
    }

    /// Load a sample into one slot, stopping whatever it played before.
    pub fn set_sample(&mut self, slot: SampleSlot, buffer: Arc<SampleBuffer>) {
        let mut player = SamplePlayer::new(buffer, self.sample_rate, slot.loops());
        player.set_gain(slot.default_gain());
        self.players[slot.index()] = Some(player);
    }

    /// Number of synthesized voices still sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Read position of a slot, in source frames.
    #[cfg(test)]
    pub(crate) fn position(&self, slot: SampleSlot) -> Option<f64> {
        self.player(slot).map(SamplePlayer::position)
    }

    fn player(&self, slot: SampleSlot) -> Option<&SamplePlayer> {
        self.players[slot.index()].as_ref()
    }

    fn player_mut(&mut self, slot: SampleSlot) -> Option<&mut SamplePlayer> {
        self.players[slot.index()].as_mut()
    }
}

impl AudioBackend for SoftwareBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn has_sample(&self, slot: SampleSlot) -> bool {
        self.player(slot).is_some()
    }

    fn start(&mut self, slot: SampleSlot) -> Result<(), AudioError> {
        if self.locked {
            return Err(AudioError::PlaybackBlocked);
        }
        let player = self.player_mut(slot).ok_or(AudioError::MissingSample(slot))?;
        player.play();
        Ok(())
    }

    fn stop(&mut self, slot: SampleSlot) {
        if let Some(p) = self.player_mut(slot) {
            p.pause();
        }
    }

    fn rewind(&mut self, slot: SampleSlot) {
        if let Some(p) = self.player_mut(slot) {
            p.rewind();
        }
    }

    fn is_playing(&self, slot: SampleSlot) -> bool {
        self.player(slot).is_some_and(SamplePlayer::is_playing)
    }

    fn playback_rate(&self, slot: SampleSlot) -> f64 {
        self.player(slot).map_or(1.0, SamplePlayer::playback_rate)
    }

    fn set_playback_rate(&mut self, slot: SampleSlot, rate: f64) {
        if let Some(p) = self.player_mut(slot) {
            p.set_playback_rate(rate);
        }
    }

    fn gain(&self, slot: SampleSlot) -> f64 {
        self.player(slot).map_or(0.0, SamplePlayer::gain)
    }

    fn set_gain(&mut self, slot: SampleSlot, gain: f64) {
        if let Some(p) = self.player_mut(slot) {
            p.set_gain(gain);
        }
    }

    fn play_voice(&mut self, voice: ToneVoice) -> Result<(), AudioError> {
        if self.locked {
            return Err(AudioError::PlaybackBlocked);
        }
        self.voices.push(voice);
        Ok(())
    }

    fn unlock(&mut self) {
        if self.locked {
            debug!("Audio output unlocked");
        }
        self.locked = false;
    }

    fn stop_all(&mut self) {
        for p in self.players.iter_mut().flatten() {
            p.pause();
            p.rewind();
        }
        self.voices.clear();
    }

    fn render(&mut self, out: &mut [f32]) {
        self.mixer.begin(out.len());
        for player in self.players.iter_mut().flatten() {
            if player.is_playing() {
                self.mixer.add_source(|| player.next_sample());
            }
        }
        for voice in self.voices.iter_mut() {
            self.mixer.add_source(|| voice.next_sample());
        }
        self.voices.retain(|v| !v.is_finished());
        self.mixer.finish(out);
    }
}
