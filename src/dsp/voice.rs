//! Synthesized one-shot sounds: summed oscillators under a master
//! gain envelope.

use super::envelope::GainEnvelope;
use super::oscillator::Oscillator;

/// Horn fallback: two sine tones a minor third apart.
pub const HORN_TONES_HZ: [f64; 2] = [415.0, 495.0];
/// Per-tone gain before the master envelope.
pub const HORN_TONE_GAIN: f64 = 0.4;
/// Master envelope peak.
pub const HORN_PEAK_GAIN: f64 = 0.6;
/// Attack, hold-until and end times of the horn envelope (seconds).
pub const HORN_ATTACK_S: f64 = 0.03;
pub const HORN_HOLD_UNTIL_S: f64 = 0.4;
pub const HORN_DURATION_S: f64 = 0.45;

/// Turn-indicator click.
pub const CLICK_FREQ_HZ: f64 = 800.0;
pub const CLICK_GAIN: f64 = 0.2;
pub const CLICK_TAIL_GAIN: f64 = 0.01;
pub const CLICK_DURATION_S: f64 = 0.05;

/// One oscillator and its fixed gain inside a voice.
#[derive(Debug, Clone)]
pub struct Partial {
    pub oscillator: Oscillator,
    pub gain: f64,
}

/// A fire-and-forget synthesized sound.
#[derive(Debug, Clone)]
pub struct ToneVoice {
    partials: Vec<Partial>,
    envelope: GainEnvelope,
    finished: bool,
}

impl ToneVoice {
    pub fn new(partials: Vec<Partial>, envelope: GainEnvelope) -> Self {
        ToneVoice {
            partials,
            envelope,
            finished: false,
        }
    }

    /// Dual-tone electric horn: 415 Hz + 495 Hz, fast exponential attack
    /// to 0.6, held until 400 ms, exponential release to 0.01 by 450 ms.
    pub fn horn(sample_rate: f64) -> Self {
        let partials = HORN_TONES_HZ
            .iter()
            .map(|&f| Partial {
                oscillator: Oscillator::sine(f, sample_rate),
                gain: HORN_TONE_GAIN,
            })
            .collect();
        let envelope = GainEnvelope::new(0.0, sample_rate)
            .exponential_to(HORN_ATTACK_S, HORN_PEAK_GAIN)
            .set_at(HORN_HOLD_UNTIL_S, HORN_PEAK_GAIN)
            .exponential_to(HORN_DURATION_S, 0.01);
        ToneVoice::new(partials, envelope)
    }

    /// Short 800 Hz blip for the turn indicator relay.
    pub fn turn_click(sample_rate: f64) -> Self {
        let partials = vec![Partial {
            oscillator: Oscillator::sine(CLICK_FREQ_HZ, sample_rate),
            gain: 1.0,
        }];
        let envelope = GainEnvelope::new(CLICK_GAIN, sample_rate)
            .exponential_to(CLICK_DURATION_S, CLICK_TAIL_GAIN);
        ToneVoice::new(partials, envelope)
    }

    pub fn partials(&self) -> &[Partial] {
        &self.partials
    }

    pub fn envelope(&self) -> &GainEnvelope {
        &self.envelope
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.envelope.duration()
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        if self.finished {
            return 0.0;
        }

        let sum: f64 = self
            .partials
            .iter_mut()
            .map(|p| p.oscillator.next_sample() * p.gain)
            .sum();
        let env = self.envelope.next_sample();

        if self.envelope.is_finished() {
            self.finished = true;
        }

        sum * env
    }

    /// Is this voice done (envelope finished)?
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
