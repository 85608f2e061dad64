//! Sample playback.
//!
//! A [`SamplePlayer`] reads a [`SampleBuffer`] with linear interpolation at
//! an adjustable playback rate and gain. Rate changes shift pitch and tempo
//! together, like a tape, which is what the engine loop relies on.

use std::sync::Arc;

use super::oscillator::{Oscillator, Waveform};

/// A mono sample buffer loaded into memory.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let data: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        SampleBuffer { data, sample_rate }
    }

    /// Average interleaved frames down to mono.
    pub fn downmix(interleaved: &[f64], channels: usize, sample_rate: u32) -> Self {
        if channels <= 1 {
            return SampleBuffer::new(interleaved.to_vec(), sample_rate);
        }
        let data = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() {
                self.data[idx]
            } else {
                0.0
            };
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }

    /// Read with wrap-around, for seamless loops.
    fn read_looped(&self, position: f64) -> f64 {
        let len = self.data.len();
        let idx = position as usize % len;
        let frac = position.fract();
        let next = (idx + 1) % len;
        self.data[idx] * (1.0 - frac) + self.data[next] * frac
    }
}

/// Reference engine speed of the engine loop recording, in rpm.
pub const ENGINE_REFERENCE_RPM: f64 = 3500.0;

/// Synthesize one second of a loopable twin-cylinder drone at the reference rpm.
///
/// Stands in for a missing engine recording so the continuous tone can still
/// be retuned by playback rate. A four-stroke twin fires once per crankshaft
/// revolution, so the firing frequency is `rpm / 60`.
pub fn procedural_engine_loop(sample_rate: u32) -> SampleBuffer {
    let sr = sample_rate as f64;
    let firing_hz = ENGINE_REFERENCE_RPM / 60.0;
    // whole cycles per buffer keep the loop seamless
    let cycles = firing_hz.round();
    let len = (sr * cycles / firing_hz).round() as usize;
    let fundamental = cycles * sr / len as f64;

    let mut body = Oscillator::new(Waveform::Sawtooth, fundamental, sr);
    let mut bark = Oscillator::new(Waveform::Square, fundamental * 2.0, sr);
    let mut rumble = Oscillator::new(Waveform::Sine, fundamental / 2.0, sr);
    let data = (0..len)
        .map(|_| 0.5 * body.next_sample() + 0.2 * bark.next_sample() + 0.3 * rumble.next_sample())
        .map(|s| (s * 0.8).tanh())
        .collect();
    SampleBuffer::new(data, sample_rate)
}

/// Plays one buffer, looped or once, at an adjustable rate and gain.
///
/// Playing, pausing and rewinding are independent, mirroring a media
/// element: pausing keeps the position, rewinding does not stop playback.
#[derive(Debug, Clone)]
pub struct SamplePlayer {
    buffer: Arc<SampleBuffer>,
    /// Current read position in source frames (fractional).
    position: f64,
    playback_rate: f64,
    gain: f64,
    looping: bool,
    playing: bool,
    /// Source rate / output rate.
    sample_rate_ratio: f64,
}

impl SamplePlayer {
    pub fn new(buffer: Arc<SampleBuffer>, output_sample_rate: u32, looping: bool) -> Self {
        let sample_rate_ratio = buffer.sample_rate as f64 / output_sample_rate as f64;
        SamplePlayer {
            buffer,
            position: 0.0,
            playback_rate: 1.0,
            gain: 1.0,
            looping,
            playing: false,
            sample_rate_ratio,
        }
    }

    pub fn play(&mut self) {
        if !self.looping && self.position >= self.buffer.len() as f64 {
            self.position = 0.0;
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn rewind(&mut self) {
        self.position = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.playback_rate = rate;
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    /// Generate the next output sample.
    pub fn next_sample(&mut self) -> f64 {
        if !self.playing || self.buffer.is_empty() {
            return 0.0;
        }

        let sample = if self.looping {
            self.buffer.read_looped(self.position)
        } else {
            self.buffer.read_interpolated(self.position)
        };

        self.position += self.playback_rate * self.sample_rate_ratio;

        let len = self.buffer.len() as f64;
        if self.position >= len {
            if self.looping {
                self.position %= len;
            } else {
                self.playing = false;
            }
        }

        sample * self.gain
    }
}
