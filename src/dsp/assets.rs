//! Sample asset decoding.
//!
//! WAV is always available through `hound`; MP3 needs the `mp3` feature.
//! Loading a [`SampleBank`] never fails as a whole: each slot that cannot be
//! decoded is logged and left empty so its fallback takes over.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::backend::SampleSlot;
use super::sampler::SampleBuffer;
use crate::config::AssetPaths;
use crate::error::AudioError;

/// Decoded samples for the three sample-backed effects.
#[derive(Debug, Clone, Default)]
pub struct SampleBank {
    pub engine: Option<Arc<SampleBuffer>>,
    pub exhaust_pop: Option<Arc<SampleBuffer>>,
    pub horn: Option<Arc<SampleBuffer>>,
}

impl SampleBank {
    /// An empty bank: every effect uses its fallback.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode every configured asset. Failures are logged, not returned.
    pub fn load(paths: &AssetPaths) -> Self {
        let mut bank = SampleBank::empty();
        for slot in SampleSlot::ALL {
            let Some(path) = paths.get(slot) else {
                continue;
            };
            match load_sample(path) {
                Ok(buffer) => {
                    info!(
                        ?slot,
                        path = %path.display(),
                        seconds = buffer.duration(),
                        "Loaded sample"
                    );
                    bank.set(slot, Arc::new(buffer));
                }
                Err(e) => warn!(?slot, path = %path.display(), "Sample unavailable, using fallback: {e}"),
            }
        }
        bank
    }

    pub fn get(&self, slot: SampleSlot) -> Option<&Arc<SampleBuffer>> {
        match slot {
            SampleSlot::Engine => self.engine.as_ref(),
            SampleSlot::ExhaustPop => self.exhaust_pop.as_ref(),
            SampleSlot::Horn => self.horn.as_ref(),
        }
    }

    pub fn set(&mut self, slot: SampleSlot, buffer: Arc<SampleBuffer>) {
        match slot {
            SampleSlot::Engine => self.engine = Some(buffer),
            SampleSlot::ExhaustPop => self.exhaust_pop = Some(buffer),
            SampleSlot::Horn => self.horn = Some(buffer),
        }
    }

    pub fn is_empty(&self) -> bool {
        SampleSlot::ALL.iter().all(|&s| self.get(s).is_none())
    }
}

impl AssetPaths {
    pub fn get(&self, slot: SampleSlot) -> Option<&Path> {
        match slot {
            SampleSlot::Engine => self.engine.as_deref(),
            SampleSlot::ExhaustPop => self.exhaust_pop.as_deref(),
            SampleSlot::Horn => self.horn.as_deref(),
        }
    }
}

/// Decode a sample file to mono, picking the decoder by extension.
pub fn load_sample(path: &Path) -> Result<SampleBuffer, AudioError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let buffer = match ext.as_deref() {
        Some("wav") => {
            let file = std::fs::File::open(path).map_err(|source| AudioError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            decode_wav(std::io::BufReader::new(file))?
        }
        #[cfg(feature = "mp3")]
        Some("mp3") => {
            let file = std::fs::File::open(path).map_err(|source| AudioError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            decode_mp3(file, path)?
        }
        _ => return Err(AudioError::UnsupportedFormat(path.to_path_buf())),
    };
    if buffer.is_empty() {
        return Err(AudioError::EmptySample(path.to_path_buf()));
    }
    Ok(buffer)
}

/// Decode WAV data (integer or float PCM, any channel count) to mono.
pub fn decode_wav<R: Read>(reader: R) -> Result<SampleBuffer, AudioError> {
    let mut reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    let interleaved: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(SampleBuffer::downmix(
        &interleaved,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

/// Decode MP3 frames to mono.
#[cfg(feature = "mp3")]
pub fn decode_mp3<R: Read>(reader: R, path: &Path) -> Result<SampleBuffer, AudioError> {
    let mut decoder = minimp3::Decoder::new(reader);
    let mut mono = Vec::new();
    let mut sample_rate = 0_u32;
    loop {
        match decoder.next_frame() {
            Ok(minimp3::Frame {
                data,
                sample_rate: rate,
                channels,
                ..
            }) => {
                sample_rate = rate as u32;
                let frame: Vec<f64> = data.iter().map(|&s| s as f64 / 32768.0).collect();
                mono.extend(SampleBuffer::downmix(&frame, channels, sample_rate).data);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => {
                return Err(AudioError::Mp3 {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(SampleBuffer::new(mono, sample_rate))
}
