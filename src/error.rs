use std::path::PathBuf;

use thiserror::Error;

use crate::dsp::backend::SampleSlot;

/// Top-level error for building a cluster session.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

/// Errors raised while reading or validating a [`crate::config::ClusterConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors from the audio subsystem.
///
/// None of these are fatal: the engine logs them and keeps ticking.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Playback blocked until the first user interaction")]
    PlaybackBlocked,

    #[error("No sample loaded for {0:?}")]
    MissingSample(SampleSlot),

    #[error("Failed to read sample '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("MP3 decode error in '{}': {message}", path.display())]
    Mp3 { path: PathBuf, message: String },

    #[error("Unsupported sample format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Sample '{}' decoded to zero frames", .0.display())]
    EmptySample(PathBuf),

    #[error("Rejected PCM for {slot:?}: {reason}")]
    InvalidPcm { slot: SampleSlot, reason: &'static str },

    #[error("Audio device error: {0}")]
    Device(String),
}

impl AudioError {
    /// Blocked playback is an expected condition before the first gesture.
    pub fn is_blocked(&self) -> bool {
        matches!(self, AudioError::PlaybackBlocked)
    }
}
