//! Cluster configuration.
//!
//! Every section has defaults, so `{}` is a complete configuration. Asset
//! paths are independently optional; a missing one selects that effect's
//! fallback instead of failing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Top level ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub vehicle: VehicleConfig,
    pub audio: AudioConfig,
    pub assets: AssetPaths,
    pub startup: StartupConfig,
}

impl ClusterConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.vehicle;
        if !v.initial_fuel.is_finite() || !(0.0..=100.0).contains(&v.initial_fuel) {
            return Err(ConfigError::Invalid(format!(
                "vehicle.initial_fuel must be within 0..=100, got {}",
                v.initial_fuel
            )));
        }
        if !v.initial_trip_km.is_finite() || v.initial_trip_km < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "vehicle.initial_trip_km must be non-negative, got {}",
                v.initial_trip_km
            )));
        }
        let a = &self.audio;
        if !(8_000..=192_000).contains(&a.sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "audio.sample_rate must be within 8000..=192000, got {}",
                a.sample_rate
            )));
        }
        if !a.master_gain.is_finite() || !(0.0..=1.0).contains(&a.master_gain) {
            return Err(ConfigError::Invalid(format!(
                "audio.master_gain must be within 0..=1, got {}",
                a.master_gain
            )));
        }
        Ok(())
    }
}

// ── Sections ─────────────────────────────────────────────────

/// Initial vehicle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Tank level at start, percent.
    pub initial_fuel: f64,
    /// Trip meter reading at start, km.
    pub initial_trip_km: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            initial_fuel: 70.0,
            initial_trip_km: 124.0,
        }
    }
}

/// Audio output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Gain applied to the final mix.
    pub master_gain: f64,
    /// After this long, audio counts as ready even if nothing loaded.
    pub load_timeout_ms: u64,
    /// Start locked: all playback fails until the first user interaction.
    pub require_gesture: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            master_gain: 0.8,
            load_timeout_ms: 2_000,
            require_gesture: false,
        }
    }
}

/// Optional sample files. `.wav` always, `.mp3` with the `mp3` feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhaust_pop: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horn: Option<PathBuf>,
}

/// Dashboard startup sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Treat the dashboard as ready this long after session start. The
    /// default covers a 2 s greeting plus a 300 ms fade-in. `None` waits for
    /// the rendering side to signal readiness.
    pub dashboard_ready_after_ms: Option<u64>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            dashboard_ready_after_ms: Some(2_300),
        }
    }
}
