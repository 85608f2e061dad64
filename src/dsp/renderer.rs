//! Offline ride renderer. Plays a scripted ride through a [`Cluster`] and
//! writes the audio to a WAV byte buffer.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::EngineStats;
use crate::config::ClusterConfig;
use crate::error::{AudioError, ClusterError, ConfigError};
use crate::session::{Cluster, ClusterSnapshot};

/// A timed sequence of rider inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideScript {
    pub duration_ms: u64,
    #[serde(default)]
    pub events: Vec<RideEvent>,
}

/// Inputs applied at one instant. Unset controls keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RideEvent {
    pub at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brake: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_left: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_right: Option<bool>,
    pub horn: bool,
    pub user_interaction: bool,
    pub dashboard_ready: bool,
}

impl RideScript {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl RideEvent {
    fn apply(&self, cluster: &mut Cluster) {
        let mut controls = cluster.controls();
        if let Some(on) = self.throttle {
            controls.throttle_on = on;
        }
        if let Some(on) = self.brake {
            controls.brake_on = on;
        }
        if let Some(on) = self.turn_left {
            controls.turn_left_on = on;
        }
        if let Some(on) = self.turn_right {
            controls.turn_right_on = on;
        }
        if controls != cluster.controls() {
            cluster.set_controls(controls);
        }
        if self.user_interaction {
            cluster.user_interaction();
        }
        if self.dashboard_ready {
            cluster.dashboard_ready();
        }
        if self.horn {
            cluster.horn();
        }
    }
}

/// Audio and end state of a rendered ride.
#[derive(Debug, Clone)]
pub struct RenderedRide {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub last: ClusterSnapshot,
    pub stats: EngineStats,
}

/// Play `script` through a fresh session built from `config`.
pub fn render_ride(script: &RideScript, config: ClusterConfig) -> Result<RenderedRide, ClusterError> {
    let mut cluster = Cluster::new(config)?;
    let sample_rate = cluster.sample_rate();
    let mut samples = Vec::with_capacity((script.duration_ms * sample_rate as u64 / 1000) as usize);

    let mut events: Vec<&RideEvent> = script.events.iter().collect();
    events.sort_by_key(|e| e.at_ms);
    for event in events {
        if event.at_ms > script.duration_ms {
            debug!(at_ms = event.at_ms, "Ignoring ride event past the end");
            continue;
        }
        cluster.advance(event.at_ms.saturating_sub(cluster.now_ms()), &mut samples);
        event.apply(&mut cluster);
    }
    cluster.advance(script.duration_ms.saturating_sub(cluster.now_ms()), &mut samples);

    let ride = RenderedRide {
        samples,
        sample_rate,
        last: cluster.snapshot(),
        stats: cluster.stats(),
    };
    cluster.shutdown();
    Ok(ride)
}

/// Render `script` to a 16-bit mono WAV file as bytes.
pub fn render_ride_wav(script: &RideScript, config: ClusterConfig) -> Result<Vec<u8>, ClusterError> {
    let ride = render_ride(script, config)?;
    Ok(encode_wav(&ride.samples, ride.sample_rate)?)
}

/// Encode mono samples in `[-1, 1]` as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(bytes)
}
