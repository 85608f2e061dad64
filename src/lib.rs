pub mod clock;
pub mod config;
pub mod dsp;
pub mod error;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod session;
pub mod timer;
pub mod trigger;
pub mod vehicle;

pub use crate::config::ClusterConfig;
pub use crate::error::{AudioError, ClusterError, ConfigError};
pub use crate::session::{Cluster, ClusterSnapshot};
pub use crate::vehicle::{ControlInputs, VehicleState};

use crate::dsp::backend::SampleSlot;
use crate::dsp::renderer::RideScript;
use crate::dsp::sampler::SampleBuffer;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the gt650-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// Wrap decoded PCM from the host. A sample with no frames or no rate
/// would never finish playing.
fn pcm_sample(slot: SampleSlot, pcm: &[f32], sample_rate: u32) -> Result<SampleBuffer, AudioError> {
    if pcm.is_empty() {
        return Err(AudioError::InvalidPcm { slot, reason: "no frames" });
    }
    if sample_rate == 0 {
        return Err(AudioError::InvalidPcm { slot, reason: "zero sample rate" });
    }
    Ok(SampleBuffer::from_f32(pcm, sample_rate))
}

fn config_from_js(config: JsValue) -> Result<ClusterConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(ClusterConfig::default());
    }
    let config: ClusterConfig = serde_wasm_bindgen::from_value(config).map_err(js_error)?;
    config.validate().map_err(js_error)?;
    Ok(config)
}

/// WASM-exposed: render a ride script (JSON object) to a 16-bit mono WAV byte array.
#[wasm_bindgen]
pub fn render_ride_wav(script: JsValue, config: JsValue) -> Result<Vec<u8>, JsValue> {
    let script: RideScript = serde_wasm_bindgen::from_value(script).map_err(js_error)?;
    let config = config_from_js(config)?;
    dsp::renderer::render_ride_wav(&script, config).map_err(js_error)
}

/// WASM-exposed cluster session. The page drives time from its audio
/// worklet: each `advance` returns the mono samples for that span.
#[wasm_bindgen]
pub struct WasmCluster {
    inner: Cluster,
    block: Vec<f32>,
}

#[wasm_bindgen]
impl WasmCluster {
    /// Start a session. Samples arrive later through `load_sample`.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmCluster, JsValue> {
        let config = config_from_js(config)?;
        let inner = Cluster::without_samples(config).map_err(js_error)?;
        Ok(WasmCluster {
            inner,
            block: Vec::new(),
        })
    }

    /// Replace the control inputs (`{ throttleOn, brakeOn, turnLeftOn, turnRightOn }`).
    pub fn set_controls(&mut self, controls: JsValue) -> Result<(), JsValue> {
        let controls: ControlInputs = serde_wasm_bindgen::from_value(controls).map_err(js_error)?;
        self.inner.set_controls(controls);
        Ok(())
    }

    /// Advance by `dt_ms` and return the audio for that span.
    pub fn advance(&mut self, dt_ms: u32) -> Vec<f32> {
        self.block.clear();
        self.inner.advance(dt_ms as u64, &mut self.block);
        self.block.clone()
    }

    /// Latest vehicle snapshot, controls and engine tuning.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.snapshot()).map_err(js_error)
    }

    pub fn horn(&mut self) {
        self.inner.horn();
    }

    pub fn user_interaction(&mut self) {
        self.inner.user_interaction();
    }

    pub fn dashboard_ready(&mut self) {
        self.inner.dashboard_ready();
    }

    /// Install decoded PCM for `"engine"`, `"exhaustPop"` or `"horn"`.
    pub fn load_sample(&mut self, slot: JsValue, pcm: Vec<f32>, sample_rate: u32) -> Result<(), JsValue> {
        let slot: SampleSlot = serde_wasm_bindgen::from_value(slot).map_err(js_error)?;
        let buffer = pcm_sample(slot, &pcm, sample_rate).map_err(js_error)?;
        self.inner.load_sample(slot, buffer);
        Ok(())
    }

    /// Every sample that is going to load has loaded.
    pub fn samples_loaded(&mut self) {
        self.inner.mark_audio_ready();
    }

    pub fn shutdown(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_sample_rejects_zero_rate_and_empty_pcm() {
        assert!(matches!(
            pcm_sample(SampleSlot::Horn, &[0.1, 0.2], 0),
            Err(AudioError::InvalidPcm { slot: SampleSlot::Horn, .. })
        ));
        assert!(matches!(
            pcm_sample(SampleSlot::ExhaustPop, &[], 44100),
            Err(AudioError::InvalidPcm { slot: SampleSlot::ExhaustPop, .. })
        ));
        let buffer = pcm_sample(SampleSlot::Engine, &[0.5, -0.5], 22050).unwrap();
        assert_eq!(buffer.sample_rate, 22050);
        assert_eq!(buffer.data, vec![0.5, -0.5]);
    }
}
