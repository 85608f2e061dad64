//! DSP: pure Rust sound generation for the cluster.
//!
//! All synthesis and mixing runs in Rust for deterministic output. The same
//! code feeds the browser (via WASM and an AudioWorklet), the live device
//! output and the offline WAV renderer.

pub mod assets;
pub mod backend;
pub mod engine;
pub mod envelope;
pub mod mixer;
pub mod oscillator;
pub mod output;
pub mod renderer;
pub mod sampler;
pub mod voice;
