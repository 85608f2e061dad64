//! Sums sources into an output block with master gain.

/// Accumulates one block of mono audio from several sources.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
}

impl Mixer {
    pub fn new(master_gain: f64) -> Self {
        Mixer {
            master_gain,
            buffer: Vec::new(),
        }
    }

    /// Start a new block of `num_samples` zeros. Keeps the allocation.
    pub fn begin(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
    }

    /// Add a whole source into the block, one sample per slot.
    pub fn add_source(&mut self, mut source: impl FnMut() -> f64) {
        for slot in self.buffer.iter_mut() {
            *slot += source();
        }
    }

    /// Write the block to `out` with master gain and soft clipping.
    pub fn finish(&self, out: &mut [f32]) {
        for (dst, &s) in out.iter_mut().zip(&self.buffer) {
            *dst = soft_clip(s * self.master_gain) as f32;
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Mixer::new(0.8)
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
