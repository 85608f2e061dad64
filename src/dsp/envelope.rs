//! Breakpoint gain envelopes.
//!
//! An envelope is a list of breakpoints, each reached through a step or an
//! exponential ramp from the previous value. Exponential
//! ramps cannot start or end at zero, so their endpoints are floored at
//! [`EXP_FLOOR`].

/// Smallest value an exponential ramp will use as an endpoint.
pub const EXP_FLOOR: f64 = 1e-4;

/// How a breakpoint is approached from the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// Jump to the value at the breakpoint time.
    Step,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    time: f64,
    value: f64,
    curve: Curve,
}

/// Gain automation over time, sampled at a fixed rate.
#[derive(Debug, Clone)]
pub struct GainEnvelope {
    initial: f64,
    points: Vec<Breakpoint>,
    sample_rate: f64,
    cursor: usize,
}

impl GainEnvelope {
    /// Start at `initial` gain.
    pub fn new(initial: f64, sample_rate: f64) -> Self {
        GainEnvelope {
            initial,
            points: Vec::new(),
            sample_rate,
            cursor: 0,
        }
    }

    /// Hold the current value until `time`, then jump to `value`.
    pub fn set_at(mut self, time: f64, value: f64) -> Self {
        self.push(time, value, Curve::Step);
        self
    }

    pub fn exponential_to(mut self, time: f64, value: f64) -> Self {
        self.push(time, value, Curve::Exponential);
        self
    }

    fn push(&mut self, time: f64, value: f64, curve: Curve) {
        debug_assert!(
            self.points.last().map_or(true, |p| p.time <= time),
            "breakpoints must be added in time order"
        );
        self.points.push(Breakpoint { time, value, curve });
    }

    /// Length of the envelope in seconds: the time of its last breakpoint.
    pub fn duration(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time)
    }

    /// Length in whole samples.
    pub fn duration_samples(&self) -> usize {
        (self.duration() * self.sample_rate).round() as usize
    }

    /// Highest value the envelope reaches.
    pub fn peak(&self) -> f64 {
        self.points.iter().map(|p| p.value).fold(self.initial, f64::max)
    }

    /// Gain at time `t` (seconds since the envelope started).
    pub fn value_at(&self, t: f64) -> f64 {
        let mut prev_time = 0.0;
        let mut prev_value = self.initial;
        for p in &self.points {
            if t < p.time {
                return interpolate(prev_time, prev_value, p, t);
            }
            prev_time = p.time;
            prev_value = p.value;
        }
        prev_value
    }

    /// Gain for the next sample; the cursor advances one sample per call.
    pub fn next_sample(&mut self) -> f64 {
        let t = self.cursor as f64 / self.sample_rate;
        self.cursor += 1;
        self.value_at(t)
    }

    /// True once every sample of the envelope has been produced.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.duration_samples()
    }
}

fn interpolate(t0: f64, v0: f64, to: &Breakpoint, t: f64) -> f64 {
    let span = to.time - t0;
    if span <= 0.0 {
        return to.value;
    }
    let x = ((t - t0) / span).clamp(0.0, 1.0);
    match to.curve {
        Curve::Step => v0,
        Curve::Exponential => {
            let a = v0.max(EXP_FLOOR);
            let b = to.value.max(EXP_FLOOR);
            a * (b / a).powf(x)
        }
    }
}
