//! Anomaly cleaner and adaptive normalizer
//!
//! Both sit at the front of every chain: the cleaner tames corrupt or
//! clipped source material sample by sample, the normalizer evens out the
//! level block by block and ends in a hard limiter.

use super::{params, peak, Effect};

// ============================================================================
// ANOMALY CLEANER
// ============================================================================

/// Consecutive extreme samples before a run counts as sustained corruption
const SUSTAINED_RUN: usize = 100;
const SUSTAINED_ATTENUATION: f32 = 0.5;

/// Soft-knee suppressor for out-of-range and non-finite samples
#[derive(Debug, Clone)]
pub struct AnomalyCleaner {
    bypass: bool,
    threshold: f32,
    extreme_run: usize,
}

impl AnomalyCleaner {
    pub const DEFAULT_THRESHOLD: f32 = 0.95;

    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            bypass: false,
            threshold: params::clamp_or(threshold, 0.1, 1.0, Self::DEFAULT_THRESHOLD),
            extreme_run: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    fn clean_sample(&mut self, x: f32) -> f32 {
        if !x.is_finite() {
            self.extreme_run += 1;
            return 0.0;
        }

        let magnitude = x.abs();
        if magnitude <= self.threshold {
            self.extreme_run = 0;
            return x;
        }

        self.extreme_run += 1;
        let headroom = 1.0 - self.threshold;
        let excess = magnitude - self.threshold;
        let mut y = (self.threshold + headroom * (1.0 - (-excess).exp())).copysign(x);
        if self.extreme_run > SUSTAINED_RUN {
            y *= SUSTAINED_ATTENUATION;
        }
        y
    }
}

impl Default for AnomalyCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for AnomalyCleaner {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample = self.clean_sample(*sample);
        }
    }

    fn clear(&mut self) {
        self.extreme_run = 0;
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.clear();
        }
    }

    fn name(&self) -> &str {
        "Anomaly Cleaner"
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

const HISTORY_LEN: usize = 5;
/// Averages above this are compressed logarithmically
const HOT_LEVEL: f32 = 1.5;
/// Share of the excess over target removed in the mild zone
const MILD_REDUCTION: f32 = 0.9;
/// Below this average the material is treated as silence
const SILENCE_FLOOR: f32 = 1.0e-3;
const MAX_GAIN: f32 = 4.0;
const LIMIT: f32 = 0.99;

/// Peak-tracking adaptive gain with a hard limiter
#[derive(Debug, Clone)]
pub struct Normalizer {
    bypass: bool,
    target: f32,
    smoothing: f32,
    history: [f32; HISTORY_LEN],
    history_pos: usize,
    history_filled: usize,
    gain: f32,
}

impl Normalizer {
    pub const DEFAULT_TARGET: f32 = 0.9;
    pub const DEFAULT_SMOOTHING: f32 = 0.9;

    pub fn new() -> Self {
        Self::with_params(Self::DEFAULT_TARGET, Self::DEFAULT_SMOOTHING)
    }

    /// `target` is the desired block peak, `smoothing` the per-block
    /// exponential smoothing constant (0 = jump immediately)
    pub fn with_params(target: f32, smoothing: f32) -> Self {
        Self {
            bypass: false,
            target: params::clamp_or(target, 0.1, LIMIT, Self::DEFAULT_TARGET),
            smoothing: params::clamp_or(smoothing, 0.0, 0.999, Self::DEFAULT_SMOOTHING),
            history: [0.0; HISTORY_LEN],
            history_pos: 0,
            history_filled: 0,
            gain: 1.0,
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Smoothed gain applied to the last block
    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn push_peak(&mut self, level: f32) -> f32 {
        self.history[self.history_pos] = level;
        self.history_pos = (self.history_pos + 1) % HISTORY_LEN;
        self.history_filled = (self.history_filled + 1).min(HISTORY_LEN);
        self.history[..self.history_filled].iter().sum::<f32>() / self.history_filled as f32
    }

    /// Gain that would bring `average` to the target
    fn desired_gain(&self, average: f32) -> f32 {
        if average < SILENCE_FLOOR {
            1.0
        } else if average <= self.target {
            (self.target / average).min(MAX_GAIN)
        } else if average <= HOT_LEVEL {
            let reduced = self.target + (average - self.target) * (1.0 - MILD_REDUCTION);
            reduced / average
        } else {
            self.target / (average * (1.0 + (average / HOT_LEVEL).ln()))
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Normalizer {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass || buffer.is_empty() {
            return;
        }

        let average = self.push_peak(peak(buffer));
        let desired = self.desired_gain(average);
        self.gain = self.smoothing * self.gain + (1.0 - self.smoothing) * desired;

        for sample in buffer.iter_mut() {
            *sample = (*sample * self.gain).clamp(-LIMIT, LIMIT);
        }
    }

    fn clear(&mut self) {
        self.history = [0.0; HISTORY_LEN];
        self.history_pos = 0;
        self.history_filled = 0;
        self.gain = 1.0;
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.clear();
        }
    }

    fn name(&self) -> &str {
        "Normalizer"
    }
}
