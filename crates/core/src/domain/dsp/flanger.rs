//! Flanger: LFO-swept fractional delay

use super::delay::DelayLine;
use super::{flush_denormal, params, Effect};
use std::f32::consts::TAU;

/// Maximum sweep length in milliseconds
const BUFFER_MS: f32 = 20.0;

#[derive(Debug, Clone)]
pub struct Flanger {
    bypass: bool,
    line: DelayLine,
    sample_rate: f32,
    /// LFO phase in [0, 1)
    phase: f32,
    rate: f32,
    depth: f32,
    feedback: f32,
    mix: f32,
}

impl Flanger {
    pub const DEFAULT_RATE: f32 = 0.5;
    pub const DEFAULT_DEPTH: f32 = 0.7;
    pub const DEFAULT_FEEDBACK: f32 = 0.5;
    pub const DEFAULT_MIX: f32 = 0.5;

    pub fn new(sample_rate: u32) -> Self {
        let capacity = ((sample_rate as f32 * BUFFER_MS / 1000.0).round() as usize).max(4);
        Self {
            bypass: false,
            line: DelayLine::new(capacity),
            sample_rate: sample_rate as f32,
            phase: 0.0,
            rate: Self::DEFAULT_RATE,
            depth: Self::DEFAULT_DEPTH,
            feedback: Self::DEFAULT_FEEDBACK,
            mix: Self::DEFAULT_MIX,
        }
    }

    /// LFO rate in Hz
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = params::clamp_or(
            rate,
            params::FLANGER_RATE_MIN,
            params::FLANGER_RATE_MAX,
            Self::DEFAULT_RATE,
        );
    }

    /// Sweep depth as a fraction of the buffer
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = params::clamp_or(
            depth,
            params::FLANGER_DEPTH_MIN,
            params::FLANGER_DEPTH_MAX,
            Self::DEFAULT_DEPTH,
        );
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = params::clamp_or(
            feedback,
            params::FEEDBACK_MIN,
            params::FEEDBACK_MAX,
            Self::DEFAULT_FEEDBACK,
        );
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = params::clamp_or(mix, params::MIX_MIN, params::MIX_MAX, Self::DEFAULT_MIX);
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Current modulated delay in samples, always within `[1, capacity - 2]`
    #[inline]
    fn current_delay(&self) -> f32 {
        let lfo = 0.5 * (1.0 + (TAU * self.phase).sin());
        let sweep = (self.line.capacity() - 3) as f32;
        1.0 + lfo * self.depth * sweep
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.phase += self.rate / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let delayed = self.line.tap(self.current_delay());
        self.line.write(flush_denormal(x + delayed * self.feedback));
        x * (1.0 - self.mix) + delayed * self.mix
    }
}

impl Effect for Flanger {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn clear(&mut self) {
        self.line.clear();
        self.phase = 0.0;
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
        "Flanger"
    }
}
