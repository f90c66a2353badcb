//! Circular delay line and the echo effect built on it

use super::{flush_denormal, params, Effect};

/// Fixed-capacity circular buffer with a movable active length
///
/// Storage is allocated once; changing the active length never reallocates.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    length: usize,
    cursor: usize,
}

impl DelayLine {
    /// Allocate `capacity` samples, all of them active
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            length: capacity,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Active length in samples
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Change the active length, resetting the line to silence
    ///
    /// The length is clamped to `[1, capacity]`.
    pub fn set_len(&mut self, length: usize) {
        self.length = length.clamp(1, self.buffer.len());
        self.clear();
    }

    /// Oldest sample in the line, written `len()` samples ago
    #[inline]
    pub fn read(&self) -> f32 {
        self.buffer[self.cursor]
    }

    /// Overwrite the oldest sample and advance
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.cursor] = sample;
        self.cursor += 1;
        if self.cursor >= self.length {
            self.cursor = 0;
        }
    }

    /// Sample written `delay` samples ago, linearly interpolated
    ///
    /// `delay` is expected in `[1, len() - 1]`; values outside are wrapped.
    #[inline]
    pub fn tap(&self, delay: f32) -> f32 {
        let len = self.length;
        let whole = delay.max(0.0).floor();
        let frac = delay - whole;
        let whole = whole as usize % len;

        let newer = self.buffer[(self.cursor + len - whole) % len];
        let older = self.buffer[(self.cursor + 2 * len - whole - 1) % len];
        newer + (older - newer) * frac
    }

    /// Zero the active range and rewind the cursor
    pub fn clear(&mut self) {
        self.buffer[..self.length].fill(0.0);
        self.cursor = 0;
    }
}

/// Echo: one delay line with feedback and wet/dry blend
#[derive(Debug, Clone)]
pub struct EchoLine {
    bypass: bool,
    line: DelayLine,
    sample_rate: u32,
    delay_ms: f32,
    feedback: f32,
    mix: f32,
}

impl EchoLine {
    pub const DEFAULT_DELAY_MS: f32 = 500.0;
    pub const DEFAULT_FEEDBACK: f32 = 0.4;
    pub const DEFAULT_MIX: f32 = 0.5;

    /// Create an echo with storage for the longest supported delay
    pub fn new(sample_rate: u32) -> Self {
        let capacity = Self::samples_for(sample_rate, params::ECHO_DELAY_MAX_MS);
        let mut echo = Self {
            bypass: false,
            line: DelayLine::new(capacity),
            sample_rate,
            delay_ms: 0.0,
            feedback: Self::DEFAULT_FEEDBACK,
            mix: Self::DEFAULT_MIX,
        };
        echo.set_delay_ms(Self::DEFAULT_DELAY_MS);
        echo
    }

    fn samples_for(sample_rate: u32, delay_ms: f32) -> usize {
        (sample_rate as f32 * delay_ms / 1000.0).round() as usize
    }

    /// Set the delay time
    ///
    /// A change in length silences the line: stored echoes are dropped rather
    /// than replayed at the wrong spacing.
    pub fn set_delay_ms(&mut self, delay_ms: f32) {
        let delay_ms = params::clamp_or(
            delay_ms,
            params::ECHO_DELAY_MIN_MS,
            params::ECHO_DELAY_MAX_MS,
            Self::DEFAULT_DELAY_MS,
        );
        self.delay_ms = delay_ms;

        let length = Self::samples_for(self.sample_rate, delay_ms);
        if length != self.line.len() {
            self.line.set_len(length);
        }
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

    pub fn delay_ms(&self) -> f32 {
        self.delay_ms
    }

    /// Active delay in samples
    pub fn delay_samples(&self) -> usize {
        self.line.len()
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let echo = self.line.read();
        self.line.write(flush_denormal(x + echo * self.feedback));
        x * (1.0 - self.mix) + echo * self.mix
    }
}

impl Effect for EchoLine {
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
        "Echo"
    }
}
