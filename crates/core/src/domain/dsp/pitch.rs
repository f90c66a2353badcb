//! Pitch shifter (variable-rate resampler)
//!
//! Reads its upstream into an internal buffer and walks it with a fractional
//! cursor advancing by `factor` per output sample. Duration is not preserved:
//! a factor of 2.0 consumes upstream twice as fast, which is acceptable for
//! looping ambient sources.

use super::{params, peak};
use crate::domain::source::SampleSource;
use tracing::{debug, warn};

const INITIAL_CAPACITY: usize = 8192;
/// History kept behind the cursor across refills
const OVERLAP_SAMPLES: usize = 64;
/// Samples needed at and after the cursor for cubic interpolation
const INTERPOLATION_WINDOW: usize = 3;
/// Refill once the cursor passes this share of the valid data
const REFILL_THRESHOLD: f64 = 0.7;
/// Smallest upstream request
const MIN_CHUNK: usize = 1024;

const BYPASS_TOLERANCE: f32 = 0.005;

const GAIN_MIN: f32 = 0.1;
const GAIN_MAX: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct PitchShifter {
    factor: f32,
    buffer: Vec<f32>,
    /// Number of upstream samples stored at the head of `buffer`
    valid: usize,
    position: f64,
    output_gain: f32,
    clip: bool,
}

impl PitchShifter {
    pub const DEFAULT_FACTOR: f32 = 1.0;

    pub fn new() -> Self {
        Self {
            factor: Self::DEFAULT_FACTOR,
            buffer: vec![0.0; INITIAL_CAPACITY],
            valid: 0,
            position: 0.0,
            output_gain: GAIN_MAX,
            clip: true,
        }
    }

    /// Playback rate relative to the source, clamped to [0.5, 2.0]
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = params::clamp_or(
            factor,
            params::PITCH_MIN,
            params::PITCH_MAX,
            Self::DEFAULT_FACTOR,
        );
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Hard-clip the output to [-1, 1]
    pub fn set_clip(&mut self, clip: bool) {
        self.clip = clip;
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain
    }

    /// True when the factor is close enough to 1.0 to pass samples through
    pub fn is_bypassed(&self) -> bool {
        (self.factor - 1.0).abs() <= BYPASS_TOLERANCE
    }

    /// Drop buffered audio and reset the adaptive gain
    pub fn clear(&mut self) {
        self.valid = 0;
        self.position = 0.0;
        self.output_gain = GAIN_MAX;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Pull from `upstream` and write shifted samples into `out`
    ///
    /// Returns the number of samples produced. Less than `out.len()` only when
    /// the upstream ran dry and the buffered remainder was drained.
    pub fn read(&mut self, upstream: &mut dyn SampleSource, out: &mut [f32]) -> usize {
        if self.is_bypassed() {
            if self.valid > 0 {
                self.clear();
            }
            return upstream.read(out);
        }

        let factor = f64::from(self.factor);
        let mut upstream_dry = false;

        for i in 0..out.len() {
            if self.needs_refill(upstream_dry) {
                let wanted = ((out.len() - i) as f64 * factor).ceil() as usize
                    + INTERPOLATION_WINDOW
                    + 1;
                if !upstream_dry
                    && self.refill(upstream, wanted) == 0
                    && self.refill(upstream, wanted) == 0
                {
                    upstream_dry = true;
                }

                if self.starved() {
                    let produced = i + self.drain(&mut out[i..]);
                    let produced = produced + upstream.read(&mut out[produced..]);
                    debug!(produced, requested = out.len(), "Pitch shifter starved");
                    self.adapt_gain(&mut out[..produced]);
                    return produced;
                }
            }

            let mut sample = self.interpolate() * self.output_gain;
            if self.clip {
                sample = sample.clamp(-1.0, 1.0);
            }
            out[i] = sample;
            self.position += factor;
        }

        self.adapt_gain(out);
        out.len()
    }

    #[inline]
    fn starved(&self) -> bool {
        self.position as usize + INTERPOLATION_WINDOW > self.valid
    }

    #[inline]
    fn needs_refill(&self, upstream_dry: bool) -> bool {
        self.starved()
            || (!upstream_dry && self.position > self.valid as f64 * REFILL_THRESHOLD)
    }

    /// Compact unread data to the head and append upstream samples
    fn refill(&mut self, upstream: &mut dyn SampleSource, wanted: usize) -> usize {
        let keep_from = (self.position as usize)
            .saturating_sub(OVERLAP_SAMPLES)
            .min(self.valid);
        self.buffer.copy_within(keep_from..self.valid, 0);
        self.valid -= keep_from;
        self.position -= keep_from as f64;

        let request = wanted.max(MIN_CHUNK);
        let needed = self.valid + request;
        if needed > self.buffer.len() {
            let mut capacity = self.buffer.len().max(1);
            while capacity < needed {
                capacity *= 2;
            }
            debug!(capacity, "Growing pitch shifter buffer");
            self.buffer.resize(capacity, 0.0);
        }

        let got = upstream.read(&mut self.buffer[self.valid..needed]);
        self.valid += got;
        got
    }

    /// Copy the remaining buffered samples out unprocessed
    fn drain(&mut self, out: &mut [f32]) -> usize {
        let start = (self.position as usize).min(self.valid);
        let count = (self.valid - start).min(out.len());
        out[..count].copy_from_slice(&self.buffer[start..start + count]);

        self.position = (start + count) as f64;
        if start + count >= self.valid {
            self.valid = 0;
            self.position = 0.0;
        }
        count
    }

    /// Cubic Hermite at the cursor, linear near the edges
    #[inline]
    fn interpolate(&self) -> f32 {
        let index = self.position as usize;
        let t = (self.position - index as f64) as f32;
        let y = &self.buffer;

        if index >= 1 && index + 2 < self.valid {
            let (ym1, y0, y1, y2) = (y[index - 1], y[index], y[index + 1], y[index + 2]);
            let c1 = 0.5 * (y1 - ym1);
            let c2 = ym1 - 2.5 * y0 + 2.0 * y1 - 0.5 * y2;
            let c3 = 0.5 * (y2 - ym1) + 1.5 * (y0 - y1);
            ((c3 * t + c2) * t + c1) * t + y0
        } else if index + 1 < self.valid {
            y[index] + (y[index + 1] - y[index]) * t
        } else {
            y[index.min(self.valid.saturating_sub(1))]
        }
    }

    /// Per-block output gain adaptation
    fn adapt_gain(&mut self, block: &mut [f32]) {
        let level = peak(block);
        if level > 10.0 {
            warn!(peak = level, "Pitch shifter output blew up; halving gain");
            self.output_gain *= 0.5;
            for sample in block.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
        } else if level > 1.0 {
            self.output_gain *= 0.95;
        } else if level < 0.5 {
            self.output_gain *= 1.005;
        }
        self.output_gain = self.output_gain.clamp(GAIN_MIN, GAIN_MAX);
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_signals::{sine, SAMPLE_RATE};
    use crate::domain::source::BufferSource;

    fn zero_crossings(buffer: &[f32]) -> usize {
        buffer
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    /// Returns nothing on one chosen call, then resumes
    struct StutterSource {
        inner: BufferSource,
        skip_call: usize,
        calls: usize,
    }

    impl SampleSource for StutterSource {
        fn read(&mut self, buffer: &mut [f32]) -> usize {
            self.calls += 1;
            if self.calls == self.skip_call {
                return 0;
            }
            self.inner.read(buffer)
        }

        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
    }

    #[test]
    fn test_single_empty_read_is_retried() {
        let ramp: Vec<f32> = (0..48000).map(|i| i as f32 * 1e-5).collect();
        for skip_call in [1, 3] {
            let mut source = StutterSource {
                inner: BufferSource::new(ramp.clone(), SAMPLE_RATE),
                skip_call,
                calls: 0,
            };
            let mut shifter = PitchShifter::new();
            shifter.set_factor(1.5);

            let mut out = vec![0.0; 2048];
            for block in out.chunks_mut(512) {
                assert_eq!(shifter.read(&mut source, block), 512);
            }
            assert!(source.calls > skip_call);

            // Resampled ramp, not a pass-through of the upstream
            for (k, &y) in out.iter().enumerate() {
                let expected = 1.5 * k as f32 * 1e-5;
                assert!((y - expected).abs() < 1e-5, "skip {skip_call}: out[{k}] = {y}");
            }
        }
    }

    #[test]
    fn test_nan_factor_falls_back_to_unity() {
        let mut shifter = PitchShifter::new();
        shifter.set_factor(1.5);
        shifter.set_factor(f32::NAN);
        assert_eq!(shifter.factor(), PitchShifter::DEFAULT_FACTOR);

        let input = sine(2048, 440.0, 0.5);
        let mut source = BufferSource::new(input.clone(), SAMPLE_RATE);
        let mut out = vec![0.0; 2048];
        assert_eq!(shifter.read(&mut source, &mut out), 2048);
        assert_eq!(out, input);
    }

    #[test]
    fn test_bypass_is_sample_exact() {
        for factor in [0.995, 1.0, 1.005] {
            let input = sine(4096, 440.0, 0.8);
            let mut source = BufferSource::new(input.clone(), SAMPLE_RATE);
            let mut shifter = PitchShifter::new();
            shifter.set_factor(factor);
            assert!(shifter.is_bypassed());

            let mut out = vec![0.0; 4096];
            assert_eq!(shifter.read(&mut source, &mut out), 4096);
            assert_eq!(out, input);
        }
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let input = sine(SAMPLE_RATE as usize * 2, 200.0, 0.4);
        let mut source = BufferSource::new(input, SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(2.0);

        let mut out = vec![0.0; SAMPLE_RATE as usize];
        for block in out.chunks_mut(512) {
            assert_eq!(shifter.read(&mut source, block), block.len());
        }

        // 400 Hz => ~800 crossings per second
        let crossings = zero_crossings(&out);
        assert!((720..=880).contains(&crossings), "crossings {crossings}");
    }

    #[test]
    fn test_octave_down_halves_frequency() {
        let input = sine(SAMPLE_RATE as usize, 400.0, 0.4);
        let mut source = BufferSource::new(input, SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(0.5);

        let mut out = vec![0.0; SAMPLE_RATE as usize];
        for block in out.chunks_mut(480) {
            shifter.read(&mut source, block);
        }

        let crossings = zero_crossings(&out);
        assert!((360..=440).contains(&crossings), "crossings {crossings}");
    }

    #[test]
    fn test_starvation_drains_then_stops() {
        let mut source = BufferSource::new(vec![0.25; 1000], SAMPLE_RATE);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(1.5);

        let mut total = 0;
        let mut out = vec![0.0; 256];
        for _ in 0..10 {
            let produced = shifter.read(&mut source, &mut out);
            assert!(produced <= out.len());
            assert!(out[..produced].iter().all(|y| y.is_finite()));
            total += produced;
        }
        assert!(total > 0);
        assert_eq!(shifter.read(&mut source, &mut out), 0);
    }

    #[test]
    fn test_hot_input_lowers_gain() {
        let input = sine(SAMPLE_RATE as usize, 220.0, 3.0);
        let mut source = BufferSource::new(input, SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(1.5);
        shifter.set_clip(false);

        let mut out = vec![0.0; 512];
        for _ in 0..20 {
            shifter.read(&mut source, &mut out);
        }
        assert!(shifter.output_gain() < 1.0);
        assert!(shifter.output_gain() >= 0.1);
    }

    #[test]
    fn test_blown_up_block_is_clipped() {
        let mut source = BufferSource::new(vec![50.0; 8192], SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(1.25);
        shifter.set_clip(false);

        let mut out = vec![0.0; 512];
        shifter.read(&mut source, &mut out);
        assert!(out.iter().all(|y| y.abs() <= 1.0));
        assert_eq!(shifter.output_gain(), 0.5);
    }

    #[test]
    fn test_quiet_input_keeps_unity_gain() {
        let input = sine(SAMPLE_RATE as usize, 220.0, 0.2);
        let mut source = BufferSource::new(input, SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(0.75);

        let mut out = vec![0.0; 512];
        for _ in 0..10 {
            shifter.read(&mut source, &mut out);
        }
        assert_eq!(shifter.output_gain(), 1.0);
    }

    #[test]
    fn test_large_blocks_grow_buffer() {
        let mut source = BufferSource::new(vec![0.1; 1024], SAMPLE_RATE).looping(true);
        let mut shifter = PitchShifter::new();
        shifter.set_factor(2.0);

        let mut out = vec![0.0; 16384];
        assert_eq!(shifter.read(&mut source, &mut out), out.len());
        assert!(shifter.capacity() > INITIAL_CAPACITY);
        assert!(shifter.capacity().is_power_of_two());
    }

    #[test]
    fn test_factor_clamping_and_bypass_reset() {
        let mut shifter = PitchShifter::new();
        shifter.set_factor(4.0);
        assert_eq!(shifter.factor(), 2.0);
        shifter.set_factor(0.1);
        assert_eq!(shifter.factor(), 0.5);

        let mut source = BufferSource::new(vec![0.3; 4096], SAMPLE_RATE);
        let mut out = vec![0.0; 128];
        shifter.read(&mut source, &mut out);
        assert!(shifter.valid > 0);

        shifter.set_factor(1.0);
        shifter.read(&mut source, &mut out);
        assert_eq!(shifter.valid, 0);
    }
}
