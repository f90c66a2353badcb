//! Freeverb-style reverb
//!
//! Eight damped feedback combs per tap run in parallel, followed by four
//! serial allpass diffusers. The right tap uses the same tunings offset by a
//! fixed stereo spread; a mono stream blends both taps through `width`.

use super::{flush_denormal, params, Effect};

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const TUNING_RATE: f32 = 44100.0;

const FIXED_GAIN: f32 = 0.015;
const SCALE_WET: f32 = 3.0;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;
const SCALE_DAMP: f32 = 0.4;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Highest comb feedback outside freeze
const MAX_FEEDBACK: f32 = 0.98;
const FREEZE_FEEDBACK: f32 = 0.999;

const INPUT_LIMIT: f32 = 0.95;
const WET_LIMIT: f32 = 0.95;
const OUTPUT_LIMIT: f32 = 0.98;

/// Decay time above which extra damping is added
const LONG_TAIL_SECS: f32 = 5.0;
const BASE_DAMPING: f32 = 0.5;

fn scaled(tuning: usize, sample_rate: f32) -> usize {
    ((tuning as f32 * sample_rate / TUNING_RATE).round() as usize).max(1)
}

/// Mean comb delay in seconds (sample-rate independent)
fn mean_comb_delay() -> f32 {
    COMB_TUNINGS.iter().sum::<usize>() as f32 / COMB_TUNINGS.len() as f32 / TUNING_RATE
}

// ============================================================================
// BUILDING BLOCKS
// ============================================================================

/// Feedback comb with a one-pole lowpass in the loop
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = flush_denormal(output * damp2 + self.filter_store * damp1);
        self.buffer[self.index] = flush_denormal(input + self.filter_store * feedback);

        self.index += 1;
        if self.index >= self.buffer.len() {
            self.index = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

/// Schroeder allpass diffuser
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = flush_denormal(input + buffered * ALLPASS_FEEDBACK);

        self.index += 1;
        if self.index >= self.buffer.len() {
            self.index = 0;
        }
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// One tap: parallel combs into serial allpasses
#[derive(Debug, Clone)]
struct Tap {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Tap {
    fn new(sample_rate: f32, spread: usize) -> Self {
        Self {
            combs: COMB_TUNINGS
                .iter()
                .map(|&t| Comb::new(scaled(t + spread, sample_rate)))
                .collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .map(|&t| Allpass::new(scaled(t + spread, sample_rate)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let mut acc = 0.0;
        for comb in &mut self.combs {
            acc += comb.process(input, feedback, damp1, damp2);
        }
        for allpass in &mut self.allpasses {
            acc = allpass.process(acc);
        }
        acc.clamp(-WET_LIMIT, WET_LIMIT)
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}

// ============================================================================
// REVERB
// ============================================================================

/// Freeverb reverb with normal and frozen modes
#[derive(Debug, Clone)]
pub struct Reverb {
    bypass: bool,
    left: Tap,
    right: Tap,

    mix: f32,
    time: f32,
    room_size: f32,
    damping: f32,
    width: f32,
    frozen: bool,

    // Derived from the parameters above by `update`
    gain: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl Reverb {
    pub const DEFAULT_MIX: f32 = 0.3;
    pub const DEFAULT_TIME: f32 = 2.0;
    pub const DEFAULT_WIDTH: f32 = 1.0;

    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let mut reverb = Self {
            bypass: false,
            left: Tap::new(sample_rate, 0),
            right: Tap::new(sample_rate, STEREO_SPREAD),
            mix: Self::DEFAULT_MIX,
            time: Self::DEFAULT_TIME,
            room_size: 0.5,
            damping: BASE_DAMPING,
            width: Self::DEFAULT_WIDTH,
            frozen: false,
            gain: FIXED_GAIN,
            feedback: 0.0,
            damp1: 0.0,
            damp2: 1.0,
            wet1: 0.0,
            wet2: 0.0,
            dry: 1.0,
        };
        reverb.set_time(Self::DEFAULT_TIME);
        reverb
    }

    /// Wet/dry blend
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = params::clamp_or(mix, params::MIX_MIN, params::MIX_MAX, Self::DEFAULT_MIX);
        self.update();
    }

    /// Set an approximate RT60 decay time in seconds
    ///
    /// Solves `fb = 10^(-3 D / T)` for the comb feedback, D being the mean comb
    /// delay, then maps the feedback back to a room size. Very long tails get
    /// extra damping so the combs do not ring.
    pub fn set_time(&mut self, seconds: f32) {
        let time = params::clamp_or(
            seconds,
            params::REVERB_TIME_MIN,
            params::REVERB_TIME_MAX,
            Self::DEFAULT_TIME,
        );
        self.time = time;

        let feedback = 10.0_f32.powf(-3.0 * mean_comb_delay() / time);
        self.room_size = ((feedback - OFFSET_ROOM) / SCALE_ROOM).clamp(0.0, 1.0);

        self.damping = if time > LONG_TAIL_SECS {
            (BASE_DAMPING + (time - LONG_TAIL_SECS) / LONG_TAIL_SECS * 0.3).min(1.0)
        } else {
            BASE_DAMPING
        };
        self.update();
    }

    /// Stereo width in [0, 1]
    pub fn set_width(&mut self, width: f32) {
        self.width = params::clamp_or(width, 0.0, 1.0, Self::DEFAULT_WIDTH);
        self.update();
    }

    /// Freeze the current tail: input is gated and the combs stop decaying
    pub fn set_freeze(&mut self, frozen: bool) {
        self.frozen = frozen;
        self.update();
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Comb feedback currently in use (always below 1.0)
    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    fn update(&mut self) {
        let wet = self.mix * SCALE_WET;
        self.wet1 = wet * (self.width / 2.0 + 0.5);
        self.wet2 = wet * ((1.0 - self.width) / 2.0);
        self.dry = 1.0 - self.mix;

        if self.frozen {
            self.gain = 0.0;
            self.feedback = FREEZE_FEEDBACK;
            self.damp1 = 0.0;
        } else {
            self.gain = FIXED_GAIN;
            self.feedback = (self.room_size * SCALE_ROOM + OFFSET_ROOM).min(MAX_FEEDBACK);
            self.damp1 = self.damping * SCALE_DAMP;
        }
        self.damp2 = 1.0 - self.damp1;
    }

    /// Run both taps over one input sample, returning the raw wet pair
    #[inline]
    fn wet_pair(&mut self, dry: f32) -> (f32, f32) {
        let input = dry * self.gain;
        let (fb, d1, d2) = (self.feedback, self.damp1, self.damp2);
        (
            self.left.process(input, fb, d1, d2),
            self.right.process(input, fb, d1, d2),
        )
    }

    #[inline]
    fn finish(&self, out: f32, dry: f32) -> f32 {
        if out.is_finite() {
            out.clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
        } else {
            0.5 * dry
        }
    }

    /// Process one mono sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let dry = sanitize(x);
        let (wet_l, wet_r) = self.wet_pair(dry);
        let out = wet_l * self.wet1 + wet_r * self.wet2 + dry * self.dry;
        self.finish(out, dry)
    }
}

/// Replace non-finite input with silence and clamp to the input limit
#[inline]
fn sanitize(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(-INPUT_LIMIT, INPUT_LIMIT)
    } else {
        0.0
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
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
        "Reverb"
    }
}
