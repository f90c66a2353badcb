//! Digital Signal Processing stages for the sound pipeline
//!
//! This module provides the transformers a sound's chain is built from:
//! - Peaking/shelving BiQuad sections and the N-band Equalizer
//! - Echo line (circular buffer with feedback)
//! - Flanger (LFO-modulated fractional delay)
//! - Freeverb-style Reverb
//! - Pitch Shifter (variable-rate resampler)
//! - Anomaly Cleaner and adaptive Normalizer
//!
//! All stages are designed for:
//! - Zero allocations in the hot path (buffer growth is amortized)
//! - Mono `f32` blocks nominally in [-1.0, 1.0]
//! - Never failing: bad values are clamped, unstable feedback is flushed

pub mod biquad;
pub mod delay;
pub mod equalizer;
pub mod flanger;
pub mod normalizer;
pub mod pitch;
pub mod reverb;

pub use biquad::{BiquadCoeffs, BiquadFilter};
pub use delay::{DelayLine, EchoLine};
pub use equalizer::{EqPreset, Equalizer, EqualizerBand};
pub use flanger::Flanger;
pub use normalizer::{AnomalyCleaner, Normalizer};
pub use pitch::PitchShifter;
pub use reverb::Reverb;

/// Core trait for in-place block effects
///
/// All effects process mono audio in-place on f32 buffers.
pub trait Effect: Send {
    /// Process a buffer of audio samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size, including empty
    fn process(&mut self, buffer: &mut [f32]);

    /// Clear internal buffers and filter memory
    ///
    /// Parameters are kept. Used to drop residual tails when an effect is
    /// switched off or a sound is resumed.
    fn clear(&mut self);

    /// Check if effect is bypassed (zero processing overhead when true)
    fn is_bypassed(&self) -> bool {
        false
    }

    /// Toggle bypass state
    fn set_bypass(&mut self, _bypass: bool) {}

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// Parameter constraints for DSP stages
///
/// Every setter clamps to these ranges; nothing is ever rejected.
pub mod params {
    /// Equalizer band gain (dB)
    pub const EQ_GAIN_MIN: f32 = -12.0;
    pub const EQ_GAIN_MAX: f32 = 12.0;

    /// Per-sound output volume (linear)
    pub const VOLUME_MIN: f32 = 0.0;
    pub const VOLUME_MAX: f32 = 1.0;

    /// Wet/dry mix shared by every effect
    pub const MIX_MIN: f32 = 0.0;
    pub const MIX_MAX: f32 = 1.0;

    /// Feedback for echo and flanger lines
    pub const FEEDBACK_MIN: f32 = 0.0;
    pub const FEEDBACK_MAX: f32 = 0.9;

    /// Echo delay time (ms)
    pub const ECHO_DELAY_MIN_MS: f32 = 10.0;
    pub const ECHO_DELAY_MAX_MS: f32 = 2000.0;

    /// Flanger LFO rate (Hz) and sweep depth (fraction of the sweep range)
    pub const FLANGER_RATE_MIN: f32 = 0.1;
    pub const FLANGER_RATE_MAX: f32 = 5.0;
    pub const FLANGER_DEPTH_MIN: f32 = 0.01;
    pub const FLANGER_DEPTH_MAX: f32 = 1.0;

    /// Reverb decay time (seconds)
    pub const REVERB_TIME_MIN: f32 = 0.1;
    pub const REVERB_TIME_MAX: f32 = 10.0;

    /// Pitch factor (0.5 = one octave down, 2.0 = one octave up)
    pub const PITCH_MIN: f32 = 0.5;
    pub const PITCH_MAX: f32 = 2.0;

    /// Clamp `value` into `[min, max]`, replacing NaN with `fallback`
    ///
    /// Infinities land on the nearest bound.
    #[inline]
    pub fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
        if value.is_nan() {
            fallback
        } else {
            value.clamp(min, max)
        }
    }
}

/// Snap subnormal values to zero
///
/// Feedback loops decaying toward silence otherwise spend most of their time
/// in denormal arithmetic.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1.0e-15 {
        0.0
    } else {
        x
    }
}

/// Peak magnitude of a block
#[inline]
pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
