//! BiQuad filter (low-level IIR section for the equalizer)

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Biquad filter coefficients
///
/// `a0..a2` are the feed-forward terms, `b1`/`b2` the feedback terms, all
/// already normalized by the design equation's leading denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    pub a0: f32,
    pub a1: f32,
    pub a2: f32,
    pub b1: f32,
    pub b2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

impl BiquadCoeffs {
    /// Unity gain (no filtering)
    pub const fn identity() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
        }
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Center frequency in Hz
    /// - `q`: Bandwidth as a Q factor
    /// - `gain`: Linear amplitude factor at the center (1.0 = flat)
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, q: f32, gain: f32) -> Self {
        let a = gain.max(f32::MIN_POSITIVE).sqrt();
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);

        let a0 = 1.0 + alpha / a;
        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            a0,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// `(cos ω, α)` for `ω = 2πf/fs`, `α = sin ω / 2Q`
    #[inline]
    fn angular(sample_rate: f32, freq: f32, q: f32) -> (f32, f32) {
        let w0 = 2.0 * PI * freq / sample_rate;
        (w0.cos(), w0.sin() / (2.0 * q.max(1.0e-3)))
    }

    /// Divide everything by the leading denominator term
    #[inline]
    fn normalized(n0: f32, n1: f32, n2: f32, d0: f32, d1: f32, d2: f32) -> Self {
        Self {
            a0: n0 / d0,
            a1: n1 / d0,
            a2: n2 / d0,
            b1: d1 / d0,
            b2: d2 / d0,
        }
    }
}

/// Stateful biquad filter using Transposed Direct Form II
///
/// Two registers instead of four, and exact identity when the numerator and
/// denominator coincide (a flat peaking band).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::identity())
    }

    /// Update filter coefficients
    ///
    /// Registers are kept so a gain change mid-stream does not click.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.a0 * x + self.z1;
        self.z1 = c.a1 * x - c.b1 * y + self.z2;
        self.z2 = c.a2 * x - c.b2 * y;
        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state (coefficients are untouched)
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
