//! N-band peaking equalizer

use super::biquad::{BiquadCoeffs, BiquadFilter};
use super::{db_to_gain, params, Effect};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::trace;

/// One equalizer band
///
/// Frequency and Q are fixed at construction; only the gain moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualizerBand {
    pub name: String,
    pub frequency: f32,
    pub q: f32,
    gain_db: f32,
    filter: BiquadFilter,
}

impl EqualizerBand {
    pub fn new(name: impl Into<String>, frequency: f32, q: f32) -> Self {
        Self {
            name: name.into(),
            frequency,
            q,
            gain_db: 0.0,
            filter: BiquadFilter::bypass(),
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

/// Named gain curves over the default band layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqPreset {
    Flat,
    Warm,
    Bright,
    Muffled,
}

impl EqPreset {
    pub const ALL: [EqPreset; 4] = [
        EqPreset::Flat,
        EqPreset::Warm,
        EqPreset::Bright,
        EqPreset::Muffled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::Warm => "warm",
            EqPreset::Bright => "bright",
            EqPreset::Muffled => "muffled",
        }
    }

    /// Gains for the five default bands (Bass → Air)
    pub fn gains(&self) -> [f32; 5] {
        match self {
            EqPreset::Flat => [0.0, 0.0, 0.0, 0.0, 0.0],
            EqPreset::Warm => [4.0, 2.0, 0.0, -2.0, -4.0],
            EqPreset::Bright => [-2.0, -1.0, 0.0, 3.0, 5.0],
            EqPreset::Muffled => [2.0, 0.0, -4.0, -9.0, -12.0],
        }
    }
}

impl FromStr for EqPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EqPreset::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

/// Serial N-band equalizer
///
/// Band k's output feeds band k+1 over the whole block. Changing a gain does
/// not touch the coefficients until [`Equalizer::update_band`] runs, which
/// keeps `process` free of per-sample branching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equalizer {
    bypass: bool,
    sample_rate: f32,
    bands: Vec<EqualizerBand>,
}

impl Equalizer {
    /// Default layout used when a configuration names no bands
    pub const DEFAULT_BANDS: [(&'static str, f32, f32); 5] = [
        ("Bass", 60.0, 0.9),
        ("Low Mid", 250.0, 1.0),
        ("Mid", 1000.0, 1.0),
        ("High Mid", 4000.0, 1.0),
        ("Air", 12000.0, 0.9),
    ];

    /// Create an equalizer over the given bands, all flat
    pub fn new(sample_rate: u32, bands: Vec<EqualizerBand>) -> Self {
        let mut eq = Self {
            bypass: false,
            sample_rate: sample_rate as f32,
            bands,
        };
        eq.reset();
        eq
    }

    /// Create an equalizer with [`Self::DEFAULT_BANDS`]
    pub fn with_default_bands(sample_rate: u32) -> Self {
        let bands = Self::DEFAULT_BANDS
            .iter()
            .map(|&(name, freq, q)| EqualizerBand::new(name, freq, q))
            .collect();
        Self::new(sample_rate, bands)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[EqualizerBand] {
        &self.bands
    }

    /// Current gain of band `index`, if it exists
    pub fn gain(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|b| b.gain_db)
    }

    /// Store a new gain for band `index` (clamped)
    ///
    /// Returns `false` for an unknown band. Call [`Self::update_band`] to
    /// make the change audible.
    pub fn set_gain(&mut self, index: usize, gain_db: f32) -> bool {
        match self.bands.get_mut(index) {
            Some(band) => {
                band.gain_db =
                    params::clamp_or(gain_db, params::EQ_GAIN_MIN, params::EQ_GAIN_MAX, 0.0);
                true
            }
            None => false,
        }
    }

    /// Recompute band `index`'s coefficients from its stored gain
    pub fn update_band(&mut self, index: usize) {
        let sample_rate = self.sample_rate;
        if let Some(band) = self.bands.get_mut(index) {
            let amplitude = db_to_gain(band.gain_db);
            band.filter.set_coeffs(BiquadCoeffs::peaking(
                sample_rate,
                band.frequency,
                band.q,
                amplitude,
            ));
            trace!(
                band = %band.name,
                gain_db = band.gain_db,
                freq = band.frequency,
                "EQ band updated"
            );
        }
    }

    /// Set and apply a gain in one call
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> bool {
        let known = self.set_gain(index, gain_db);
        if known {
            self.update_band(index);
        }
        known
    }

    /// Zero every gain and rebuild coefficients
    pub fn reset(&mut self) {
        for index in 0..self.bands.len() {
            self.bands[index].gain_db = 0.0;
            self.update_band(index);
        }
    }

    /// True when every band sits at 0 dB
    pub fn is_flat(&self) -> bool {
        self.bands.iter().all(|b| b.gain_db == 0.0)
    }
}

impl Effect for Equalizer {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }
        for band in &mut self.bands {
            band.filter.process(buffer);
        }
    }

    fn clear(&mut self) {
        for band in &mut self.bands {
            band.filter.reset();
        }
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
        "Equalizer"
    }
}
