//! Lock-free parameter cells shared between control and render threads
//!
//! Every scalar is its own atomic cell. Setters clamp, store, then bump a
//! generation counter with release ordering; the render thread compares the
//! counter (acquire) at the start of each block and only then re-reads the
//! cells. A block therefore never observes a half-applied change of a
//! single parameter, and every write is visible by the next block.

use crate::domain::dsp::params as limits;
use crate::domain::dsp::{EchoLine, EqPreset, Flanger, PitchShifter, Reverb};
use crate::domain::effects::{EffectParameters, EffectType};
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use tracing::trace;

/// Atomic `f32` cell
#[derive(Debug)]
pub struct AtomicF32(AtomicCell<f32>);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicCell::new(value))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        self.0.load()
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Every control a sound exposes
///
/// Shared as `Arc<SoundControls>` between the registry and the pipeline.
#[derive(Debug)]
pub struct SoundControls {
    volume: AtomicF32,
    band_gains: Box<[AtomicF32]>,
    effect: AtomicU8,

    reverb_mix: AtomicF32,
    reverb_time: AtomicF32,
    reverb_width: AtomicF32,
    reverb_freeze: AtomicBool,

    pitch_factor: AtomicF32,

    echo_delay_ms: AtomicF32,
    echo_mix: AtomicF32,
    echo_feedback: AtomicF32,

    flanger_rate: AtomicF32,
    flanger_depth: AtomicF32,
    flanger_feedback: AtomicF32,
    flanger_mix: AtomicF32,

    cleaner_enabled: AtomicBool,
    normalizer_enabled: AtomicBool,
    clear_requested: AtomicBool,

    generation: AtomicU64,
}

impl SoundControls {
    pub const DEFAULT_VOLUME: f32 = 0.8;

    /// Controls for a pipeline with `band_count` EQ bands, all at defaults
    pub fn new(band_count: usize) -> Self {
        Self {
            volume: AtomicF32::new(Self::DEFAULT_VOLUME),
            band_gains: (0..band_count).map(|_| AtomicF32::new(0.0)).collect(),
            effect: AtomicU8::new(EffectType::None as u8),
            reverb_mix: AtomicF32::new(Reverb::DEFAULT_MIX),
            reverb_time: AtomicF32::new(Reverb::DEFAULT_TIME),
            reverb_width: AtomicF32::new(Reverb::DEFAULT_WIDTH),
            reverb_freeze: AtomicBool::new(false),
            pitch_factor: AtomicF32::new(PitchShifter::DEFAULT_FACTOR),
            echo_delay_ms: AtomicF32::new(EchoLine::DEFAULT_DELAY_MS),
            echo_mix: AtomicF32::new(EchoLine::DEFAULT_MIX),
            echo_feedback: AtomicF32::new(EchoLine::DEFAULT_FEEDBACK),
            flanger_rate: AtomicF32::new(Flanger::DEFAULT_RATE),
            flanger_depth: AtomicF32::new(Flanger::DEFAULT_DEPTH),
            flanger_feedback: AtomicF32::new(Flanger::DEFAULT_FEEDBACK),
            flanger_mix: AtomicF32::new(Flanger::DEFAULT_MIX),
            cleaner_enabled: AtomicBool::new(true),
            normalizer_enabled: AtomicBool::new(true),
            clear_requested: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Change counter; differs from the last seen value when anything moved
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------------

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(limits::clamp_or(
            volume,
            limits::VOLUME_MIN,
            limits::VOLUME_MAX,
            Self::DEFAULT_VOLUME,
        ));
        self.bump();
    }

    /// Set band `index` gain in dB; returns `false` for an unknown band
    pub fn set_band_gain(&self, index: usize, gain_db: f32) -> bool {
        let Some(cell) = self.band_gains.get(index) else {
            return false;
        };
        cell.store(limits::clamp_or(
            gain_db,
            limits::EQ_GAIN_MIN,
            limits::EQ_GAIN_MAX,
            0.0,
        ));
        trace!(band = index, gain_db, "Band gain set");
        self.bump();
        true
    }

    /// Write a preset's gains into the leading bands
    ///
    /// Bands past the preset's five keep their gain. One generation bump
    /// covers the whole curve.
    pub fn apply_preset(&self, preset: EqPreset) {
        for (cell, gain_db) in self.band_gains.iter().zip(preset.gains()) {
            cell.store(gain_db.clamp(limits::EQ_GAIN_MIN, limits::EQ_GAIN_MAX));
        }
        trace!(preset = preset.as_str(), "EQ preset applied");
        self.bump();
    }

    pub fn set_effect(&self, effect: EffectType) {
        self.effect.store(effect as u8, Ordering::Relaxed);
        self.bump();
    }

    pub fn set_reverb(&self, mix: f32, time: f32, width: f32, freeze: bool) {
        self.reverb_mix.store(limits::clamp_or(
            mix,
            limits::MIX_MIN,
            limits::MIX_MAX,
            Reverb::DEFAULT_MIX,
        ));
        self.reverb_time.store(limits::clamp_or(
            time,
            limits::REVERB_TIME_MIN,
            limits::REVERB_TIME_MAX,
            Reverb::DEFAULT_TIME,
        ));
        self.reverb_width
            .store(limits::clamp_or(width, 0.0, 1.0, Reverb::DEFAULT_WIDTH));
        self.reverb_freeze.store(freeze, Ordering::Relaxed);
        self.bump();
    }

    pub fn set_pitch(&self, factor: f32) {
        self.pitch_factor.store(limits::clamp_or(
            factor,
            limits::PITCH_MIN,
            limits::PITCH_MAX,
            PitchShifter::DEFAULT_FACTOR,
        ));
        self.bump();
    }

    pub fn set_echo(&self, delay_ms: f32, mix: f32, feedback: f32) {
        self.echo_delay_ms.store(limits::clamp_or(
            delay_ms,
            limits::ECHO_DELAY_MIN_MS,
            limits::ECHO_DELAY_MAX_MS,
            EchoLine::DEFAULT_DELAY_MS,
        ));
        self.echo_mix.store(limits::clamp_or(
            mix,
            limits::MIX_MIN,
            limits::MIX_MAX,
            EchoLine::DEFAULT_MIX,
        ));
        self.echo_feedback.store(limits::clamp_or(
            feedback,
            limits::FEEDBACK_MIN,
            limits::FEEDBACK_MAX,
            EchoLine::DEFAULT_FEEDBACK,
        ));
        self.bump();
    }

    pub fn set_flanger(&self, rate: f32, depth: f32, feedback: f32, mix: f32) {
        self.flanger_rate.store(limits::clamp_or(
            rate,
            limits::FLANGER_RATE_MIN,
            limits::FLANGER_RATE_MAX,
            Flanger::DEFAULT_RATE,
        ));
        self.flanger_depth.store(limits::clamp_or(
            depth,
            limits::FLANGER_DEPTH_MIN,
            limits::FLANGER_DEPTH_MAX,
            Flanger::DEFAULT_DEPTH,
        ));
        self.flanger_feedback.store(limits::clamp_or(
            feedback,
            limits::FEEDBACK_MIN,
            limits::FEEDBACK_MAX,
            Flanger::DEFAULT_FEEDBACK,
        ));
        self.flanger_mix.store(limits::clamp_or(
            mix,
            limits::MIX_MIN,
            limits::MIX_MAX,
            Flanger::DEFAULT_MIX,
        ));
        self.bump();
    }

    /// Store the payload of `params` without changing the active effect
    ///
    /// `EffectParameters::None` carries nothing and is ignored.
    pub fn configure(&self, params: &EffectParameters) {
        match *params {
            EffectParameters::None => {}
            EffectParameters::Reverb {
                mix,
                time,
                width,
                freeze,
            } => self.set_reverb(mix, time, width, freeze),
            EffectParameters::Pitch { factor } => self.set_pitch(factor),
            EffectParameters::Echo {
                delay_ms,
                mix,
                feedback,
            } => self.set_echo(delay_ms, mix, feedback),
            EffectParameters::Flanger {
                rate,
                depth,
                feedback,
                mix,
            } => self.set_flanger(rate, depth, feedback, mix),
        }
    }

    /// Store `params` and make its kind the active effect
    pub fn apply_effect(&self, params: &EffectParameters) {
        self.configure(params);
        self.set_effect(params.kind());
    }

    pub fn set_cleaner_enabled(&self, enabled: bool) {
        self.cleaner_enabled.store(enabled, Ordering::Relaxed);
        self.bump();
    }

    pub fn set_normalizer_enabled(&self, enabled: bool) {
        self.normalizer_enabled.store(enabled, Ordering::Relaxed);
        self.bump();
    }

    /// Ask the render thread to drop effect tails before the next block
    pub fn request_clear(&self) {
        self.clear_requested.store(true, Ordering::Relaxed);
        self.bump();
    }

    // ------------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------------

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn band_count(&self) -> usize {
        self.band_gains.len()
    }

    pub fn band_gain(&self, index: usize) -> Option<f32> {
        self.band_gains.get(index).map(AtomicF32::load)
    }

    pub fn effect(&self) -> EffectType {
        EffectType::from_u8(self.effect.load(Ordering::Relaxed))
    }

    pub fn cleaner_enabled(&self) -> bool {
        self.cleaner_enabled.load(Ordering::Relaxed)
    }

    pub fn normalizer_enabled(&self) -> bool {
        self.normalizer_enabled.load(Ordering::Relaxed)
    }

    /// Consume a pending clear request
    pub fn take_clear_request(&self) -> bool {
        self.clear_requested.swap(false, Ordering::AcqRel)
    }

    /// Stored parameters for `kind`, whether or not it is active
    pub fn parameters_for(&self, kind: EffectType) -> EffectParameters {
        match kind {
            EffectType::None => EffectParameters::None,
            EffectType::Reverb => EffectParameters::Reverb {
                mix: self.reverb_mix.load(),
                time: self.reverb_time.load(),
                width: self.reverb_width.load(),
                freeze: self.reverb_freeze.load(Ordering::Relaxed),
            },
            EffectType::Pitch => EffectParameters::Pitch {
                factor: self.pitch_factor.load(),
            },
            EffectType::Echo => EffectParameters::Echo {
                delay_ms: self.echo_delay_ms.load(),
                mix: self.echo_mix.load(),
                feedback: self.echo_feedback.load(),
            },
            EffectType::Flanger => EffectParameters::Flanger {
                rate: self.flanger_rate.load(),
                depth: self.flanger_depth.load(),
                feedback: self.flanger_feedback.load(),
                mix: self.flanger_mix.load(),
            },
        }
    }

    /// Parameters of the active effect
    pub fn effect_parameters(&self) -> EffectParameters {
        self.parameters_for(self.effect())
    }
}
