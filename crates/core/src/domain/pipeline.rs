//! Per-sound sample pipeline
//!
//! source → cleaner → normalizer → equalizer → effect → volume
//!
//! The pipeline is itself a [`SampleSource`], so a render thread pulls from it
//! exactly as it would from a bare source.

use crate::domain::config::PipelineConfig;
use crate::domain::dsp::{AnomalyCleaner, Effect, Equalizer, Normalizer};
use crate::domain::effects::{EffectType, EffectsManager};
use crate::domain::params::SoundControls;
use crate::domain::source::{ManagedSource, SampleSource, SourceLifecycle};
use std::sync::Arc;
use tracing::{debug, trace};

/// Stages ahead of the effect, exposed to it as one upstream
struct FrontChain {
    source: ManagedSource,
    cleaner: AnomalyCleaner,
    normalizer: Normalizer,
    equalizer: Equalizer,
}

impl SampleSource for FrontChain {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let produced = self.source.read(buffer);
        let block = &mut buffer[..produced];
        self.cleaner.process(block);
        self.normalizer.process(block);
        self.equalizer.process(block);
        produced
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

pub struct SoundPipeline {
    front: FrontChain,
    effects: EffectsManager,
    controls: Arc<SoundControls>,
    lifecycle: Arc<SourceLifecycle>,
    seen_generation: Option<u64>,
    volume: f32,
}

impl SoundPipeline {
    /// Wrap `source` in a full chain laid out by `config`
    pub fn new(source: Box<dyn SampleSource>, config: &PipelineConfig) -> Self {
        let controls = Arc::new(SoundControls::new(config.bands.len()));
        controls.set_cleaner_enabled(config.cleaner.enabled);
        controls.set_normalizer_enabled(config.normalizer.enabled);
        Self::with_controls(source, config, controls)
    }

    /// Build around existing controls, e.g. ones pre-configured by a registry
    pub fn with_controls(
        source: Box<dyn SampleSource>,
        config: &PipelineConfig,
        controls: Arc<SoundControls>,
    ) -> Self {
        let source = ManagedSource::new(source);
        let sample_rate = source.sample_rate();
        let lifecycle = source.lifecycle();
        debug!(
            sample_rate,
            bands = config.bands.len(),
            "Building sound pipeline"
        );

        Self {
            front: FrontChain {
                source,
                cleaner: AnomalyCleaner::with_threshold(config.cleaner.threshold),
                normalizer: Normalizer::with_params(
                    config.normalizer.target_peak,
                    config.normalizer.smoothing,
                ),
                equalizer: config.equalizer(sample_rate),
            },
            effects: EffectsManager::new(sample_rate),
            controls,
            lifecycle,
            seen_generation: None,
            volume: SoundControls::DEFAULT_VOLUME,
        }
    }

    /// Control handle for the thread issuing parameter changes
    pub fn controls(&self) -> Arc<SoundControls> {
        Arc::clone(&self.controls)
    }

    /// Lifecycle handle for disposing the source from another thread
    pub fn lifecycle(&self) -> Arc<SourceLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    pub fn active_effect(&self) -> EffectType {
        self.effects.active()
    }

    pub fn equalizer(&self) -> &Equalizer {
        &self.front.equalizer
    }

    /// Drop every tail: effect buffers and filter memory
    pub fn clear_tails(&mut self) {
        self.effects.clear();
        self.front.equalizer.clear();
        self.front.normalizer.clear();
        self.front.cleaner.clear();
        debug!("Pipeline tails cleared");
    }

    /// Apply control changes published since the last block
    fn sync(&mut self) {
        let generation = self.controls.generation();
        if self.seen_generation == Some(generation) {
            return;
        }
        self.seen_generation = Some(generation);

        let controls = &self.controls;
        self.volume = controls.volume();

        let equalizer = &mut self.front.equalizer;
        for band in 0..equalizer.band_count() {
            if let Some(gain) = controls.band_gain(band) {
                if equalizer.gain(band) != Some(gain) {
                    equalizer.set_band_gain(band, gain);
                }
            }
        }

        let cleaner_off = !controls.cleaner_enabled();
        if self.front.cleaner.is_bypassed() != cleaner_off {
            self.front.cleaner.set_bypass(cleaner_off);
        }
        let normalizer_off = !controls.normalizer_enabled();
        if self.front.normalizer.is_bypassed() != normalizer_off {
            self.front.normalizer.set_bypass(normalizer_off);
        }

        self.effects.configure(&controls.effect_parameters());
        trace!(generation, volume = self.volume, "Pipeline synced");
    }
}

impl SampleSource for SoundPipeline {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        self.sync();
        if self.controls.take_clear_request() {
            self.clear_tails();
        }

        let produced = self.effects.read(&mut self.front, buffer);
        let volume = self.volume;
        for sample in &mut buffer[..produced] {
            *sample *= volume;
        }
        produced
    }

    fn sample_rate(&self) -> u32 {
        self.front.sample_rate()
    }
}

impl std::fmt::Debug for SoundPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundPipeline")
            .field("sample_rate", &self.sample_rate())
            .field("effect", &self.effects.active())
            .field("volume", &self.volume)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
