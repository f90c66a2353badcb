//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod effects;
pub mod mixer;
pub mod params;
pub mod pipeline;
pub mod source;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::AudioError;
pub use config::{
    CleanerConfig, Command, CommandExecutor, CommandResult, ConfigError, EngineConfig,
    EqBandConfig, MixConfig, NormalizerConfig, PipelineConfig, SoundConfig, SourceConfig,
};
pub use dsp::*;
pub use effects::{EffectParameters, EffectType, EffectsManager};
pub use mixer::{AudioLevel, SoundId, SoundMixer};
pub use params::{AtomicF32, SoundControls};
pub use pipeline::SoundPipeline;
pub use source::{
    BufferSource, ManagedSource, NoiseColor, NoiseSource, SampleSource, SourceLifecycle,
    SourceState,
};
