//! Configuration management for Murmur
//!
//! This module provides:
//! - Configuration structs for the engine, the pipeline layout and each sound
//! - TOML serialization with async load/save
//! - Command bus pattern for runtime parameter changes

use crate::domain::dsp::{AnomalyCleaner, EqPreset, Equalizer, EqualizerBand, Normalizer};
use crate::domain::effects::{EffectParameters, EffectType};
use crate::domain::params::SoundControls;
use crate::domain::source::NoiseColor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// ENGINE
// ============================================================================

/// Render engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate every sound is rendered at
    pub sample_rate: u32,

    /// Samples per render block
    pub block_size: usize,

    /// Blocks buffered between each render thread and the output callback
    pub queue_depth: usize,

    /// Meter peak decay in dB per second
    #[serde(default = "default_meter_decay")]
    pub meter_decay_db_per_sec: f32,
}

fn default_meter_decay() -> f32 {
    12.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            queue_depth: 4,
            meter_decay_db_per_sec: default_meter_decay(),
        }
    }
}

impl EngineConfig {
    /// Wall-clock length of one block
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

// ============================================================================
// PIPELINE LAYOUT
// ============================================================================

/// One equalizer band's fixed layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqBandConfig {
    pub name: String,
    pub frequency: f32,
    pub q: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanerConfig {
    pub enabled: bool,
    pub threshold: f32,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: AnomalyCleaner::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub enabled: bool,
    pub target_peak: f32,
    pub smoothing: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_peak: Normalizer::DEFAULT_TARGET,
            smoothing: Normalizer::DEFAULT_SMOOTHING,
        }
    }
}

/// Layout shared by every sound's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub bands: Vec<EqBandConfig>,
    #[serde(default)]
    pub cleaner: CleanerConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bands: Equalizer::DEFAULT_BANDS
                .iter()
                .map(|&(name, frequency, q)| EqBandConfig {
                    name: name.to_string(),
                    frequency,
                    q,
                })
                .collect(),
            cleaner: CleanerConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build a flat equalizer with this band layout
    pub fn equalizer(&self, sample_rate: u32) -> Equalizer {
        let bands = self
            .bands
            .iter()
            .map(|b| EqualizerBand::new(b.name.clone(), b.frequency, b.q))
            .collect();
        Equalizer::new(sample_rate, bands)
    }
}

// ============================================================================
// SOUNDS
// ============================================================================

/// Where a sound's samples come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Mono (or downmixed) WAV file
    Wav {
        path: PathBuf,
        #[serde(default = "default_looping")]
        looping: bool,
    },
    /// Generated noise
    Noise { color: NoiseColor, amplitude: f32 },
}

fn default_looping() -> bool {
    true
}

fn default_volume() -> f32 {
    SoundControls::DEFAULT_VOLUME
}

/// One sound in the mix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundConfig {
    pub id: String,
    pub name: String,
    pub source: SourceConfig,

    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Named curve applied before `band_gains`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_preset: Option<EqPreset>,

    /// Gain per EQ band in dB; missing bands stay flat
    #[serde(default)]
    pub band_gains: Vec<f32>,

    #[serde(default)]
    pub effect: EffectParameters,
}

impl SoundConfig {
    /// Push this sound's settings into its controls
    pub fn apply_to(&self, controls: &SoundControls) {
        controls.set_volume(self.volume);
        if let Some(preset) = self.eq_preset {
            controls.apply_preset(preset);
        }
        for (band, &gain) in self.band_gains.iter().enumerate() {
            controls.set_band_gain(band, gain);
        }
        controls.apply_effect(&self.effect);
    }
}

// ============================================================================
// MIX
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MixConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sounds: Vec<SoundConfig>,
}

impl MixConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(sounds = config.sounds.len(), "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Reject layouts the engine cannot run
    pub fn validate(&self) -> Result<()> {
        if self.engine.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.engine.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if self.engine.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be positive".into()));
        }
        if self.pipeline.bands.is_empty() {
            return Err(ConfigError::Invalid("at least one EQ band is required".into()));
        }
        for band in &self.pipeline.bands {
            let positive = |v: f32| v.is_finite() && v > 0.0;
            if !positive(band.frequency) || !positive(band.q) {
                return Err(ConfigError::Invalid(format!(
                    "EQ band '{}' needs a positive frequency and Q",
                    band.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for sound in &self.sounds {
            if !seen.insert(sound.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sound id '{}'",
                    sound.id
                )));
            }
            if sound.band_gains.len() > self.pipeline.bands.len() {
                return Err(ConfigError::Invalid(format!(
                    "sound '{}' sets {} band gains but only {} bands exist",
                    sound.id,
                    sound.band_gains.len(),
                    self.pipeline.bands.len()
                )));
            }
        }
        Ok(())
    }

    /// Create factory default configuration: rain and a distant surf
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        config.sounds.push(SoundConfig {
            id: "rain".to_string(),
            name: "Light Rain".to_string(),
            source: SourceConfig::Noise {
                color: NoiseColor::White,
                amplitude: 0.25,
            },
            volume: 0.6,
            eq_preset: None,
            band_gains: vec![-6.0, -2.0, 0.0, 2.0, -3.0],
            effect: EffectParameters::Reverb {
                mix: 0.25,
                time: 1.5,
                width: 1.0,
                freeze: false,
            },
        });

        config.sounds.push(SoundConfig {
            id: "surf".to_string(),
            name: "Distant Surf".to_string(),
            source: SourceConfig::Noise {
                color: NoiseColor::Brown,
                amplitude: 0.8,
            },
            volume: 0.7,
            eq_preset: Some(EqPreset::Muffled),
            band_gains: vec![],
            effect: EffectParameters::Flanger {
                rate: 0.1,
                depth: 0.4,
                feedback: 0.2,
                mix: 0.3,
            },
        });

        config
    }
}

// ============================================================================
// COMMAND BUS
// ============================================================================

/// Command types for runtime parameter changes
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetVolume {
        sound_id: String,
        volume: f32,
    },
    SetBandGain {
        sound_id: String,
        band: usize,
        gain_db: f32,
    },
    SetEqPreset {
        sound_id: String,
        preset: EqPreset,
    },
    SetEffect {
        sound_id: String,
        effect: EffectType,
    },
    SetReverb {
        sound_id: String,
        mix: f32,
        time: f32,
        width: f32,
        freeze: bool,
    },
    SetPitch {
        sound_id: String,
        factor: f32,
    },
    SetEcho {
        sound_id: String,
        delay_ms: f32,
        mix: f32,
        feedback: f32,
    },
    SetFlanger {
        sound_id: String,
        rate: f32,
        depth: f32,
        feedback: f32,
        mix: f32,
    },
    SetCleaner {
        sound_id: String,
        enabled: bool,
    },
    SetNormalizer {
        sound_id: String,
        enabled: bool,
    },
    ClearTails {
        sound_id: String,
    },
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    VolumeChanged { sound_id: String, volume: f32 },
    BandGainChanged { sound_id: String, band: usize, gain_db: f32 },
    PresetApplied { sound_id: String, preset: EqPreset },
    EffectChanged { sound_id: String, effect: EffectType },
    ParametersChanged { sound_id: String, effect: EffectType },
    StageToggled { sound_id: String, stage: &'static str, enabled: bool },
    TailsCleared { sound_id: String },
    Error(String),
}

impl CommandResult {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandResult::Error(_))
    }
}

impl Command {
    /// Sound the command targets
    pub fn sound_id(&self) -> &str {
        match self {
            Command::SetVolume { sound_id, .. }
            | Command::SetBandGain { sound_id, .. }
            | Command::SetEqPreset { sound_id, .. }
            | Command::SetEffect { sound_id, .. }
            | Command::SetReverb { sound_id, .. }
            | Command::SetPitch { sound_id, .. }
            | Command::SetEcho { sound_id, .. }
            | Command::SetFlanger { sound_id, .. }
            | Command::SetCleaner { sound_id, .. }
            | Command::SetNormalizer { sound_id, .. }
            | Command::ClearTails { sound_id } => sound_id,
        }
    }

    /// Apply the command to one sound's controls
    ///
    /// Values are clamped by the controls; the result reports what was stored.
    pub fn apply(&self, controls: &SoundControls) -> CommandResult {
        let sound_id = self.sound_id().to_string();
        match *self {
            Command::SetVolume { volume, .. } => {
                controls.set_volume(volume);
                CommandResult::VolumeChanged {
                    sound_id,
                    volume: controls.volume(),
                }
            }
            Command::SetBandGain { band, gain_db, .. } => {
                if !controls.set_band_gain(band, gain_db) {
                    return CommandResult::Error(format!(
                        "sound '{sound_id}' has no band {band} ({} bands)",
                        controls.band_count()
                    ));
                }
                CommandResult::BandGainChanged {
                    sound_id,
                    band,
                    gain_db: controls.band_gain(band).unwrap_or(gain_db),
                }
            }
            Command::SetEqPreset { preset, .. } => {
                controls.apply_preset(preset);
                CommandResult::PresetApplied { sound_id, preset }
            }
            Command::SetEffect { effect, .. } => {
                controls.set_effect(effect);
                CommandResult::EffectChanged { sound_id, effect }
            }
            Command::SetReverb {
                mix,
                time,
                width,
                freeze,
                ..
            } => {
                controls.set_reverb(mix, time, width, freeze);
                CommandResult::ParametersChanged {
                    sound_id,
                    effect: EffectType::Reverb,
                }
            }
            Command::SetPitch { factor, .. } => {
                controls.set_pitch(factor);
                CommandResult::ParametersChanged {
                    sound_id,
                    effect: EffectType::Pitch,
                }
            }
            Command::SetEcho {
                delay_ms,
                mix,
                feedback,
                ..
            } => {
                controls.set_echo(delay_ms, mix, feedback);
                CommandResult::ParametersChanged {
                    sound_id,
                    effect: EffectType::Echo,
                }
            }
            Command::SetFlanger {
                rate,
                depth,
                feedback,
                mix,
                ..
            } => {
                controls.set_flanger(rate, depth, feedback, mix);
                CommandResult::ParametersChanged {
                    sound_id,
                    effect: EffectType::Flanger,
                }
            }
            Command::SetCleaner { enabled, .. } => {
                controls.set_cleaner_enabled(enabled);
                CommandResult::StageToggled {
                    sound_id,
                    stage: "cleaner",
                    enabled,
                }
            }
            Command::SetNormalizer { enabled, .. } => {
                controls.set_normalizer_enabled(enabled);
                CommandResult::StageToggled {
                    sound_id,
                    stage: "normalizer",
                    enabled,
                }
            }
            Command::ClearTails { .. } => {
                controls.request_clear();
                CommandResult::TailsCleared { sound_id }
            }
        }
    }
}

/// Trait for command execution
pub trait CommandExecutor {
    fn execute(&self, command: Command) -> CommandResult;
}
