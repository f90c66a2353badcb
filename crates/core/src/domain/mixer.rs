//! Sound registry and offline mixer
//!
//! This module provides the typed per-sound registry: each sound id owns a
//! pipeline, its control handle and a level meter. [`SoundMixer`] renders all
//! registered sounds into one block on the calling thread.

use crate::domain::audio::{AudioError, Result};
use crate::domain::config::{Command, CommandExecutor, CommandResult, PipelineConfig, SoundConfig};
use crate::domain::dsp::{params, peak};
use crate::domain::params::SoundControls;
use crate::domain::pipeline::SoundPipeline;
use crate::domain::source::{dispose_logged, SampleSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opaque identifier for a sound in the mix
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoundId(String);

impl SoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SoundId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Audio level meter in decibels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioLevel {
    pub current_db: f32,
    pub peak_db: f32,
}

impl AudioLevel {
    pub const MIN_LEVEL: f32 = -60.0;
    pub const MAX_LEVEL: f32 = 0.0;

    pub fn new() -> Self {
        Self {
            current_db: Self::MIN_LEVEL,
            peak_db: Self::MIN_LEVEL,
        }
    }

    /// Update level with new sample value
    pub fn update(&mut self, sample: f32) {
        let level = if sample.abs() > 0.0 {
            let db = 20.0 * sample.abs().log10();
            db.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL)
        } else {
            Self::MIN_LEVEL
        };

        self.current_db = level;
        self.peak_db = self.peak_db.max(level);
    }

    /// Update level from the peak of a rendered block
    pub fn update_block(&mut self, block: &[f32]) {
        self.update(peak(block));
    }

    /// Decay peak level (call periodically)
    pub fn decay_peak(&mut self, amount: f32) {
        self.peak_db = (self.peak_db - amount).max(Self::MIN_LEVEL);
    }
}

impl Default for AudioLevel {
    fn default() -> Self {
        Self::new()
    }
}

struct MixerSlot {
    name: String,
    pipeline: SoundPipeline,
    controls: Arc<SoundControls>,
    level: AudioLevel,
}

/// Registry of sounds rendered and summed on the caller's thread
pub struct SoundMixer {
    sample_rate: u32,
    pipeline_config: PipelineConfig,
    sounds: BTreeMap<SoundId, MixerSlot>,
    scratch: Vec<f32>,
}

impl SoundMixer {
    pub fn new(sample_rate: u32, pipeline_config: PipelineConfig) -> Self {
        Self {
            sample_rate,
            pipeline_config,
            sounds: BTreeMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Register a sound and return its control handle
    pub fn add_sound(
        &mut self,
        id: SoundId,
        name: impl Into<String>,
        source: Box<dyn SampleSource>,
    ) -> Result<Arc<SoundControls>> {
        if self.sounds.contains_key(&id) {
            return Err(AudioError::DuplicateSound(id.to_string()));
        }
        if source.sample_rate() != self.sample_rate {
            return Err(AudioError::InvalidConfiguration(format!(
                "sound '{id}' runs at {} Hz, mixer at {} Hz",
                source.sample_rate(),
                self.sample_rate
            )));
        }

        let name = name.into();
        let pipeline = SoundPipeline::new(source, &self.pipeline_config);
        let controls = pipeline.controls();
        info!(sound = %id, name = %name, "Adding sound");

        self.sounds.insert(
            id,
            MixerSlot {
                name,
                pipeline,
                controls: Arc::clone(&controls),
                level: AudioLevel::new(),
            },
        );
        Ok(controls)
    }

    /// Register a configured sound and push its settings into the controls
    pub fn add_configured(
        &mut self,
        sound: &SoundConfig,
        source: Box<dyn SampleSource>,
    ) -> Result<Arc<SoundControls>> {
        let id = SoundId::new(sound.id.as_str());
        let controls = self.add_sound(id, sound.name.as_str(), source)?;
        sound.apply_to(&controls);
        Ok(controls)
    }

    /// Unregister a sound, disposing its source
    pub fn remove_sound(&mut self, id: &SoundId) -> Result<()> {
        match self.sounds.remove(id) {
            Some(slot) => {
                dispose_logged(&slot.pipeline.lifecycle(), id.as_str());
                debug!(sound = %id, name = %slot.name, "Removing sound");
                Ok(())
            }
            None => Err(AudioError::SoundNotFound(id.to_string())),
        }
    }

    pub fn controls(&self, id: &SoundId) -> Option<Arc<SoundControls>> {
        self.sounds.get(id).map(|slot| Arc::clone(&slot.controls))
    }

    pub fn level(&self, id: &SoundId) -> Option<AudioLevel> {
        self.sounds.get(id).map(|slot| slot.level)
    }

    pub fn name(&self, id: &SoundId) -> Option<&str> {
        self.sounds.get(id).map(|slot| slot.name.as_str())
    }

    /// Registered ids in mix order
    pub fn sound_ids(&self) -> impl Iterator<Item = &SoundId> {
        self.sounds.keys()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Render every sound and sum into `out`, clamped to [-1, 1]
    ///
    /// A sound that produces fewer samples than requested contributes silence
    /// for the remainder. Always fills the whole block.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let scratch = &mut self.scratch[..out.len()];

        for (id, slot) in &mut self.sounds {
            let produced = slot.pipeline.read(scratch);
            if produced < out.len() {
                warn!(sound = %id, produced, requested = out.len(), "Sound underrun");
            }
            slot.level.update_block(&scratch[..produced]);
            for (mixed, sample) in out.iter_mut().zip(&scratch[..produced]) {
                *mixed += sample;
            }
        }

        for sample in out.iter_mut() {
            *sample = params::clamp_or(*sample, -1.0, 1.0, 0.0);
        }
        out.len()
    }

    /// Decay every meter's peak hold (call periodically)
    pub fn decay_meters(&mut self, amount: f32) {
        for slot in self.sounds.values_mut() {
            slot.level.decay_peak(amount);
        }
    }
}

impl CommandExecutor for SoundMixer {
    fn execute(&self, command: Command) -> CommandResult {
        match self.sounds.get(&SoundId::from(command.sound_id())) {
            Some(slot) => command.apply(&slot.controls),
            None => CommandResult::Error(
                AudioError::SoundNotFound(command.sound_id().to_string()).to_string(),
            ),
        }
    }
}

impl Drop for SoundMixer {
    fn drop(&mut self) {
        for (id, slot) in &self.sounds {
            dispose_logged(&slot.pipeline.lifecycle(), id.as_str());
        }
    }
}

impl fmt::Debug for SoundMixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundMixer")
            .field("sample_rate", &self.sample_rate)
            .field("sounds", &self.sounds.keys().collect::<Vec<_>>())
            .finish()
    }
}
