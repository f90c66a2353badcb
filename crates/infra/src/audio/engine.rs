//! Real-time audio engine
//!
//! This module provides the AudioEngine which owns one render thread per
//! sound and mixes their ready blocks for an output callback.

use super::{BlockQueue, BlockReader, RenderThread};
use murmur_core::domain::audio::{AudioError, Result};
use murmur_core::domain::dsp::params;
use murmur_core::domain::{
    AudioLevel, Command, CommandExecutor, CommandResult, EngineConfig, MixConfig, PipelineConfig,
    SampleSource, SoundConfig, SoundControls, SoundId, SoundPipeline, SourceLifecycle,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One registered sound as seen from the output side
struct Voice {
    name: String,
    controls: Arc<SoundControls>,
    lifecycle: Arc<SourceLifecycle>,
    reader: BlockReader,
    thread: RenderThread,
    level: AudioLevel,
}

/// Audio engine mixing per-sound render threads
pub struct AudioEngine {
    config: EngineConfig,
    pipeline_config: PipelineConfig,
    voices: BTreeMap<SoundId, Voice>,
    scratch: Vec<f32>,
}

impl AudioEngine {
    /// Create a new audio engine
    pub fn new(config: EngineConfig, pipeline_config: PipelineConfig) -> Self {
        info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            queue_depth = config.queue_depth,
            "Creating audio engine"
        );
        let scratch = vec![0.0; config.block_size];
        Self {
            config,
            pipeline_config,
            voices: BTreeMap::new(),
            scratch,
        }
    }

    /// Engine laid out by a mix file, with no sounds started yet
    pub fn from_config(config: &MixConfig) -> Self {
        Self::new(config.engine.clone(), config.pipeline.clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start rendering a sound on its own thread
    pub fn add_sound(
        &mut self,
        id: SoundId,
        name: impl Into<String>,
        source: Box<dyn SampleSource>,
    ) -> Result<Arc<SoundControls>> {
        if self.voices.contains_key(&id) {
            return Err(AudioError::DuplicateSound(id.to_string()));
        }
        if source.sample_rate() != self.config.sample_rate {
            return Err(AudioError::InvalidConfiguration(format!(
                "sound '{id}' runs at {} Hz, engine at {} Hz",
                source.sample_rate(),
                self.config.sample_rate
            )));
        }

        let pipeline = SoundPipeline::new(source, &self.pipeline_config);
        let controls = pipeline.controls();
        let lifecycle = pipeline.lifecycle();
        let queue = Arc::new(BlockQueue::new(
            self.config.queue_depth,
            self.config.block_size,
        ));
        let thread = RenderThread::spawn(id.as_str(), pipeline, Arc::clone(&queue))?;

        let name = name.into();
        info!(sound = %id, name = %name, "Sound started");
        self.voices.insert(
            id,
            Voice {
                name,
                controls: Arc::clone(&controls),
                lifecycle,
                reader: BlockReader::new(queue),
                thread,
                level: AudioLevel::new(),
            },
        );
        Ok(controls)
    }

    /// Start a configured sound and push its settings into the controls
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

    /// Dispose a sound's source and join its render thread
    pub fn remove_sound(&mut self, id: &SoundId) -> Result<()> {
        let mut voice = self
            .voices
            .remove(id)
            .ok_or_else(|| AudioError::SoundNotFound(id.to_string()))?;
        Self::retire(id, &mut voice);
        Ok(())
    }

    fn retire(id: &SoundId, voice: &mut Voice) {
        if voice.lifecycle.dispose() {
            debug!(sound = %id, "Source disposed");
        }
        voice.thread.stop();
        info!(sound = %id, name = %voice.name, "Sound stopped");
    }

    pub fn controls(&self, id: &SoundId) -> Option<Arc<SoundControls>> {
        self.voices.get(id).map(|voice| Arc::clone(&voice.controls))
    }

    pub fn level(&self, id: &SoundId) -> Option<AudioLevel> {
        self.voices.get(id).map(|voice| voice.level)
    }

    /// Snapshot of every sound's meter in mix order
    pub fn levels(&self) -> Vec<(SoundId, AudioLevel)> {
        self.voices
            .iter()
            .map(|(id, voice)| (id.clone(), voice.level))
            .collect()
    }

    pub fn sound_ids(&self) -> impl Iterator<Item = &SoundId> {
        self.voices.keys()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Blocks missed by the output callback, summed over every sound
    pub fn underruns(&self) -> u64 {
        self.voices
            .values()
            .map(|voice| voice.reader.queue().underruns())
            .sum()
    }

    /// Output callback: mix every sound's ready samples into `out`
    ///
    /// Never blocks. A sound with nothing ready contributes silence for the
    /// missing part of the block. The sum is clamped to [-1, 1] and NaN is
    /// replaced by silence.
    pub fn mix_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.scratch.len() < out.len() {
            warn!(
                requested = out.len(),
                block_size = self.config.block_size,
                "Callback larger than scratch, growing"
            );
            self.scratch.resize(out.len(), 0.0);
        }
        let scratch = &mut self.scratch[..out.len()];

        for voice in self.voices.values_mut() {
            let copied = voice.reader.read(scratch);
            scratch[copied..].fill(0.0);
            voice.level.update_block(scratch);
            for (mixed, sample) in out.iter_mut().zip(scratch.iter()) {
                *mixed += sample;
            }
        }

        for sample in out.iter_mut() {
            *sample = params::clamp_or(*sample, -1.0, 1.0, 0.0);
        }
    }

    /// Decay every meter's peak hold (call periodically)
    pub fn decay_meters(&mut self, amount: f32) {
        for voice in self.voices.values_mut() {
            voice.level.decay_peak(amount);
        }
    }

    /// Stop every render thread
    pub fn shutdown(&mut self) {
        if self.voices.is_empty() {
            return;
        }
        info!("Shutting down audio engine");
        for (id, mut voice) in std::mem::take(&mut self.voices) {
            Self::retire(&id, &mut voice);
        }
    }
}

impl CommandExecutor for AudioEngine {
    fn execute(&self, command: Command) -> CommandResult {
        match self.voices.get(&SoundId::from(command.sound_id())) {
            Some(voice) => command.apply(&voice.controls),
            None => CommandResult::Error(
                AudioError::SoundNotFound(command.sound_id().to_string()).to_string(),
            ),
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("config", &self.config)
            .field("sounds", &self.voices.keys().collect::<Vec<_>>())
            .finish()
    }
}
