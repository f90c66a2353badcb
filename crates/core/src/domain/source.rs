//! Sample sources feeding the head of each pipeline
//!
//! A source is anything that can fill a mono `f32` block on demand. Returning
//! `0` means end-of-stream or a transient underrun; callers must not treat it
//! as an error.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Upstream contract for every pipeline stage
pub trait SampleSource: Send {
    /// Fill `buffer` with up to `buffer.len()` samples and return how many were produced
    fn read(&mut self, buffer: &mut [f32]) -> usize;

    /// Sample rate of the produced stream in Hz
    fn sample_rate(&self) -> u32;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        (**self).read(buffer)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Lifecycle of a source wrapped by a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceState {
    Active = 0,
    Disposed = 1,
}

/// Shared lifecycle flag
///
/// Set to `Disposed` exactly once at teardown (release), read by the render
/// thread at the start of each block (acquire).
#[derive(Debug)]
pub struct SourceLifecycle {
    state: AtomicU8,
}

impl SourceLifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SourceState::Active as u8),
        }
    }

    pub fn state(&self) -> SourceState {
        match self.state.load(Ordering::Acquire) {
            0 => SourceState::Active,
            _ => SourceState::Disposed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SourceState::Active
    }

    /// Mark the source disposed
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn dispose(&self) -> bool {
        self.state
            .compare_exchange(
                SourceState::Active as u8,
                SourceState::Disposed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for SourceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Source wrapper with an explicit `{Active, Disposed}` state
///
/// Once disposed, reads short-circuit to a block of silence and the inner
/// source is never touched again.
pub struct ManagedSource {
    inner: Box<dyn SampleSource>,
    lifecycle: Arc<SourceLifecycle>,
    sample_rate: u32,
}

impl ManagedSource {
    pub fn new(inner: Box<dyn SampleSource>) -> Self {
        let sample_rate = inner.sample_rate();
        Self {
            inner,
            lifecycle: Arc::new(SourceLifecycle::new()),
            sample_rate,
        }
    }

    /// Handle the owner keeps to dispose the source from another thread
    pub fn lifecycle(&self) -> Arc<SourceLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

impl SampleSource for ManagedSource {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        if !self.lifecycle.is_active() {
            buffer.fill(0.0);
            return buffer.len();
        }
        self.inner.read(buffer)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ============================================================================
// BUFFER SOURCE
// ============================================================================

/// In-memory source, optionally looping
///
/// Ambient sounds are usually short recordings played as seamless loops.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Arc<[f32]>,
    position: usize,
    looping: bool,
    sample_rate: u32,
}

impl BufferSource {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            position: 0,
            looping: false,
            sample_rate,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples left before the end (ignores looping)
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for BufferSource {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        if self.samples.is_empty() {
            return 0;
        }

        let mut written = 0;
        while written < buffer.len() {
            if self.position >= self.samples.len() {
                if !self.looping {
                    break;
                }
                self.position = 0;
            }
            let chunk = (buffer.len() - written).min(self.samples.len() - self.position);
            buffer[written..written + chunk]
                .copy_from_slice(&self.samples[self.position..self.position + chunk]);
            self.position += chunk;
            written += chunk;
        }
        written
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ============================================================================
// NOISE SOURCE
// ============================================================================

/// Spectral colour of generated noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    /// Flat spectrum: hiss, light rain
    White,
    /// -6 dB/octave: surf, distant wind
    Brown,
}

/// Endless generated noise
pub struct NoiseSource {
    rng: SmallRng,
    color: NoiseColor,
    amplitude: f32,
    brown_state: f32,
    sample_rate: u32,
}

impl NoiseSource {
    pub fn new(color: NoiseColor, amplitude: f32, sample_rate: u32) -> Self {
        info!(?color, amplitude, "Creating noise source");
        Self::with_rng(color, amplitude, sample_rate, SmallRng::from_entropy())
    }

    /// Deterministic noise for tests and benchmarks
    pub fn seeded(color: NoiseColor, amplitude: f32, sample_rate: u32, seed: u64) -> Self {
        Self::with_rng(color, amplitude, sample_rate, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(color: NoiseColor, amplitude: f32, sample_rate: u32, rng: SmallRng) -> Self {
        Self {
            rng,
            color,
            amplitude: amplitude.clamp(0.0, 1.0),
            brown_state: 0.0,
            sample_rate,
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        let white: f32 = self.rng.gen_range(-1.0..=1.0);
        match self.color {
            NoiseColor::White => white * self.amplitude,
            NoiseColor::Brown => {
                // Leaky integrator keeps the walk centred
                self.brown_state = (self.brown_state + 0.02 * white) / 1.02;
                (self.brown_state * 3.5).clamp(-1.0, 1.0) * self.amplitude
            }
        }
    }
}

impl SampleSource for NoiseSource {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample();
        }
        buffer.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl std::fmt::Debug for NoiseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSource")
            .field("color", &self.color)
            .field("amplitude", &self.amplitude)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Dispose helper used by registries at teardown
pub(crate) fn dispose_logged(lifecycle: &SourceLifecycle, label: &str) {
    if lifecycle.dispose() {
        debug!(sound = label, "Source disposed");
    }
}
