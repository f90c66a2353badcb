//! Shared signal helpers for the integration tests

use murmur_core::domain::{BufferSource, SampleSource};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const SAMPLE_RATE: u32 = 48000;

pub fn sine(samples: usize, frequency: f32, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32;
            amplitude * phase.sin()
        })
        .collect()
}

/// Uniform white noise in [-1, 1], reproducible per seed
pub fn white_noise(samples: usize, seed: u64) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..samples).map(|_| rng.gen_range(-1.0..=1.0)).collect()
}

pub fn impulse(samples: usize) -> Vec<f32> {
    let mut buffer = vec![0.0; samples];
    if let Some(first) = buffer.first_mut() {
        *first = 1.0;
    }
    buffer
}

pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
}

/// Boxed in-memory source at the test sample rate
pub fn source(samples: Vec<f32>, looping: bool) -> Box<dyn SampleSource> {
    Box::new(BufferSource::new(samples, SAMPLE_RATE).looping(looping))
}

/// Pull `total` samples from `source` in blocks of `block`
pub fn drain(source: &mut dyn SampleSource, total: usize, block: usize) -> Vec<f32> {
    let mut out = vec![0.0; total];
    let mut written = 0;
    while written < total {
        let end = (written + block).min(total);
        let produced = source.read(&mut out[written..end]);
        if produced == 0 {
            break;
        }
        written += produced;
    }
    out.truncate(written);
    out
}
