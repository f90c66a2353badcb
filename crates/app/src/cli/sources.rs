//! Building sample sources from a mix file

use anyhow::{bail, Context, Result};
use murmur_core::domain::{BufferSource, NoiseSource, SampleSource, SourceConfig};
use std::path::Path;
use tracing::{debug, info};

/// Build the source a sound config describes
///
/// Relative WAV paths resolve against `base_dir`, usually the config's folder.
pub fn build_source(
    config: &SourceConfig,
    sample_rate: u32,
    base_dir: &Path,
) -> Result<Box<dyn SampleSource>> {
    match config {
        SourceConfig::Noise { color, amplitude } => {
            Ok(Box::new(NoiseSource::new(*color, *amplitude, sample_rate)))
        }
        SourceConfig::Wav { path, looping } => {
            let path = base_dir.join(path);
            let (samples, file_rate) = read_wav_mono(&path)?;
            if file_rate != sample_rate {
                bail!(
                    "{} is {} Hz but the mix runs at {} Hz",
                    path.display(),
                    file_rate,
                    sample_rate
                );
            }
            info!(path = %path.display(), samples = samples.len(), looping, "Loaded WAV source");
            Ok(Box::new(
                BufferSource::new(samples, file_rate).looping(*looping),
            ))
        }
    }
}

/// Decode a WAV file, averaging channels down to mono
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    debug!(?spec, "Decoding WAV");

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Corrupt samples in {}", path.display()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Corrupt samples in {}", path.display()))?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Write a mono float WAV file
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
