//! Murmur CLI Application

mod sources;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use murmur_core::domain::{
    AudioLevel, Command, CommandExecutor, EffectType, EqPreset, MixConfig, SoundId, SoundMixer,
};
use murmur_infra::audio::AudioEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Ambient sound mixer with a streaming effects pipeline", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mix every sound offline into a WAV file
    Render {
        /// Mix file (factory mix when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output WAV path
        #[arg(short, long, default_value = "murmur.wav")]
        output: PathBuf,

        /// Length of the render in seconds
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f32,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run the threaded engine in real time without an audio device
    Live {
        /// Mix file (factory mix when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How long to run, in seconds
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f32,

        /// Milliseconds between meter reports
        #[arg(long, default_value_t = 500)]
        meter_interval_ms: u64,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write the factory mix to a config file
    Init {
        #[arg(short, long, default_value = "murmur.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-sound settings applied on top of the mix file
#[derive(Debug, Default, Args)]
struct Overrides {
    /// Override a sound's effect, as `<sound>=<effect>`
    #[arg(long = "effect", value_name = "SOUND=EFFECT")]
    effects: Vec<String>,

    /// Apply an EQ preset to a sound, as `<sound>=<preset>`
    #[arg(long = "preset", value_name = "SOUND=PRESET")]
    presets: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SoundReport {
    id: String,
    name: String,
    peak_db: f32,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    output: PathBuf,
    sample_rate: u32,
    samples: usize,
    peak_db: f32,
    sounds: Vec<SoundReport>,
}

#[derive(Debug, Serialize)]
struct MeterReport {
    elapsed_secs: f32,
    underruns: u64,
    levels: Vec<(SoundId, AudioLevel)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Murmur starting...");

    match cli.command {
        Commands::Render {
            config,
            output,
            seconds,
            overrides,
        } => render(config.as_deref(), &output, seconds, &overrides, cli.json).await,
        Commands::Live {
            config,
            seconds,
            meter_interval_ms,
            overrides,
        } => live(config.as_deref(), seconds, meter_interval_ms, &overrides, cli.json).await,
        Commands::Init { path, force } => init(&path, force).await,
    }
}

/// Load the mix and the folder its relative paths resolve against
async fn load_mix(path: Option<&Path>) -> Result<(MixConfig, PathBuf)> {
    match path {
        Some(path) => {
            let config = MixConfig::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load mix from {}", path.display()))?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((config, base))
        }
        None => {
            info!("No mix file given, using the factory mix");
            Ok((MixConfig::factory_default(), PathBuf::from(".")))
        }
    }
}

fn split_override<'a>(raw: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    raw.split_once('=')
        .with_context(|| format!("expected <sound>={what}, got '{raw}'"))
}

/// Parse `<sound>=<value>` overrides into commands, presets first
fn override_commands(overrides: &Overrides) -> Result<Vec<Command>> {
    let mut commands = Vec::with_capacity(overrides.effects.len() + overrides.presets.len());
    for raw in &overrides.presets {
        let (sound_id, preset) = split_override(raw, "<preset>")?;
        let preset: EqPreset = preset.parse().map_err(anyhow::Error::msg)?;
        commands.push(Command::SetEqPreset {
            sound_id: sound_id.to_string(),
            preset,
        });
    }
    for raw in &overrides.effects {
        let (sound_id, effect) = split_override(raw, "<effect>")?;
        let effect: EffectType = effect.parse().map_err(anyhow::Error::msg)?;
        commands.push(Command::SetEffect {
            sound_id: sound_id.to_string(),
            effect,
        });
    }
    Ok(commands)
}

fn execute_all(executor: &impl CommandExecutor, commands: Vec<Command>) -> Result<()> {
    for command in commands {
        let result = executor.execute(command);
        if result.is_error() {
            bail!("{result:?}");
        }
        info!(?result, "Applied override");
    }
    Ok(())
}

/// Meter decay for one block at the configured rate
fn decay_per_block(config: &MixConfig) -> f32 {
    let engine = &config.engine;
    engine.meter_decay_db_per_sec * engine.block_size as f32 / engine.sample_rate as f32
}

async fn render(
    config_path: Option<&Path>,
    output: &Path,
    seconds: f32,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    if seconds.is_nan() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let (config, base) = load_mix(config_path).await?;
    let sample_rate = config.engine.sample_rate;

    let mut mixer = SoundMixer::new(sample_rate, config.pipeline.clone());
    for sound in &config.sounds {
        let source = sources::build_source(&sound.source, sample_rate, &base)
            .with_context(|| format!("Failed to build source for '{}'", sound.id))?;
        mixer.add_configured(sound, source)?;
    }
    execute_all(&mixer, override_commands(overrides)?)?;

    let total = (seconds * sample_rate as f32).round() as usize;
    let block_size = config.engine.block_size;
    let decay = decay_per_block(&config);
    let mut rendered = vec![0.0; total];
    for block in rendered.chunks_mut(block_size) {
        mixer.render(block);
        mixer.decay_meters(decay);
    }

    sources::write_wav_mono(output, &rendered, sample_rate)?;

    let peak = murmur_core::domain::peak(&rendered);
    let mut master = AudioLevel::new();
    master.update(peak);
    let report = RenderReport {
        output: output.to_path_buf(),
        sample_rate,
        samples: rendered.len(),
        peak_db: master.peak_db,
        sounds: mixer
            .sound_ids()
            .map(|id| SoundReport {
                id: id.to_string(),
                name: mixer.name(id).unwrap_or_default().to_string(),
                peak_db: mixer.level(id).map_or(AudioLevel::MIN_LEVEL, |l| l.peak_db),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Rendered {} samples at {} Hz to {} (peak {:.1} dB)",
            report.samples,
            report.sample_rate,
            report.output.display(),
            report.peak_db
        );
        for sound in &report.sounds {
            println!("  {:<12} {:<20} {:>6.1} dB", sound.id, sound.name, sound.peak_db);
        }
    }
    Ok(())
}

async fn live(
    config_path: Option<&Path>,
    seconds: f32,
    meter_interval_ms: u64,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    if seconds.is_nan() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let (config, base) = load_mix(config_path).await?;
    let sample_rate = config.engine.sample_rate;
    let block_size = config.engine.block_size;

    let mut engine = AudioEngine::from_config(&config);
    for sound in &config.sounds {
        let source = sources::build_source(&sound.source, sample_rate, &base)
            .with_context(|| format!("Failed to build source for '{}'", sound.id))?;
        engine.add_configured(sound, source)?;
    }
    execute_all(&engine, override_commands(overrides)?)?;

    let block_period = config.engine.block_duration();
    let total_blocks = (seconds as f64 / block_period.as_secs_f64()).ceil() as u64;
    let report_every = (Duration::from_millis(meter_interval_ms).as_secs_f64()
        / block_period.as_secs_f64())
    .ceil()
    .max(1.0) as u64;
    let decay = decay_per_block(&config);

    let mut ticker = tokio::time::interval(block_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut out = vec![0.0; block_size];
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(blocks = total_blocks, "Running engine");
    for block in 1..=total_blocks {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                warn!("Interrupted");
                break;
            }
        }

        engine.mix_into(&mut out);
        engine.decay_meters(decay);

        if block % report_every == 0 {
            let report = MeterReport {
                elapsed_secs: (block as f64 * block_period.as_secs_f64()) as f32,
                underruns: engine.underruns(),
                levels: engine.levels(),
            };
            print_meters(&report, json)?;
        }
    }

    let underruns = engine.underruns();
    engine.shutdown();
    if underruns > 0 {
        warn!(underruns, "Engine missed blocks");
    }
    info!("Engine stopped");
    Ok(())
}

fn print_meters(report: &MeterReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    let meters: Vec<String> = report
        .levels
        .iter()
        .map(|(id, level)| format!("{id} {:>6.1} dB", level.current_db))
        .collect();
    println!(
        "[{:>6.2}s] {} (underruns {})",
        report.elapsed_secs,
        meters.join(" | "),
        report.underruns
    );
    Ok(())
}

async fn init(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    MixConfig::factory_default()
        .save_to_file(path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote factory mix to {}", path.display());
    Ok(())
}
