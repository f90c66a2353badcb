//! Integration tests for the threaded engine and mix files

use murmur_core::domain::{
    Command, CommandExecutor, EffectParameters, EffectType, EngineConfig, EqPreset, MixConfig,
    PipelineConfig, SoundConfig, SourceConfig,
};
use murmur_infra::audio::AudioEngine;
use murmur_tests::{source, white_noise};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn engine(block_size: usize) -> AudioEngine {
    let config = EngineConfig {
        block_size,
        queue_depth: 8,
        ..EngineConfig::default()
    };
    AudioEngine::new(config, PipelineConfig::default())
}

/// Call the output callback at roughly real-time pace for `blocks` blocks
fn run_callbacks(engine: &mut AudioEngine, blocks: usize, block_size: usize) -> Vec<f32> {
    let period = Duration::from_secs_f64(block_size as f64 / 48000.0);
    let mut mixed = Vec::with_capacity(blocks * block_size);
    let mut out = vec![0.0; block_size];
    for _ in 0..blocks {
        let started = Instant::now();
        engine.mix_into(&mut out);
        mixed.extend_from_slice(&out);
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    mixed
}

#[test]
fn test_engine_renders_configured_sounds() {
    let mut engine = engine(256);
    for sound in &MixConfig::factory_default().sounds {
        engine
            .add_configured(sound, source(white_noise(48000, 4), true))
            .unwrap();
    }
    assert_eq!(engine.len(), 2);

    // Let the render threads get ahead of the callback
    std::thread::sleep(Duration::from_millis(50));
    let mixed = run_callbacks(&mut engine, 40, 256);

    assert!(mixed.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
    assert!(mixed.iter().any(|&y| y != 0.0));
    for (_, level) in engine.levels() {
        assert!(level.peak_db > -60.0);
    }
}

#[test]
fn test_callback_size_differs_from_block_size() {
    let mut engine = engine(128);
    engine
        .add_sound("hum".into(), "Hum", source(vec![0.25; 128], true))
        .unwrap()
        .set_volume(1.0);
    std::thread::sleep(Duration::from_millis(50));

    let mut out = vec![0.0; 200];
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        engine.mix_into(&mut out);
        if out.iter().all(|&y| (y - 0.25).abs() < 0.05) || Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(out.iter().all(|&y| (y - 0.25).abs() < 0.05));
}

#[test]
fn test_commands_switch_effects_while_running() {
    let mut engine = engine(256);
    engine
        .add_sound("wind".into(), "Wind", source(white_noise(48000, 8), true))
        .unwrap();

    for effect in EffectType::ALL {
        let result = engine.execute(Command::SetEffect {
            sound_id: "wind".to_string(),
            effect,
        });
        assert!(!result.is_error());
        let mixed = run_callbacks(&mut engine, 10, 256);
        assert!(mixed.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
    }

    let result = engine.execute(Command::ClearTails {
        sound_id: "wind".to_string(),
    });
    assert!(!result.is_error());

    engine.remove_sound(&"wind".into()).unwrap();
    let result = engine.execute(Command::ClearTails {
        sound_id: "wind".to_string(),
    });
    assert!(result.is_error());
}

#[tokio::test]
async fn test_mix_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mix.toml");

    let mut config = MixConfig::factory_default();
    config.sounds.push(SoundConfig {
        id: "creek".to_string(),
        name: "Creek".to_string(),
        source: SourceConfig::Wav {
            path: "creek.wav".into(),
            looping: true,
        },
        volume: 0.5,
        eq_preset: Some(EqPreset::Bright),
        band_gains: vec![-2.0, 0.0, 1.5],
        effect: EffectParameters::Echo {
            delay_ms: 350.0,
            mix: 0.3,
            feedback: 0.2,
        },
    });

    config.save_to_file(&path).await.unwrap();
    let loaded = MixConfig::load_from_file(&path).await.unwrap();
    assert_eq!(loaded, config);
}
