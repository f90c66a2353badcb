//! Integration tests for the sound pipeline
//!
//! These tests drive complete chains (source through volume) and the
//! individual stages through their public API only.

use murmur_core::domain::{
    BufferSource, Command, CommandExecutor, EchoLine, Effect, EffectParameters, EffectType,
    EffectsManager, Equalizer, MixConfig, Normalizer, PipelineConfig, PitchShifter, Reverb,
    SampleSource, SoundMixer, SoundPipeline,
};
use murmur_tests::{drain, impulse, rms, sine, source, white_noise, SAMPLE_RATE};

fn plain_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.cleaner.enabled = false;
    config.normalizer.enabled = false;
    config
}

// ============================================================================
// STAGE PROPERTIES
// ============================================================================

#[test]
fn test_echo_delay_is_exact_at_48k() {
    let mut echo = EchoLine::new(SAMPLE_RATE);
    echo.set_delay_ms(500.0);
    echo.set_feedback(0.0);
    echo.set_mix(1.0);
    assert_eq!(echo.delay_samples(), 24000);

    let mut buffer = impulse(30000);
    for block in buffer.chunks_mut(512) {
        echo.process(block);
    }

    assert_eq!(buffer[24000], 1.0);
    for (n, &y) in buffer.iter().enumerate() {
        if n != 24000 {
            assert_eq!(y, 0.0, "unexpected energy at {n}");
        }
    }
}

#[test]
fn test_flat_equalizer_is_identity() {
    let input = white_noise(9600, 3);
    let mut eq = Equalizer::with_default_bands(SAMPLE_RATE);
    let mut output = input.clone();
    eq.process(&mut output);

    for (x, y) in input.iter().zip(output.iter()) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_reverb_stays_bounded_on_loud_noise() {
    let mut reverb = Reverb::new(SAMPLE_RATE);
    reverb.set_mix(1.0);
    reverb.set_time(10.0);
    reverb.set_width(1.0);

    let mut buffer = white_noise(SAMPLE_RATE as usize * 10, 11);
    for block in buffer.chunks_mut(1024) {
        reverb.process(block);
    }
    assert!(buffer.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
}

#[test]
fn test_normalizer_tames_hot_signal() {
    let mut normalizer = Normalizer::new();
    let mut buffer = vec![50.0; 2000];
    normalizer.process(&mut buffer);
    assert!(buffer.iter().all(|&y| y.abs() <= 1.0 && y != 0.0));
}

#[test]
fn test_pitch_near_unity_is_bit_exact() {
    let input = sine(4096, 330.0, 0.6);
    for factor in [0.995, 1.0, 1.003, 1.005] {
        let mut pitch = PitchShifter::new();
        pitch.set_factor(factor);
        let mut upstream = BufferSource::new(input.clone(), SAMPLE_RATE);

        let mut out = vec![0.0; 4096];
        let mut written = 0;
        while written < out.len() {
            let end = (written + 256).min(out.len());
            written += pitch.read(&mut upstream, &mut out[written..end]);
        }
        assert_eq!(out, input, "factor {factor} altered the signal");
    }
}

#[test]
fn test_pitch_up_keeps_producing() {
    let mut pitch = PitchShifter::new();
    pitch.set_factor(2.0);
    let mut upstream = BufferSource::new(sine(48000, 220.0, 0.5), SAMPLE_RATE).looping(true);

    let mut out = vec![0.0; 512];
    for _ in 0..50 {
        assert_eq!(pitch.read(&mut upstream, &mut out), 512);
        assert!(out.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
    }
}

#[test]
fn test_switching_effect_drops_reverb_tail() {
    let mut manager = EffectsManager::new(SAMPLE_RATE);
    manager.configure(&EffectParameters::Reverb {
        mix: 1.0,
        time: 8.0,
        width: 1.0,
        freeze: false,
    });

    let mut loud = BufferSource::new(white_noise(4800, 5), SAMPLE_RATE);
    let mut out = vec![0.0; 4800];
    manager.read(&mut loud, &mut out);
    assert!(rms(&out) > 0.0);

    manager.configure(&EffectParameters::default_for(EffectType::Echo));
    assert_eq!(manager.active(), EffectType::Echo);

    let mut silent = BufferSource::new(vec![0.0; 4800], SAMPLE_RATE);
    let mut out = vec![1.0; 4800];
    assert_eq!(manager.read(&mut silent, &mut out), 4800);
    assert!(out.iter().all(|&y| y == 0.0));
}

// ============================================================================
// FULL CHAIN
// ============================================================================

#[test]
fn test_every_effect_through_full_chain() {
    for kind in EffectType::ALL {
        let mut pipeline =
            SoundPipeline::new(source(white_noise(4800, 9), true), &PipelineConfig::default());
        let controls = pipeline.controls();
        controls.set_volume(1.0);
        controls.apply_effect(&EffectParameters::default_for(kind));

        let out = drain(&mut pipeline, 48000, 480);
        assert_eq!(out.len(), 48000, "{kind} starved the chain");
        assert!(
            out.iter().all(|y| y.is_finite() && y.abs() <= 1.0),
            "{kind} left the unit range"
        );
        assert_eq!(pipeline.active_effect(), kind);
    }
}

/// Every float of `kind`'s parameter set replaced by NaN
fn nan_parameters(kind: EffectType) -> EffectParameters {
    let nan = f32::NAN;
    match EffectParameters::default_for(kind) {
        EffectParameters::None => EffectParameters::None,
        EffectParameters::Reverb { freeze, .. } => EffectParameters::Reverb {
            mix: nan,
            time: nan,
            width: nan,
            freeze,
        },
        EffectParameters::Pitch { .. } => EffectParameters::Pitch { factor: nan },
        EffectParameters::Echo { .. } => EffectParameters::Echo {
            delay_ms: nan,
            mix: nan,
            feedback: nan,
        },
        EffectParameters::Flanger { .. } => EffectParameters::Flanger {
            rate: nan,
            depth: nan,
            feedback: nan,
            mix: nan,
        },
    }
}

#[test]
fn test_nan_controls_keep_output_finite() {
    for kind in EffectType::ALL {
        let mut pipeline =
            SoundPipeline::new(source(sine(4800, 330.0, 0.5), true), &PipelineConfig::default());
        let controls = pipeline.controls();
        controls.set_volume(f32::NAN);
        controls.set_band_gain(2, f32::NAN);
        controls.apply_effect(&nan_parameters(kind));
        assert!(controls.volume().is_finite());

        let out = drain(&mut pipeline, 9600, 480);
        assert_eq!(out.len(), 9600, "{kind} starved the chain");
        assert!(
            out.iter().all(|y| y.is_finite() && y.abs() <= 1.0),
            "{kind} let NaN through"
        );
        assert!(rms(&out) > 0.0, "{kind} went silent");
    }
}

#[test]
fn test_finite_source_ends_cleanly() {
    let mut pipeline = SoundPipeline::new(source(vec![0.3; 1000], false), &plain_config());
    let out = drain(&mut pipeline, 4000, 256);
    assert_eq!(out.len(), 1000);
}

#[test]
fn test_volume_scales_output() {
    let input = sine(4800, 440.0, 0.5);
    let mut loud = SoundPipeline::new(source(input.clone(), true), &plain_config());
    let mut quiet = SoundPipeline::new(source(input, true), &plain_config());
    loud.controls().set_volume(1.0);
    quiet.controls().set_volume(0.25);

    let loud = drain(&mut loud, 4800, 480);
    let quiet = drain(&mut quiet, 4800, 480);
    assert!((rms(&quiet) * 4.0 - rms(&loud)).abs() < 1e-3);
}

#[test]
fn test_controls_from_another_thread() {
    let mut pipeline = SoundPipeline::new(source(vec![0.5; 480], true), &plain_config());
    let controls = pipeline.controls();

    std::thread::spawn(move || {
        controls.set_volume(0.0);
        controls.set_effect(EffectType::Flanger);
    })
    .join()
    .unwrap();

    let mut out = vec![1.0; 480];
    pipeline.read(&mut out);
    assert!(out.iter().all(|&y| y == 0.0));
    assert_eq!(pipeline.active_effect(), EffectType::Flanger);
}

// ============================================================================
// OFFLINE MIXER
// ============================================================================

#[test]
fn test_factory_mix_renders_in_range() {
    let config = MixConfig::factory_default();
    let mut mixer = SoundMixer::new(SAMPLE_RATE, config.pipeline.clone());
    for (i, sound) in config.sounds.iter().enumerate() {
        let noise = source(white_noise(48000, i as u64), true);
        mixer.add_configured(sound, noise).unwrap();
    }
    assert_eq!(mixer.len(), config.sounds.len());

    let mut out = vec![0.0; 512];
    for _ in 0..200 {
        assert_eq!(mixer.render(&mut out), 512);
        assert!(out.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
    }
}

#[test]
fn test_mixer_commands_change_render() {
    let mut mixer = SoundMixer::new(SAMPLE_RATE, plain_config());
    mixer
        .add_sound("tone".into(), "Tone", source(vec![0.4; 512], true))
        .unwrap()
        .set_volume(1.0);

    let mut out = vec![0.0; 512];
    mixer.render(&mut out);
    assert!(out.iter().all(|&y| (y - 0.4).abs() < 1e-4));

    let result = mixer.execute(Command::SetVolume {
        sound_id: "tone".to_string(),
        volume: 0.5,
    });
    assert!(!result.is_error());
    mixer.render(&mut out);
    assert!(out.iter().all(|&y| (y - 0.2).abs() < 1e-4));
}
