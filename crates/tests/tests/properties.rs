//! Property tests over the parameter space of each stage

use murmur_core::domain::dsp::params::{
    EQ_GAIN_MAX, EQ_GAIN_MIN, FEEDBACK_MAX, PITCH_MAX, PITCH_MIN, REVERB_TIME_MAX,
    REVERB_TIME_MIN,
};
use murmur_core::domain::{
    db_to_gain, BiquadCoeffs, BiquadFilter, BufferSource, EchoLine, Effect, EffectParameters,
    Flanger, PipelineConfig, PitchShifter, Reverb, SampleSource, SoundPipeline,
};
use murmur_tests::{rms, sine, source, white_noise, SAMPLE_RATE};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reverb_output_is_bounded(
        mix in 0.0f32..=1.0,
        time in REVERB_TIME_MIN..=REVERB_TIME_MAX,
        width in 0.0f32..=1.0,
        freeze in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let mut reverb = Reverb::new(SAMPLE_RATE);
        reverb.set_mix(mix);
        reverb.set_time(time);
        reverb.set_width(width);
        reverb.set_freeze(freeze);

        let mut buffer = white_noise(SAMPLE_RATE as usize * 2, seed);
        for block in buffer.chunks_mut(512) {
            reverb.process(block);
        }
        prop_assert!(buffer.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
    }

    #[test]
    fn zero_db_peaking_band_keeps_rms(
        frequency in 40.0f32..16000.0,
        q in 0.3f32..4.0,
    ) {
        let coeffs = BiquadCoeffs::peaking(SAMPLE_RATE as f32, frequency, q, db_to_gain(0.0));
        let mut filter = BiquadFilter::new(coeffs);
        let input = sine(9600, 997.0, 0.5);
        let mut output = input.clone();
        filter.process(&mut output);
        prop_assert!((rms(&input) - rms(&output)).abs() < 1e-4);
    }

    #[test]
    fn echo_feedback_never_blows_up(
        delay_ms in 10.0f32..200.0,
        feedback in 0.0f32..=FEEDBACK_MAX,
        mix in 0.0f32..=1.0,
    ) {
        let mut echo = EchoLine::new(SAMPLE_RATE);
        echo.set_delay_ms(delay_ms);
        echo.set_feedback(feedback);
        echo.set_mix(mix);

        let mut buffer = sine(48000, 180.0, 1.0);
        echo.process(&mut buffer);
        prop_assert!(buffer.iter().all(|y| y.is_finite()));
        prop_assert!(buffer.iter().all(|y| y.abs() <= 1.0 / (1.0 - FEEDBACK_MAX) + 1.0));
    }

    #[test]
    fn flanger_output_is_finite(
        rate in 0.1f32..5.0,
        depth in 0.01f32..=1.0,
        feedback in 0.0f32..=FEEDBACK_MAX,
        mix in 0.0f32..=1.0,
    ) {
        let mut flanger = Flanger::new(SAMPLE_RATE);
        flanger.set_rate(rate);
        flanger.set_depth(depth);
        flanger.set_feedback(feedback);
        flanger.set_mix(mix);

        let mut buffer = white_noise(24000, 1);
        flanger.process(&mut buffer);
        prop_assert!(buffer.iter().all(|y| y.is_finite()));
    }

    #[test]
    fn pitch_fills_every_block_from_looping_source(
        factor in PITCH_MIN..=PITCH_MAX,
        block in 32usize..2048,
    ) {
        let mut pitch = PitchShifter::new();
        pitch.set_factor(factor);
        let mut upstream = BufferSource::new(sine(9600, 440.0, 0.8), SAMPLE_RATE).looping(true);

        let mut out = vec![0.0; block];
        for _ in 0..20 {
            prop_assert_eq!(pitch.read(&mut upstream, &mut out), block);
            prop_assert!(out.iter().all(|y| y.is_finite() && y.abs() <= 1.0));
        }
    }

    #[test]
    fn setters_clamp_out_of_range_values(
        volume in -10.0f32..10.0,
        gain in -100.0f32..100.0,
        factor in -5.0f32..5.0,
    ) {
        let mut pipeline = SoundPipeline::new(
            source(white_noise(4800, 2), true),
            &PipelineConfig::default(),
        );
        let controls = pipeline.controls();
        controls.set_volume(volume);
        controls.set_band_gain(0, gain);
        controls.apply_effect(&EffectParameters::Pitch { factor });

        prop_assert!((0.0..=1.0).contains(&controls.volume()));
        let band = controls.band_gain(0).unwrap();
        prop_assert!((EQ_GAIN_MIN..=EQ_GAIN_MAX).contains(&band));

        let mut out = vec![0.0; 1024];
        prop_assert_eq!(pipeline.read(&mut out), 1024);
        prop_assert!(out.iter().all(|y| y.is_finite()));
    }
}
