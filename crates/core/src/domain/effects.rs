//! Effect selection: exactly one active transformer per sound

use crate::domain::dsp::{EchoLine, Effect, Flanger, PitchShifter, Reverb};
use crate::domain::source::SampleSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which effect a sound runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EffectType {
    None = 0,
    Reverb = 1,
    Pitch = 2,
    Echo = 3,
    Flanger = 4,
}

impl EffectType {
    pub const ALL: [EffectType; 5] = [
        EffectType::None,
        EffectType::Reverb,
        EffectType::Pitch,
        EffectType::Echo,
        EffectType::Flanger,
    ];

    /// Decode a stored discriminant; unknown values fall back to `None`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EffectType::Reverb,
            2 => EffectType::Pitch,
            3 => EffectType::Echo,
            4 => EffectType::Flanger,
            _ => EffectType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::None => "none",
            EffectType::Reverb => "reverb",
            EffectType::Pitch => "pitch",
            EffectType::Echo => "echo",
            EffectType::Flanger => "flanger",
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown effect '{s}'"))
    }
}

/// Tagged parameter set, one variant per effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectParameters {
    #[default]
    None,
    Reverb {
        mix: f32,
        time: f32,
        width: f32,
        #[serde(default)]
        freeze: bool,
    },
    Pitch {
        factor: f32,
    },
    Echo {
        delay_ms: f32,
        mix: f32,
        feedback: f32,
    },
    Flanger {
        rate: f32,
        depth: f32,
        feedback: f32,
        mix: f32,
    },
}

impl EffectParameters {
    /// Defaults for `kind`
    pub fn default_for(kind: EffectType) -> Self {
        match kind {
            EffectType::None => EffectParameters::None,
            EffectType::Reverb => EffectParameters::Reverb {
                mix: Reverb::DEFAULT_MIX,
                time: Reverb::DEFAULT_TIME,
                width: Reverb::DEFAULT_WIDTH,
                freeze: false,
            },
            EffectType::Pitch => EffectParameters::Pitch {
                factor: PitchShifter::DEFAULT_FACTOR,
            },
            EffectType::Echo => EffectParameters::Echo {
                delay_ms: EchoLine::DEFAULT_DELAY_MS,
                mix: EchoLine::DEFAULT_MIX,
                feedback: EchoLine::DEFAULT_FEEDBACK,
            },
            EffectType::Flanger => EffectParameters::Flanger {
                rate: Flanger::DEFAULT_RATE,
                depth: Flanger::DEFAULT_DEPTH,
                feedback: Flanger::DEFAULT_FEEDBACK,
                mix: Flanger::DEFAULT_MIX,
            },
        }
    }

    pub fn kind(&self) -> EffectType {
        match self {
            EffectParameters::None => EffectType::None,
            EffectParameters::Reverb { .. } => EffectType::Reverb,
            EffectParameters::Pitch { .. } => EffectType::Pitch,
            EffectParameters::Echo { .. } => EffectType::Echo,
            EffectParameters::Flanger { .. } => EffectType::Flanger,
        }
    }
}

/// The one live transformer
enum EffectSlot {
    None,
    Reverb(Box<Reverb>),
    Pitch(PitchShifter),
    Echo(EchoLine),
    Flanger(Flanger),
}

impl EffectSlot {
    fn build(kind: EffectType, sample_rate: u32) -> Self {
        match kind {
            EffectType::None => EffectSlot::None,
            EffectType::Reverb => EffectSlot::Reverb(Box::new(Reverb::new(sample_rate))),
            EffectType::Pitch => EffectSlot::Pitch(PitchShifter::new()),
            EffectType::Echo => EffectSlot::Echo(EchoLine::new(sample_rate)),
            EffectType::Flanger => EffectSlot::Flanger(Flanger::new(sample_rate)),
        }
    }

    fn kind(&self) -> EffectType {
        match self {
            EffectSlot::None => EffectType::None,
            EffectSlot::Reverb(_) => EffectType::Reverb,
            EffectSlot::Pitch(_) => EffectType::Pitch,
            EffectSlot::Echo(_) => EffectType::Echo,
            EffectSlot::Flanger(_) => EffectType::Flanger,
        }
    }

    fn clear(&mut self) {
        match self {
            EffectSlot::None => {}
            EffectSlot::Reverb(reverb) => reverb.clear(),
            EffectSlot::Pitch(pitch) => pitch.clear(),
            EffectSlot::Echo(echo) => echo.clear(),
            EffectSlot::Flanger(flanger) => flanger.clear(),
        }
    }

    fn apply(&mut self, params: &EffectParameters) {
        match (self, *params) {
            (
                EffectSlot::Reverb(reverb),
                EffectParameters::Reverb {
                    mix,
                    time,
                    width,
                    freeze,
                },
            ) => {
                reverb.set_mix(mix);
                reverb.set_time(time);
                reverb.set_width(width);
                reverb.set_freeze(freeze);
            }
            (EffectSlot::Pitch(pitch), EffectParameters::Pitch { factor }) => {
                pitch.set_factor(factor);
            }
            (
                EffectSlot::Echo(echo),
                EffectParameters::Echo {
                    delay_ms,
                    mix,
                    feedback,
                },
            ) => {
                echo.set_delay_ms(delay_ms);
                echo.set_mix(mix);
                echo.set_feedback(feedback);
            }
            (
                EffectSlot::Flanger(flanger),
                EffectParameters::Flanger {
                    rate,
                    depth,
                    feedback,
                    mix,
                },
            ) => {
                flanger.set_rate(rate);
                flanger.set_depth(depth);
                flanger.set_feedback(feedback);
                flanger.set_mix(mix);
            }
            _ => {}
        }
    }
}

/// Routes a sound's stream through its active effect
///
/// Switching to another effect clears the outgoing transformer and builds the
/// incoming one, so a reverb tail never leaks into an echo.
pub struct EffectsManager {
    sample_rate: u32,
    slot: EffectSlot,
}

impl EffectsManager {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            slot: EffectSlot::None,
        }
    }

    pub fn active(&self) -> EffectType {
        self.slot.kind()
    }

    /// Make `params.kind()` the active effect and apply its parameters
    ///
    /// A kind change builds the new effect in place, so its buffers are
    /// allocated on the calling thread (up to 2 s of samples for the echo).
    /// Parameter updates never allocate.
    pub fn configure(&mut self, params: &EffectParameters) {
        let kind = params.kind();
        if kind != self.slot.kind() {
            debug!(from = %self.slot.kind(), to = %kind, "Switching effect");
            self.slot.clear();
            self.slot = EffectSlot::build(kind, self.sample_rate);
        }
        self.slot.apply(params);
    }

    /// Pull one block from `upstream` through the active effect
    pub fn read(&mut self, upstream: &mut dyn SampleSource, out: &mut [f32]) -> usize {
        match &mut self.slot {
            EffectSlot::Pitch(pitch) => pitch.read(upstream, out),
            slot => {
                let produced = upstream.read(out);
                let block = &mut out[..produced];
                match slot {
                    EffectSlot::Reverb(reverb) => reverb.process(block),
                    EffectSlot::Echo(echo) => echo.process(block),
                    EffectSlot::Flanger(flanger) => flanger.process(block),
                    EffectSlot::None | EffectSlot::Pitch(_) => {}
                }
                produced
            }
        }
    }

    /// Drop the active effect's tail, keeping its parameters
    pub fn clear(&mut self) {
        self.slot.clear();
    }
}

impl fmt::Debug for EffectsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectsManager")
            .field("sample_rate", &self.sample_rate)
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_signals::{sine, SAMPLE_RATE};
    use crate::domain::source::BufferSource;

    fn silence(samples: usize) -> BufferSource {
        BufferSource::new(vec![0.0; samples], SAMPLE_RATE)
    }

    #[test]
    fn test_effect_type_parsing() {
        assert_eq!("Reverb".parse::<EffectType>(), Ok(EffectType::Reverb));
        assert_eq!("flanger".parse::<EffectType>(), Ok(EffectType::Flanger));
        assert!("chorus".parse::<EffectType>().is_err());
        assert_eq!(EffectType::Echo.to_string(), "echo");

        for kind in EffectType::ALL {
            assert_eq!(EffectType::from_u8(kind as u8), kind);
            assert_eq!(EffectParameters::default_for(kind).kind(), kind);
        }
        assert_eq!(EffectType::from_u8(200), EffectType::None);
    }

    #[test]
    fn test_parameters_serde_tagged() {
        let params = EffectParameters::Echo {
            delay_ms: 250.0,
            mix: 0.5,
            feedback: 0.3,
        };
        let json = serde_json::to_string(&params).expect("serialize");
        assert!(json.contains("\"type\":\"echo\""));

        let toml_src = "type = \"reverb\"\nmix = 0.4\ntime = 3.0\nwidth = 1.0\n";
        let parsed: EffectParameters = toml::from_str(toml_src).expect("parse");
        assert_eq!(
            parsed,
            EffectParameters::Reverb {
                mix: 0.4,
                time: 3.0,
                width: 1.0,
                freeze: false
            }
        );
    }

    #[test]
    fn test_none_passes_through() {
        let mut manager = EffectsManager::new(SAMPLE_RATE);
        let input = sine(512, 440.0, 0.5);
        let mut source = BufferSource::new(input.clone(), SAMPLE_RATE);

        let mut out = vec![0.0; 512];
        assert_eq!(manager.read(&mut source, &mut out), 512);
        assert_eq!(out, input);
    }

    #[test]
    fn test_configure_switches_and_applies() {
        let mut manager = EffectsManager::new(SAMPLE_RATE);
        manager.configure(&EffectParameters::default_for(EffectType::Flanger));
        assert_eq!(manager.active(), EffectType::Flanger);

        manager.configure(&EffectParameters::Pitch { factor: 2.0 });
        assert_eq!(manager.active(), EffectType::Pitch);

        manager.configure(&EffectParameters::None);
        assert_eq!(manager.active(), EffectType::None);
    }

    #[test]
    fn test_echo_after_reverb_has_no_tail() {
        let mut manager = EffectsManager::new(SAMPLE_RATE);
        manager.configure(&EffectParameters::Reverb {
            mix: 1.0,
            time: 8.0,
            width: 1.0,
            freeze: false,
        });

        let mut loud = BufferSource::new(sine(SAMPLE_RATE as usize, 300.0, 0.9), SAMPLE_RATE);
        let mut out = vec![0.0; 1024];
        for _ in 0..20 {
            manager.read(&mut loud, &mut out);
        }
        let mut quiet = silence(1024);
        manager.read(&mut quiet, &mut out);
        assert!(out.iter().any(|y| y.abs() > 1e-4), "reverb should ring");

        manager.configure(&EffectParameters::Echo {
            delay_ms: 100.0,
            mix: 1.0,
            feedback: 0.5,
        });
        let mut quiet = silence(1024);
        assert_eq!(manager.read(&mut quiet, &mut out), 1024);
        assert!(out.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_clear_drops_echo_tail() {
        let mut manager = EffectsManager::new(SAMPLE_RATE);
        manager.configure(&EffectParameters::Echo {
            delay_ms: 10.0,
            mix: 1.0,
            feedback: 0.8,
        });

        let mut loud = BufferSource::new(vec![0.5; 512], SAMPLE_RATE);
        let mut out = vec![0.0; 512];
        manager.read(&mut loud, &mut out);

        manager.clear();
        let mut quiet = silence(512);
        manager.read(&mut quiet, &mut out);
        assert!(out.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_short_upstream_only_processes_produced() {
        let mut manager = EffectsManager::new(SAMPLE_RATE);
        manager.configure(&EffectParameters::default_for(EffectType::Echo));

        let mut source = BufferSource::new(vec![0.2; 100], SAMPLE_RATE);
        let mut out = vec![7.0; 256];
        assert_eq!(manager.read(&mut source, &mut out), 100);
        assert!(out[100..].iter().all(|&y| y == 7.0));
    }
}
