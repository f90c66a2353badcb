//! Murmur core: the streaming effects pipeline behind the ambient mixer
//!
//! Everything that touches samples lives under [`domain`]. The crate has no
//! audio-device dependencies; a render callback simply pulls blocks from a
//! [`domain::SoundPipeline`] (or a whole [`domain::SoundMixer`]).

pub mod domain;
