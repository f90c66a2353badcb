//! Threaded rendering between sound pipelines and an output callback
//!
//! - [`block_queue`]: fixed-size block recycling between one producer and one consumer
//! - [`render`]: one thread per sound filling its queue
//! - [`engine`]: registry of render threads mixed by [`AudioEngine::mix_into`]

pub mod block_queue;
pub mod engine;
pub mod render;

pub use block_queue::{BlockQueue, BlockReader};
pub use engine::AudioEngine;
pub use render::RenderThread;
