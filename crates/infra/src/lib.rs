//! Murmur infrastructure: real-time render plumbing
//!
//! Render threads pull each sound's pipeline ahead of time into a lock-free
//! block queue; the output callback only copies and sums ready blocks.

pub mod audio;
