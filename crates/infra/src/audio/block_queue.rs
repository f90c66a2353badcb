//! Lock-free block queue for real-time rendering
//!
//! A render thread and the output callback exchange fixed-size blocks through
//! two bounded crossbeam queues: `free` holds empty blocks, `ready` holds
//! rendered ones. Blocks are allocated once up front and recycled forever.
//!
//! Performance characteristics:
//! - Lock-free on both sides
//! - No allocations after construction
//! - Underruns are counted, never waited on

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bounded exchange of rendered blocks between one producer and one consumer
pub struct BlockQueue {
    ready: ArrayQueue<Box<[f32]>>,
    free: ArrayQueue<Box<[f32]>>,
    block_size: usize,

    /// Callbacks that found no ready block (cache-padded, written by the consumer)
    underruns: CachePadded<AtomicU64>,
}

impl BlockQueue {
    /// Create a queue holding `depth` blocks of `block_size` samples
    ///
    /// Both values are raised to at least 1.
    pub fn new(depth: usize, block_size: usize) -> Self {
        let depth = depth.max(1);
        let block_size = block_size.max(1);
        let free = ArrayQueue::new(depth);
        for _ in 0..depth {
            // Capacity equals depth, so every push fits
            let _ = free.push(vec![0.0; block_size].into_boxed_slice());
        }

        Self {
            ready: ArrayQueue::new(depth),
            free,
            block_size,
            underruns: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn depth(&self) -> usize {
        self.ready.capacity()
    }

    /// Take an empty block to render into (producer)
    ///
    /// `None` means every block is waiting to be played.
    pub fn acquire(&self) -> Option<Box<[f32]>> {
        self.free.pop()
    }

    /// Hand a rendered block to the consumer (producer)
    pub fn publish(&self, block: Box<[f32]>) {
        if let Err(block) = self.ready.push(block) {
            self.recycle(block);
        }
    }

    /// Take the oldest rendered block (consumer)
    pub fn take(&self) -> Option<Box<[f32]>> {
        let block = self.ready.pop();
        if block.is_none() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        block
    }

    /// Return a played block to the free list (consumer)
    pub fn recycle(&self, block: Box<[f32]>) {
        let _ = self.free.push(block);
    }

    /// Rendered blocks waiting to be played
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// True when the producer has nothing left to render into
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BlockQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockQueue")
            .field("block_size", &self.block_size)
            .field("ready", &self.ready.len())
            .field("free", &self.free.len())
            .field("underruns", &self.underruns())
            .finish()
    }
}

/// Consumer-side cursor that reads a block queue at any callback size
///
/// Keeps the block it is partway through, so callback sizes need not match
/// the render block size.
pub struct BlockReader {
    queue: Arc<BlockQueue>,
    current: Option<Box<[f32]>>,
    offset: usize,
}

impl BlockReader {
    pub fn new(queue: Arc<BlockQueue>) -> Self {
        Self {
            queue,
            current: None,
            offset: 0,
        }
    }

    pub fn queue(&self) -> &Arc<BlockQueue> {
        &self.queue
    }

    /// Copy up to `out.len()` rendered samples into `out`
    ///
    /// Returns how many were copied; the rest of `out` is left untouched.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        while written < out.len() {
            let block = match self.current.take() {
                Some(block) => block,
                None => match self.queue.take() {
                    Some(block) => {
                        self.offset = 0;
                        block
                    }
                    None => break,
                },
            };

            let chunk = (out.len() - written).min(block.len() - self.offset);
            out[written..written + chunk]
                .copy_from_slice(&block[self.offset..self.offset + chunk]);
            written += chunk;
            self.offset += chunk;

            if self.offset < block.len() {
                self.current = Some(block);
            } else {
                self.queue.recycle(block);
            }
        }
        written
    }
}

impl Drop for BlockReader {
    fn drop(&mut self) {
        if let Some(block) = self.current.take() {
            self.queue.recycle(block);
        }
    }
}
