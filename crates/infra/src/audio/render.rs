//! Per-sound render thread
//!
//! Pulls blocks from a [`SoundPipeline`] into a [`BlockQueue`] until stopped.
//! When the queue is full the thread parks for a fraction of a block period.

use super::BlockQueue;
use murmur_core::domain::audio::{AudioError, Result};
use murmur_core::domain::{SampleSource, SoundPipeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RenderThread {
    label: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Start rendering `pipeline` into `queue` on a named thread
    pub fn spawn(
        label: impl Into<String>,
        pipeline: SoundPipeline,
        queue: Arc<BlockQueue>,
    ) -> Result<Self> {
        let label = label.into();
        let running = Arc::new(AtomicBool::new(true));
        let idle = idle_period(queue.block_size(), pipeline.sample_rate());

        let handle = thread::Builder::new()
            .name(format!("murmur-render-{label}"))
            .spawn({
                let running = Arc::clone(&running);
                let label = label.clone();
                move || render_loop(&label, pipeline, &queue, &running, idle)
            })
            .map_err(|e| AudioError::StreamError(format!("render thread for {label}: {e}")))?;

        info!(sound = %label, "Render thread started");
        Ok(Self {
            label,
            running,
            handle: Some(handle),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!(sound = %self.label, "Render thread panicked");
            } else {
                info!(sound = %self.label, "Render thread stopped");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("label", &self.label)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Half a block period, at least one millisecond
fn idle_period(block_size: usize, sample_rate: u32) -> Duration {
    let block_secs = block_size as f64 / sample_rate.max(1) as f64;
    Duration::from_secs_f64(block_secs / 2.0).max(Duration::from_millis(1))
}

fn render_loop(
    label: &str,
    mut pipeline: SoundPipeline,
    queue: &BlockQueue,
    running: &AtomicBool,
    idle: Duration,
) {
    let mut exhausted = false;
    while running.load(Ordering::Acquire) {
        let Some(mut block) = queue.acquire() else {
            thread::park_timeout(idle);
            continue;
        };

        let produced = pipeline.read(&mut block);
        block[produced..].fill(0.0);
        if produced == 0 && !exhausted {
            debug!(sound = label, "Pipeline produced nothing, rendering silence");
        }
        exhausted = produced == 0;

        queue.publish(block);
    }
}
