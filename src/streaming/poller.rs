//! Segment discovery by polling the engine output directory
//!
//! The engine writes `0.<ext>`, `1.<ext>`, ... incrementally and announces
//! nothing. Segment `n` is only read once `n + 1` exists, so a file still being
//! written is never delivered. After the run, [`SegmentPoller::drain`] delivers
//! the remaining segments, including the last one.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::VirtualFs;
use crate::error::ClipperResult;
use crate::streaming::channel::JobChannel;

/// Default discovery interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct SegmentPoller {
    next_index: u64,
    extension: String,
    ticker: Interval,
}

impl SegmentPoller {
    pub fn new(extension: impl Into<String>, interval: Duration) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            next_index: 0,
            extension: extension.into(),
            ticker,
        }
    }

    pub fn segment_name(&self, index: u64) -> String {
        format!("{index}.{}", self.extension)
    }

    /// Index of the next segment to deliver
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Wait for the next poll
    pub async fn tick(&mut self) -> Instant {
        self.ticker.tick().await
    }

    /// Deliver every segment whose successor already exists
    pub async fn poll(&mut self, fs: &VirtualFs, channel: &JobChannel) -> ClipperResult<usize> {
        let mut delivered = 0;
        while fs.output_exists(&self.segment_name(self.next_index + 1)).await {
            self.deliver(fs, channel).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Like [`poll`](Self::poll), but failures are logged and retried next tick
    pub async fn poll_quietly(&mut self, fs: &VirtualFs, channel: &JobChannel) -> usize {
        match self.poll(fs, channel).await {
            Ok(delivered) => delivered,
            Err(err) => {
                warn!(error = %err, index = self.next_index, "Segment poll failed");
                0
            }
        }
    }

    /// Deliver all remaining segments; only valid once the engine has finished
    pub async fn drain(&mut self, fs: &VirtualFs, channel: &JobChannel) -> ClipperResult<usize> {
        let mut delivered = self.poll(fs, channel).await?;
        while fs.output_exists(&self.segment_name(self.next_index)).await {
            self.deliver(fs, channel).await?;
            delivered += 1;
        }
        debug!(delivered, total = self.next_index, "Drained remaining segments");
        Ok(delivered)
    }

    async fn deliver(&mut self, fs: &VirtualFs, channel: &JobChannel) -> ClipperResult<()> {
        let index = self.next_index;
        let payload = fs.read_output(&self.segment_name(index)).await?;
        debug!(index, bytes = payload.len(), "Segment finalized");
        channel.segment(index, payload);
        self.next_index += 1;
        Ok(())
    }
}
