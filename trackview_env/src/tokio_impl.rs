//! Production implementation of FrameClock using Tokio.

use crate::{FrameClock, FrameConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Production frame clock backed by `tokio::time`.
///
/// Time comes from Tokio's monotonic clock, so it also follows a paused
/// runtime clock in tests.
pub struct TokioFrameClock {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Interval slept between frames
    interval: Duration,
}

impl TokioFrameClock {
    /// Creates a new clock running at the given frame configuration.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            start: Instant::now(),
            interval: config.frame_interval(),
        }
    }

    /// Creates an Arc-wrapped clock for sharing across tasks.
    pub fn shared(config: FrameConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }
}

impl Default for TokioFrameClock {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

#[async_trait]
impl FrameClock for TokioFrameClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn next_frame(&self) {
        tokio::time::sleep(self.interval).await;
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}
