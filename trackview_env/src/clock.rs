//! Frame clock trait for TrackView animation loops.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The central interface for animation timing.
///
/// Abstracts the display's frame cadence so the playback engine runs the
/// same way against a real clock (tokio) and a virtual one (simulation).
///
/// # Contract
///
/// - `now()` is monotonic for the lifetime of the clock.
/// - `next_frame()` resolves once per frame. Callers never poll it
///   concurrently, so a frame is only requested after the previous frame's
///   work has finished.
#[async_trait]
pub trait FrameClock: Send + Sync + 'static {
    /// Returns the monotonic time since clock creation.
    fn now(&self) -> Duration;

    /// Suspends until the next frame is due.
    ///
    /// In production: sleeps for the frame interval.
    /// In simulation: advances the virtual clock by one frame interval.
    async fn next_frame(&self);

    /// Returns the nominal interval between frames.
    fn frame_interval(&self) -> Duration;
}

/// Frame cadence configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Target frames per second (default: 60)
    pub frames_per_second: u32,
}

impl FrameConfig {
    /// Returns the frame interval for the configured rate.
    ///
    /// A rate of zero is treated as one frame per second.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frames_per_second.max(1) as f64)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 60,
        }
    }
}
