//! Virtual frame clock implementing FrameClock for deterministic testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackview_env::{FrameClock, FrameConfig};

/// Frame clock backed by virtual time.
///
/// Waiting for a frame advances the clock by one frame interval and returns
/// immediately, so a whole flight plays back in microseconds of wall time.
/// Clones share the same clock.
pub struct SimFrameClock {
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Virtual time added per frame
    interval: Duration,
}

impl SimFrameClock {
    /// Creates a clock at time zero.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            virtual_time_ns: Arc::new(Mutex::new(0)),
            interval: config.frame_interval(),
        }
    }

    /// Creates an Arc-wrapped clock for sharing.
    pub fn shared(config: FrameConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.lock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *self.lock() = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // A poisoned clock still holds a valid counter
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clone for SimFrameClock {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            interval: self.interval,
        }
    }
}

#[async_trait]
impl FrameClock for SimFrameClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn next_frame(&self) {
        self.advance_time(self.interval);
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}
