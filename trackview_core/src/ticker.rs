//! Frame-driven elapsed-time source.
//!
//! The ticker knows nothing about playback. It turns a stream of frame
//! instants into millisecond deltas, and the caller decides what a delta
//! means.
//!
//! ```text
//!            start()                    on_frame(t0)             on_frame(t1)
//! Stopped ───────────► Scheduled{None} ─────────────► Scheduled{t0} ─────────► Scheduled{t1}
//!    ▲                       │      (baseline only)          │   (delta t1-t0)
//!    └───────── stop() ──────┴───────────────────────────────┘
//! ```

use std::ops::ControlFlow;
use std::time::Duration;
use trackview_env::FrameClock;

use crate::track::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TickerState {
    #[default]
    Stopped,
    Scheduled {
        /// Instant the last reported delta was measured up to
        baseline: Option<Duration>,
    },
}

/// Two-state frame ticker.
#[derive(Debug, Clone, Default)]
pub struct AnimationTicker {
    state: TickerState,
}

impl AnimationTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the ticker. No-op when already running.
    pub fn start(&mut self) {
        if self.state == TickerState::Stopped {
            self.state = TickerState::Scheduled { baseline: None };
        }
    }

    /// Disarms the ticker. No-op when already stopped.
    pub fn stop(&mut self) {
        self.state = TickerState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TickerState::Scheduled { .. })
    }

    /// Single re-arm step, called once per frame.
    ///
    /// Returns the whole milliseconds elapsed since the previous frame. The
    /// first frame after `start()` only records the baseline and returns
    /// `None`. Sub-millisecond remainders carry over to the next frame.
    pub fn on_frame(&mut self, now: Duration) -> Option<Millis> {
        match &mut self.state {
            TickerState::Stopped => None,
            TickerState::Scheduled { baseline } => match *baseline {
                None => {
                    *baseline = Some(now);
                    None
                }
                Some(previous) => {
                    let elapsed = now.saturating_sub(previous).as_millis();
                    let delta = Millis::try_from(elapsed).unwrap_or(Millis::MAX);
                    *baseline = Some(previous + Duration::from_millis(delta as u64));
                    Some(delta)
                }
            },
        }
    }

    /// Drives the ticker from a frame clock until stopped.
    ///
    /// Each frame is awaited only after the previous callback returned, so
    /// callbacks never overlap. Returning `ControlFlow::Break` stops the
    /// ticker.
    pub async fn run<C, F>(&mut self, clock: &C, mut on_delta: F)
    where
        C: FrameClock + ?Sized,
        F: FnMut(Millis) -> ControlFlow<()>,
    {
        self.start();
        while self.is_running() {
            clock.next_frame().await;
            if let Some(delta) = self.on_frame(clock.now()) {
                if on_delta(delta).is_break() {
                    self.stop();
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use trackview_env::FrameClock;

    /// Virtual clock that advances a fixed step per frame.
    pub struct StepClock {
        now: Mutex<Duration>,
        step: Duration,
    }

    impl StepClock {
        pub fn new(step: Duration) -> Self {
            Self {
                now: Mutex::new(Duration::ZERO),
                step,
            }
        }
    }

    #[async_trait]
    impl FrameClock for StepClock {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        async fn next_frame(&self) {
            *self.now.lock().unwrap() += self.step;
        }

        fn frame_interval(&self) -> Duration {
            self.step
        }
    }
}
