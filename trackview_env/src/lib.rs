//! TrackView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" time source that drives playback
//! animation. The playback engine never reads a wall clock or sleeps on its
//! own; it asks a [`FrameClock`] for the current time and waits for the next
//! frame through it.
//!
//! # Implementations
//!
//! - **Production**: [`TokioFrameClock`] - `tokio::time` sleeps at the
//!   configured frame rate
//! - **Simulation**: `SimFrameClock` in `trackview_sim` - a virtual clock that
//!   advances one frame interval per wait
//!
//! # Example
//!
//! ```ignore
//! use trackview_env::{FrameClock, TokioFrameClock};
//!
//! async fn animate<C: FrameClock>(clock: &C) {
//!     let mut last = clock.now();
//!     loop {
//!         clock.next_frame().await;
//!         let now = clock.now();
//!         render(now - last);
//!         last = now;
//!     }
//! }
//! ```

mod clock;
mod tokio_impl;

pub use clock::{FrameClock, FrameConfig};
pub use tokio_impl::TokioFrameClock;
