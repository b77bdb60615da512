//! TrackView Core - Synchronized Multi-Track Flight Playback
//!
//! Plays recorded flights back on a map in shared time:
//! 1. **Time**: a playback state machine that clamps, loops and
//!    re-synchronizes independent recordings onto one timeline
//! 2. **Geometry**: per-track renderers that reveal engine-state segments
//!    incrementally as the clock ticks
//! 3. **Camera**: a viewport controller that fits, zooms and follows the
//!    active track with a padded dead zone

pub mod bounds;
pub mod color;
pub mod headless;
pub mod playback;
pub mod session;
pub mod surface;
pub mod sync;
pub mod task_renderer;
pub mod ticker;
pub mod track;
pub mod track_renderer;
pub mod viewport;

// Re-export key types for convenience
pub use bounds::ViewportBounds;
pub use color::{Color, ColorAllocator, DEFAULT_PALETTE};
pub use headless::{HeadlessSurface, SurfaceCall};
pub use playback::{
    AdvanceOutcome, Changes, PlaybackAction, PlaybackConfig, PlaybackSnapshot, PlaybackState,
    TimeController,
};
pub use session::{PlaybackSession, SessionConfig, SessionError};
pub use surface::{Camera, EdgePadding, MapSurface, Primitive, PrimitiveId, Primitives};
pub use sync::{StandardSynchronizer, SynchronizationMethod, Synchronizer};
pub use task_renderer::TaskRenderer;
pub use ticker::AnimationTicker;
pub use track::{
    Millis, Sample, Task, Timestamp, Track, TrackError, TrackGroup, TrackId, TrackPosition,
    Turnpoint, ZoneShape,
};
pub use track_renderer::{build_segments, RenderOptions, Segment, TrackRenderer};
pub use viewport::{ViewportConfig, ViewportController, ViewportError};
