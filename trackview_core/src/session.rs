//! Playback session - wires time, viewport, colors and the ticker together.
//!
//! This is the surface a host UI talks to: it loads groups, dispatches
//! actions, drives frames and exposes the snapshot subscription. Every
//! state change reported by the [`TimeController`] is pushed into the
//! [`ViewportController`] before the call returns.

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use trackview_env::{FrameClock, FrameConfig};

use crate::color::{Color, ColorAllocator};
use crate::playback::{Changes, PlaybackAction, PlaybackConfig, PlaybackSnapshot, PlaybackState, TimeController};
use crate::surface::MapSurface;
use crate::ticker::AnimationTicker;
use crate::track::{Task, TrackGroup, TrackId};
use crate::viewport::{ViewportConfig, ViewportController, ViewportError};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Everything a session needs, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub playback: PlaybackConfig,
    pub viewport: ViewportConfig,
    pub frame: FrameConfig,
    /// Track colors in assignment order (default: empty = built-in palette)
    pub palette: Vec<Color>,
}

impl SessionConfig {
    /// Parses a config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Viewport error: {0}")]
    Viewport(#[from] ViewportError),

    #[error("Invalid session config: {0}")]
    Config(#[from] serde_json::Error),
}

// ============================================================================
// SESSION
// ============================================================================

/// One host-facing playback session over a map surface.
#[derive(Debug)]
pub struct PlaybackSession<S: MapSurface> {
    config: SessionConfig,
    time: TimeController,
    viewport: ViewportController<S>,
    ticker: AnimationTicker,
}

impl<S: MapSurface> PlaybackSession<S> {
    pub fn new(surface: S, config: SessionConfig) -> Self {
        Self::with_controllers(
            TimeController::new(config.playback.clone()),
            ViewportController::with_surface(surface, config.viewport.clone()),
            config,
        )
    }

    /// Builds a session from preconfigured controllers, e.g. a time
    /// controller with a custom synchronizer or a pending viewport.
    pub fn with_controllers(
        time: TimeController,
        viewport: ViewportController<S>,
        config: SessionConfig,
    ) -> Self {
        Self {
            config,
            time,
            viewport,
            ticker: AnimationTicker::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn time_controller(&self) -> &TimeController {
        &self.time
    }

    pub fn viewport(&self) -> &ViewportController<S> {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController<S> {
        &mut self.viewport
    }

    pub fn state(&self) -> &PlaybackState {
        self.time.state()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.time.snapshot()
    }

    pub fn group(&self) -> Option<&TrackGroup> {
        self.time.group()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_running()
    }

    /// Snapshot stream: `{active_timestamp, is_playing, followed_track}`.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.time.subscribe()
    }

    /// Replaces whatever is loaded with `group`.
    ///
    /// Tracks are colored in load order from a fresh allocator, so the same
    /// group always gets the same colors. The camera is fitted to the group.
    pub fn load(&mut self, group: TrackGroup) -> Result<(), SessionError> {
        if !self.viewport.is_ready() && !self.viewport.is_destroyed() {
            return Err(ViewportError::UninitializedSurface.into());
        }

        self.ticker.stop();
        self.clear_renderers()?;

        let mut colors = ColorAllocator::new(self.config.palette.clone());
        let group = group.map_tracks(|track| track.clone().with_color(colors.next_color()));

        let changes = self.time.load(group);
        self.apply(changes)?;
        self.viewport.zoom_to_fit()?;
        Ok(())
    }

    /// Tears down every renderer and returns to the unloaded state.
    pub fn unload(&mut self) -> Result<(), SessionError> {
        self.ticker.stop();
        self.time.unload();
        self.clear_renderers()
    }

    /// Applies an action and brings the viewport up to date.
    pub fn dispatch(&mut self, action: PlaybackAction) -> Result<Changes, SessionError> {
        let changes = self.time.dispatch(action);
        self.apply(changes)?;
        Ok(changes)
    }

    /// One animation frame at clock time `now`.
    ///
    /// Returns `Break` once the ticker has stopped (paused or reached the
    /// end).
    pub fn on_frame(&mut self, now: Duration) -> Result<ControlFlow<()>, SessionError> {
        if let Some(delta) = self.ticker.on_frame(now) {
            self.dispatch(PlaybackAction::Advance(delta))?;
        }
        Ok(if self.ticker.is_running() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        })
    }

    /// Drives frames from `clock` until playback stops.
    ///
    /// Runs on the caller's task; frames never overlap.
    pub async fn run<C>(&mut self, clock: &C) -> Result<(), SessionError>
    where
        C: FrameClock + ?Sized,
    {
        while self.ticker.is_running() {
            clock.next_frame().await;
            if self.on_frame(clock.now())?.is_break() {
                break;
            }
        }
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<(), SessionError> {
        Ok(self.viewport.zoom_in()?)
    }

    pub fn zoom_out(&mut self) -> Result<(), SessionError> {
        Ok(self.viewport.zoom_out()?)
    }

    pub fn zoom_to_fit(&mut self) -> Result<(), SessionError> {
        Ok(self.viewport.zoom_to_fit()?)
    }

    pub fn set_follow_active(&mut self, follow: bool) {
        self.config.viewport.follow_active = follow;
        self.viewport.set_follow_active(follow);
    }

    /// Stops the ticker and disposes the viewport, returning the surface.
    pub fn destroy(&mut self) -> Option<S> {
        self.ticker.stop();
        self.viewport.destroy()
    }

    fn clear_renderers(&mut self) -> Result<(), SessionError> {
        for id in self.viewport.track_ids() {
            self.viewport.remove_track(id)?;
        }
        self.viewport.set_task(None)?;
        Ok(())
    }

    fn followed_task(&self) -> Option<Arc<Task>> {
        let id = self.time.state().followed_track?;
        self.time.group()?.get(id)?.task().cloned()
    }

    fn apply(&mut self, changes: Changes) -> Result<(), SessionError> {
        if changes.is_empty() {
            return Ok(());
        }

        if changes.group {
            self.rebuild_renderers()?;
        } else {
            if changes.followed {
                if let Some(id) = self.time.state().followed_track {
                    self.viewport.set_active_track(id)?;
                }
                let task = self.followed_task();
                self.viewport.set_task(task)?;
            }
            if changes.render_mode {
                self.viewport
                    .set_render_full_track(self.time.state().render_full_track)?;
            }
            if changes.time {
                if let Some(ts) = self.time.state().active_timestamp {
                    self.viewport.set_time(ts)?;
                }
            }
        }

        if changes.playing {
            if self.time.state().is_playing {
                self.ticker.start();
            } else {
                self.ticker.stop();
            }
        }
        if changes.ended {
            info!("Playback finished");
        }
        Ok(())
    }

    /// Replaces every renderer with ones built from the current group.
    fn rebuild_renderers(&mut self) -> Result<(), SessionError> {
        self.clear_renderers()?;
        let Some(group) = self.time.group() else {
            return Ok(());
        };

        let state = self.time.state();
        self.viewport.set_render_full_track(state.render_full_track)?;
        for track in group.tracks() {
            self.viewport.add_track(track.clone())?;
        }
        let followed: Option<TrackId> = state.followed_track;
        if let Some(id) = followed {
            self.viewport.set_active_track(id)?;
        }
        let task = self.followed_task();
        self.viewport.set_task(task)?;
        if let Some(ts) = self.time.state().active_timestamp {
            self.viewport.set_time(ts)?;
        }

        debug!(tracks = self.viewport.len(), "Renderers rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DEFAULT_PALETTE;
    use crate::headless::{HeadlessSurface, SurfaceCall};
    use crate::sync::SynchronizationMethod;
    use crate::ticker::test_clock::StepClock;
    use crate::track::fixtures::*;
    use crate::track::{Timestamp, Turnpoint, ZoneShape};
    use geo::coord;

    fn session() -> PlaybackSession<HeadlessSurface> {
        let surface = HeadlessSurface::new(800.0, 600.0).with_camera(coord! { x: 0.0, y: 0.0 }, 3.0);
        PlaybackSession::new(surface, SessionConfig::default())
    }

    fn pair() -> TrackGroup {
        let start = Timestamp(TEN_AM);
        let a = straight_track(1, start, 31, minutes(1));
        let b = straight_track(2, start + minutes(5), 36, minutes(1));
        TrackGroup::new(vec![a, b]).unwrap()
    }

    #[test]
    fn test_load_colors_renders_and_fits() {
        let mut session = session();
        session.load(pair()).unwrap();

        let viewport = session.viewport();
        assert_eq!(viewport.len(), 2);
        let ids = viewport.track_ids();
        assert_eq!(viewport.renderer(ids[0]).unwrap().color(), DEFAULT_PALETTE[0]);
        assert_eq!(viewport.renderer(ids[1]).unwrap().color(), DEFAULT_PALETTE[1]);
        assert_eq!(viewport.active_track(), Some(TrackId::from_seed(1)));

        let surface = viewport.surface().unwrap();
        assert!(matches!(
            surface.calls().last(),
            Some(SurfaceCall::FlyToBounds { .. })
        ));
    }

    #[test]
    fn test_reload_gets_same_colors_and_no_leftovers() {
        let mut session = session();
        session.load(pair()).unwrap();
        let count = session.viewport().surface().unwrap().primitive_count();

        session.load(pair()).unwrap();
        let viewport = session.viewport();
        assert_eq!(viewport.surface().unwrap().primitive_count(), count);
        let first = viewport.track_ids()[0];
        assert_eq!(viewport.renderer(first).unwrap().color(), DEFAULT_PALETTE[0]);
    }

    #[test]
    fn test_load_requires_surface() {
        let config = SessionConfig::default();
        let mut session: PlaybackSession<HeadlessSurface> = PlaybackSession::with_controllers(
            TimeController::new(config.playback.clone()),
            ViewportController::new(config.viewport.clone()),
            config,
        );
        assert!(matches!(
            session.load(pair()),
            Err(SessionError::Viewport(ViewportError::UninitializedSurface))
        ));
        assert!(session.group().is_none());
    }

    #[test]
    fn test_frames_advance_until_end() {
        let mut session = session();
        let track = straight_track(1, Timestamp(0), 11, 1000);
        session.load(TrackGroup::new(vec![track]).unwrap()).unwrap();
        session.dispatch(PlaybackAction::TogglePlay).unwrap();
        assert!(session.is_ticking());

        // Baseline frame
        assert_eq!(session.on_frame(Duration::ZERO).unwrap(), ControlFlow::Continue(()));
        assert_eq!(
            session.on_frame(Duration::from_millis(4_000)).unwrap(),
            ControlFlow::Continue(())
        );
        assert_eq!(session.state().active_timestamp, Some(Timestamp(4_000)));

        assert_eq!(
            session.on_frame(Duration::from_millis(20_000)).unwrap(),
            ControlFlow::Break(())
        );
        assert_eq!(session.state().active_timestamp, Some(Timestamp(10_000)));
        assert!(!session.state().is_playing);
        assert!(!session.is_ticking());
    }

    #[tokio::test]
    async fn test_run_plays_to_the_end() {
        let mut session = session();
        let track = straight_track(1, Timestamp(0), 11, 1000);
        session.load(TrackGroup::new(vec![track.clone()]).unwrap()).unwrap();
        session.dispatch(PlaybackAction::TogglePlay).unwrap();

        let clock = StepClock::new(Duration::from_millis(100));
        session.run(&clock).await.unwrap();

        assert_eq!(session.state().active_timestamp, Some(track.stop()));
        assert!(!session.state().is_playing);

        let renderer = session.viewport().renderer(track.id()).unwrap();
        assert_eq!(renderer.visible_path().len(), track.len());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_paused() {
        let mut session = session();
        session.load(pair()).unwrap();
        let clock = StepClock::new(Duration::from_millis(16));

        session.run(&clock).await.unwrap();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_sync_switch_rebuilds_and_keeps_followed() {
        let mut session = session();
        session.load(pair()).unwrap();
        let b = TrackId::from_seed(2);
        session.dispatch(PlaybackAction::SetActiveTrack(b)).unwrap();

        let changes = session
            .dispatch(PlaybackAction::SetSynchronizationMethod(
                SynchronizationMethod::RecordingStart,
            ))
            .unwrap();

        assert!(changes.group);
        let viewport = session.viewport();
        assert_eq!(viewport.active_track(), Some(b));
        let a = viewport.renderer(TrackId::from_seed(1)).unwrap();
        assert_eq!(a.track().offset(), minutes(5));
        assert_eq!(session.snapshot().followed_track, Some(b));
    }

    #[test]
    fn test_followed_track_brings_its_task() {
        let task = Arc::new(Task::new(vec![
            Turnpoint::new("A", 46.0, 7.0, ZoneShape::Cylinder { radius_m: 400.0 }),
            Turnpoint::new("B", 46.0, 7.05, ZoneShape::Line { length_m: 1000.0 }),
        ]));
        let start = Timestamp(TEN_AM);
        let a = straight_track(1, start, 10, 1000);
        let b = straight_track(2, start, 10, 1000).with_task(task.clone());

        let mut session = session();
        session.load(TrackGroup::new(vec![a, b.clone()]).unwrap()).unwrap();
        assert!(session.viewport().task_renderer().is_none());

        session.dispatch(PlaybackAction::SetActiveTrack(b.id())).unwrap();
        let renderer = session.viewport().task_renderer().unwrap();
        assert!(Arc::ptr_eq(renderer.task(), &task));
    }

    #[test]
    fn test_render_mode_reaches_renderers() {
        let mut session = session();
        session.load(pair()).unwrap();
        session
            .dispatch(PlaybackAction::SetRenderFullTrack(true))
            .unwrap();

        let viewport = session.viewport();
        assert!(viewport.is_full_track());
        for id in viewport.track_ids() {
            assert!(viewport.renderer(id).unwrap().is_full_track());
        }
    }

    #[test]
    fn test_unload_and_destroy() {
        let mut session = session();
        let mut rx = session.subscribe();
        session.load(pair()).unwrap();
        assert!(rx.borrow_and_update().active_timestamp.is_some());

        session.unload().unwrap();
        assert!(session.viewport().is_empty());
        assert_eq!(*rx.borrow_and_update(), PlaybackSnapshot::default());
        assert_eq!(session.viewport().surface().unwrap().primitive_count(), 0);

        let surface = session.destroy().unwrap();
        assert!(surface.is_disposed());
        assert!(session.dispatch(PlaybackAction::TogglePlay).is_ok());
        assert!(session.load(pair()).is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = SessionConfig::from_json(
            r#"{ "playback": { "default_speed": 8.0 }, "viewport": { "follow_active": false } }"#,
        )
        .unwrap();

        assert_eq!(config.playback.default_speed, 8.0);
        assert_eq!(config.playback.max_speed, PlaybackConfig::default().max_speed);
        assert!(!config.viewport.follow_active);
        assert!(config.palette.is_empty());
        assert!(SessionConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_inverted_speed_bounds_from_json() {
        let config =
            SessionConfig::from_json(r#"{ "playback": { "min_speed": 10.0, "max_speed": 2.0 } }"#)
                .unwrap();
        let surface = HeadlessSurface::new(800.0, 600.0).with_camera(coord! { x: 0.0, y: 0.0 }, 3.0);
        let mut session = PlaybackSession::new(surface, config);
        session.load(pair()).unwrap();

        session.dispatch(PlaybackAction::SetSpeed(4.0)).unwrap();
        assert_eq!(session.state().speed, 2.0);
    }

    #[test]
    fn test_follow_toggle_keeps_config_in_step() {
        let mut session = session();
        session.set_follow_active(false);
        assert!(!session.config().viewport.follow_active);
        assert!(!session.viewport().config().follow_active);

        session.set_follow_active(true);
        assert!(session.config().viewport.follow_active);
        assert!(session.viewport().config().follow_active);
    }
}
