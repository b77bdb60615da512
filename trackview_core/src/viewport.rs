//! The viewport - renderer registry and camera behavior.
//!
//! Owns the map surface and every renderer drawing on it. Renderers only
//! borrow the surface's [`Primitives`](crate::surface::Primitives)
//! capability for the duration of a call.
//!
//! Camera rules:
//! - Ticks pan (never zoom) to re-center the active marker once it leaves
//!   the usable area, i.e. the viewport minus the overlay padding.
//! - Switching the active track flies the camera out to include its marker
//!   if the marker is off screen.

use geo::Coord;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bounds::ViewportBounds;
use crate::surface::{EdgePadding, MapSurface};
use crate::task_renderer::TaskRenderer;
use crate::track::{Task, Timestamp, Track, TrackId};
use crate::track_renderer::{RenderOptions, TrackRenderer};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the ViewportController
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Pixels reserved for overlay UI (default: 64 top, 16 sides, 140 bottom)
    pub padding: EdgePadding,

    /// Smallest usable width/height before an edge's padding is dropped (default: 160 px)
    pub min_usable_extent_px: f64,

    /// Re-center on the active marker while playing (default: true)
    pub follow_active: bool,

    /// Zoom levels per zoom in/out (default: 1.0)
    pub zoom_step: f64,

    /// Zoom around the active marker instead of the viewport center (default: true)
    pub zoom_around_marker: bool,

    /// Extra margin around fitted bounds (default: 24 px)
    pub fit_padding_px: f64,

    /// Animate camera moves (default: true)
    pub animate_camera: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            padding: EdgePadding {
                top: 64.0,
                right: 16.0,
                bottom: 140.0,
                left: 16.0,
            },
            min_usable_extent_px: 160.0,
            follow_active: true,
            zoom_step: 1.0,
            zoom_around_marker: true,
            fit_padding_px: 24.0,
            animate_camera: true,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportError {
    #[error("Map surface is not initialized")]
    UninitializedSurface,

    #[error("Track {0} is already registered")]
    DuplicateTrack(TrackId),
}

// ============================================================================
// USABLE AREA
// ============================================================================

/// Padding actually applied for a viewport of `size`.
///
/// Edges are taken in order top, right, bottom, left. An edge is dropped to
/// zero when keeping it would leave less than `min_extent` pixels on its
/// axis.
pub fn effective_padding(size: Vector2<f64>, padding: EdgePadding, min_extent: f64) -> EdgePadding {
    let keep = |edge: f64, used: f64, total: f64| {
        if total - used - edge >= min_extent {
            edge
        } else {
            0.0
        }
    };

    let top = keep(padding.top, 0.0, size.y);
    let right = keep(padding.right, 0.0, size.x);
    let bottom = keep(padding.bottom, top, size.y);
    let left = keep(padding.left, right, size.x);
    EdgePadding {
        top,
        right,
        bottom,
        left,
    }
}

/// Usable area as `(top_left, bottom_right)` screen points.
pub fn usable_area(size: Vector2<f64>, padding: EdgePadding) -> (Vector2<f64>, Vector2<f64>) {
    (
        Vector2::new(padding.left, padding.top),
        Vector2::new(size.x - padding.right, size.y - padding.bottom),
    )
}

// ============================================================================
// CONTROLLER
// ============================================================================

#[derive(Debug)]
enum SurfaceState<S> {
    Pending,
    Ready(S),
    Destroyed,
}

/// Resolves the surface for an operation.
///
/// `Ok(None)` after destruction so callers turn into no-ops.
fn ready<S>(state: &mut SurfaceState<S>) -> Result<Option<&mut S>, ViewportError> {
    match state {
        SurfaceState::Pending => Err(ViewportError::UninitializedSurface),
        SurfaceState::Ready(surface) => Ok(Some(surface)),
        SurfaceState::Destroyed => Ok(None),
    }
}

/// Registry of track renderers plus an optional task renderer, and the
/// camera logic over them.
///
/// Invariant: at most one renderer is active.
#[derive(Debug)]
pub struct ViewportController<S: MapSurface> {
    config: ViewportConfig,
    surface: SurfaceState<S>,
    /// In insertion order
    tracks: Vec<TrackRenderer>,
    task: Option<TaskRenderer>,
    active: Option<TrackId>,
    full_track: bool,
    time: Option<Timestamp>,
}

impl<S: MapSurface> ViewportController<S> {
    /// Creates a controller whose surface is still being constructed.
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            surface: SurfaceState::Pending,
            tracks: Vec::new(),
            task: None,
            active: None,
            full_track: false,
            time: None,
        }
    }

    pub fn with_surface(surface: S, config: ViewportConfig) -> Self {
        let mut controller = Self::new(config);
        controller.surface = SurfaceState::Ready(surface);
        controller
    }

    /// Hands over the constructed surface. Ignored unless pending.
    pub fn attach_surface(&mut self, surface: S) {
        match &self.surface {
            SurfaceState::Pending => {}
            SurfaceState::Ready(_) => {
                warn!("Surface already attached, ignoring");
                return;
            }
            SurfaceState::Destroyed => {
                debug!("Viewport destroyed, dropping late surface");
                return;
            }
        }
        self.surface = SurfaceState::Ready(surface);
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.surface, SurfaceState::Ready(_))
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.surface, SurfaceState::Destroyed)
    }

    pub fn surface(&self) -> Option<&S> {
        match &self.surface {
            SurfaceState::Ready(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        match &mut self.surface {
            SurfaceState::Ready(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Registered track ids in insertion order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(TrackRenderer::track_id).collect()
    }

    pub fn renderer(&self, id: TrackId) -> Option<&TrackRenderer> {
        self.tracks.iter().find(|r| r.track_id() == id)
    }

    pub fn task_renderer(&self) -> Option<&TaskRenderer> {
        self.task.as_ref()
    }

    pub fn active_track(&self) -> Option<TrackId> {
        self.active
    }

    pub fn time(&self) -> Option<Timestamp> {
        self.time
    }

    pub fn is_full_track(&self) -> bool {
        self.full_track
    }

    /// Union of every registered extent (tracks and task).
    pub fn extent(&self) -> ViewportBounds {
        self.tracks
            .iter()
            .map(TrackRenderer::extent)
            .chain(self.task.iter().map(TaskRenderer::extent))
            .collect()
    }

    /// Registers a renderer for `track`. The first track becomes active.
    pub fn add_track(&mut self, track: Track) -> Result<(), ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };
        let id = track.id();
        if self.tracks.iter().any(|r| r.track_id() == id) {
            return Err(ViewportError::DuplicateTrack(id));
        }

        let active = self.active.is_none();
        let mut renderer = TrackRenderer::new(
            track,
            surface,
            RenderOptions {
                active,
                full_track: self.full_track,
            },
        );
        if let Some(time) = self.time {
            renderer.set_time(surface, time);
        }
        if active {
            self.active = Some(id);
        }
        self.tracks.push(renderer);

        debug!(track = %id, active, "Track added to viewport");
        Ok(())
    }

    /// Disposes a track's renderer. Returns whether it was registered.
    ///
    /// Removing the active track promotes the next one in insertion order
    /// (wrapping to the first).
    pub fn remove_track(&mut self, id: TrackId) -> Result<bool, ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(false);
        };
        let Some(index) = self.tracks.iter().position(|r| r.track_id() == id) else {
            return Ok(false);
        };

        let mut renderer = self.tracks.remove(index);
        renderer.dispose(surface);

        if self.active == Some(id) {
            self.active = None;
            let next = if index < self.tracks.len() { index } else { 0 };
            if let Some(promoted) = self.tracks.get_mut(next) {
                promoted.set_active(surface, true);
                self.active = Some(promoted.track_id());
            }
        }

        debug!(track = %id, active = ?self.active, "Track removed from viewport");
        Ok(true)
    }

    /// Replaces the task renderer wholesale. The same task is a no-op.
    pub fn set_task(&mut self, task: Option<Arc<Task>>) -> Result<(), ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };

        let unchanged = match (&self.task, &task) {
            (Some(current), Some(next)) => Arc::ptr_eq(current.task(), next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(mut old) = self.task.take() {
            old.dispose(surface);
        }
        self.task = task.map(|task| TaskRenderer::new(task, surface));
        Ok(())
    }

    /// Forwards the instant to every renderer, then follows the active track.
    pub fn set_time(&mut self, time: Timestamp) -> Result<(), ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };
        self.time = Some(time);
        for renderer in &mut self.tracks {
            renderer.set_time(surface, time);
        }

        if self.config.follow_active {
            if let Some(marker) = active_marker(&self.tracks, self.active) {
                follow(surface, &self.config, marker);
            }
        }
        Ok(())
    }

    /// Makes `id` the single active track. Unknown ids are ignored.
    pub fn set_active_track(&mut self, id: TrackId) -> Result<bool, ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(false);
        };
        if !self.tracks.iter().any(|r| r.track_id() == id) {
            warn!(track = %id, "Cannot activate unregistered track");
            return Ok(false);
        }
        if self.active == Some(id) {
            return Ok(true);
        }

        for renderer in &mut self.tracks {
            let active = renderer.track_id() == id;
            renderer.set_active(surface, active);
        }
        self.active = Some(id);

        if let Some(marker) = active_marker(&self.tracks, self.active) {
            let visible = surface.visible_bounds();
            if !visible.contains(marker) {
                let padding = effective_padding(
                    surface.size(),
                    self.config.padding,
                    self.config.min_usable_extent_px,
                );
                match visible.extend(marker).rect() {
                    Some(rect) if !visible.is_empty() => {
                        debug!(track = %id, "Flying to include active marker");
                        surface.fly_to_bounds(rect, padding, self.config.animate_camera);
                    }
                    _ => surface.pan_to(marker, self.config.animate_camera),
                }
            }
        }
        Ok(true)
    }

    /// Switches every renderer, including later ones, between progressive
    /// reveal and full paths.
    pub fn set_render_full_track(&mut self, full_track: bool) -> Result<(), ViewportError> {
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };
        self.full_track = full_track;
        for renderer in &mut self.tracks {
            renderer.set_full_track(surface, full_track);
        }
        Ok(())
    }

    pub fn set_follow_active(&mut self, follow: bool) {
        self.config.follow_active = follow;
    }

    /// Fits the camera to every registered extent. No-op when there is
    /// nothing to fit.
    pub fn zoom_to_fit(&mut self) -> Result<(), ViewportError> {
        let extent = self.extent();
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };
        let Some(rect) = extent.rect() else {
            debug!("Nothing to fit");
            return Ok(());
        };

        let padding = effective_padding(
            surface.size(),
            self.config.padding,
            self.config.min_usable_extent_px,
        )
        .grow(self.config.fit_padding_px);
        debug!(?rect, "Zooming to fit");
        surface.fly_to_bounds(rect, padding, self.config.animate_camera);
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<(), ViewportError> {
        self.zoom(self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> Result<(), ViewportError> {
        self.zoom(-self.config.zoom_step)
    }

    fn zoom(&mut self, delta: f64) -> Result<(), ViewportError> {
        let around = if self.config.zoom_around_marker {
            active_marker(&self.tracks, self.active)
        } else {
            None
        };
        let Some(surface) = ready(&mut self.surface)? else {
            return Ok(());
        };
        surface.zoom_by(delta, around, self.config.animate_camera);
        Ok(())
    }

    /// Disposes every renderer and the surface, returning the disposed
    /// surface. Safe to call in any state, any number of times.
    pub fn destroy(&mut self) -> Option<S> {
        let state = std::mem::replace(&mut self.surface, SurfaceState::Destroyed);
        let SurfaceState::Ready(mut surface) = state else {
            return None;
        };

        for renderer in &mut self.tracks {
            renderer.dispose(&mut surface);
        }
        if let Some(task) = &mut self.task {
            task.dispose(&mut surface);
        }
        self.tracks.clear();
        self.task = None;
        self.active = None;
        surface.dispose();

        debug!("Viewport destroyed");
        Some(surface)
    }
}

fn active_marker(tracks: &[TrackRenderer], active: Option<TrackId>) -> Option<Coord<f64>> {
    let id = active?;
    tracks
        .iter()
        .find(|r| r.track_id() == id)
        .map(|r| r.marker_position().coord)
}

/// Pans so `marker` sits at the center of the usable area, if it left it.
fn follow<S: MapSurface>(surface: &mut S, config: &ViewportConfig, marker: Coord<f64>) {
    let size = surface.size();
    let padding = effective_padding(size, config.padding, config.min_usable_extent_px);
    let (top_left, bottom_right) = usable_area(size, padding);

    let p = surface.project(marker);
    let inside = p.x >= top_left.x && p.x <= bottom_right.x && p.y >= top_left.y && p.y <= bottom_right.y;
    if inside {
        return;
    }

    let usable_center = (top_left + bottom_right) / 2.0;
    let center = surface.unproject(size / 2.0 + (p - usable_center));
    debug!(?marker, ?center, "Following active track");
    surface.pan_to(center, config.animate_camera);
}
