//! In-memory map surface.
//!
//! Spherical Web Mercator with 256 px tiles. Nothing is drawn; primitives
//! are stored and every operation is appended to a call log, which makes
//! this the surface used by tests and the simulator.

use geo::{coord, Coord, Rect};
use nalgebra::Vector2;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use tracing::trace;

use crate::bounds::ViewportBounds;
use crate::surface::{
    Camera, EdgePadding, LineStyle, MapSurface, MarkerStyle, Primitive, PrimitiveId, Primitives,
};

/// Tile edge in pixels at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;

/// Web Mercator latitude limit.
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// World pixel coordinate of `c` at `zoom` (origin at 180°W, 85°N).
pub fn world_px(c: Coord<f64>, zoom: f64) -> Vector2<f64> {
    let scale = TILE_SIZE * 2f64.powf(zoom);
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (c.x + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    Vector2::new(x, y)
}

/// Inverse of [`world_px`].
pub fn from_world_px(p: Vector2<f64>, zoom: f64) -> Coord<f64> {
    let scale = TILE_SIZE * 2f64.powf(zoom);
    let lon = p.x / scale * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * p.y / scale)).sinh().atan().to_degrees();
    coord! { x: lon, y: lat }
}

/// One recorded surface operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Add { id: PrimitiveId, kind: &'static str, z_index: i32 },
    UpdateLine { id: PrimitiveId, len: usize },
    MoveMarker { id: PrimitiveId },
    SetLineStyle { id: PrimitiveId },
    SetMarkerStyle { id: PrimitiveId },
    SetZIndex { id: PrimitiveId, z_index: i32 },
    Remove { id: PrimitiveId },
    PanTo { center: Coord<f64>, animate: bool },
    FlyToBounds { bounds: Rect<f64>, animate: bool },
    ZoomBy { delta: f64, animate: bool },
    Dispose,
}

impl SurfaceCall {
    /// True for operations that change the camera.
    pub fn is_camera_move(&self) -> bool {
        matches!(
            self,
            SurfaceCall::PanTo { .. } | SurfaceCall::FlyToBounds { .. } | SurfaceCall::ZoomBy { .. }
        )
    }
}

/// A primitive as stored by the headless surface.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrimitive {
    pub primitive: Primitive,
    pub z_index: i32,
}

/// In-memory [`MapSurface`].
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    size: Vector2<f64>,
    camera: Camera,
    primitives: BTreeMap<PrimitiveId, StoredPrimitive>,
    next_id: u64,
    calls: Vec<SurfaceCall>,
    disposed: bool,
}

impl HeadlessSurface {
    /// Creates a `width` x `height` pixel surface looking at (0, 0) from zoom 2.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            size: Vector2::new(width.max(1.0), height.max(1.0)),
            camera: Camera {
                center: coord! { x: 0.0, y: 0.0 },
                zoom: 2.0,
            },
            primitives: BTreeMap::new(),
            next_id: 0,
            calls: Vec::new(),
            disposed: false,
        }
    }

    pub fn with_camera(mut self, center: Coord<f64>, zoom: f64) -> Self {
        self.camera = Camera {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        };
        self
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of logged camera operations.
    pub fn camera_moves(&self) -> usize {
        self.calls.iter().filter(|c| c.is_camera_move()).count()
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<&StoredPrimitive> {
        self.primitives.get(&id)
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn primitives(&self) -> impl Iterator<Item = (PrimitiveId, &StoredPrimitive)> {
        self.primitives.iter().map(|(id, p)| (*id, p))
    }

    /// Coordinates of a stored line, if `id` is one.
    pub fn line_coords(&self, id: PrimitiveId) -> Option<&[Coord<f64>]> {
        match self.primitives.get(&id).map(|p| &p.primitive) {
            Some(Primitive::Line { coords, .. }) => Some(coords),
            _ => None,
        }
    }

    /// Position of a stored marker, if `id` is one.
    pub fn marker_position(&self, id: PrimitiveId) -> Option<Coord<f64>> {
        match self.primitives.get(&id).map(|p| &p.primitive) {
            Some(Primitive::Marker { position, .. }) => Some(*position),
            _ => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn log(&mut self, call: SurfaceCall) {
        trace!(?call, "Surface call");
        self.calls.push(call);
    }

    fn center_px(&self) -> Vector2<f64> {
        world_px(self.camera.center, self.camera.zoom)
    }
}

impl Primitives for HeadlessSurface {
    fn add(&mut self, primitive: Primitive, z_index: i32) -> PrimitiveId {
        let id = PrimitiveId(self.next_id);
        self.next_id += 1;
        self.log(SurfaceCall::Add {
            id,
            kind: primitive.kind(),
            z_index,
        });
        self.primitives
            .insert(id, StoredPrimitive { primitive, z_index });
        id
    }

    fn update_line(&mut self, id: PrimitiveId, new_coords: &[Coord<f64>]) {
        if let Some(StoredPrimitive {
            primitive: Primitive::Line { coords, .. },
            ..
        }) = self.primitives.get_mut(&id)
        {
            coords.clear();
            coords.extend_from_slice(new_coords);
            self.log(SurfaceCall::UpdateLine {
                id,
                len: new_coords.len(),
            });
        }
    }

    fn move_marker(&mut self, id: PrimitiveId, new_position: Coord<f64>, new_heading: f64) {
        if let Some(StoredPrimitive {
            primitive: Primitive::Marker {
                position, heading, ..
            },
            ..
        }) = self.primitives.get_mut(&id)
        {
            *position = new_position;
            *heading = new_heading;
            self.log(SurfaceCall::MoveMarker { id });
        }
    }

    fn set_line_style(&mut self, id: PrimitiveId, new_style: LineStyle) {
        if let Some(StoredPrimitive {
            primitive: Primitive::Line { style, .. },
            ..
        }) = self.primitives.get_mut(&id)
        {
            *style = new_style;
            self.log(SurfaceCall::SetLineStyle { id });
        }
    }

    fn set_marker_style(&mut self, id: PrimitiveId, new_style: MarkerStyle) {
        if let Some(StoredPrimitive {
            primitive: Primitive::Marker { style, .. },
            ..
        }) = self.primitives.get_mut(&id)
        {
            *style = new_style;
            self.log(SurfaceCall::SetMarkerStyle { id });
        }
    }

    fn set_z_index(&mut self, id: PrimitiveId, z_index: i32) {
        if let Some(stored) = self.primitives.get_mut(&id) {
            stored.z_index = z_index;
            self.log(SurfaceCall::SetZIndex { id, z_index });
        }
    }

    fn remove(&mut self, id: PrimitiveId) {
        if self.primitives.remove(&id).is_some() {
            self.log(SurfaceCall::Remove { id });
        }
    }
}

impl MapSurface for HeadlessSurface {
    fn size(&self) -> Vector2<f64> {
        self.size
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn project(&self, c: Coord<f64>) -> Vector2<f64> {
        world_px(c, self.camera.zoom) - self.center_px() + self.size / 2.0
    }

    fn unproject(&self, p: Vector2<f64>) -> Coord<f64> {
        from_world_px(p - self.size / 2.0 + self.center_px(), self.camera.zoom)
    }

    fn visible_bounds(&self) -> ViewportBounds {
        let top_left = self.unproject(Vector2::zeros());
        let bottom_right = self.unproject(self.size);
        ViewportBounds::from_rect(Rect::new(top_left, bottom_right))
    }

    fn pan_to(&mut self, center: Coord<f64>, animate: bool) {
        self.camera.center = center;
        self.log(SurfaceCall::PanTo { center, animate });
    }

    fn fly_to_bounds(&mut self, bounds: Rect<f64>, padding: EdgePadding, animate: bool) {
        let available = Vector2::new(
            (self.size.x - padding.left - padding.right).max(1.0),
            (self.size.y - padding.top - padding.bottom).max(1.0),
        );

        // Extent at zoom 0; screen y grows southward so max latitude is min y
        let lo = world_px(coord! { x: bounds.min().x, y: bounds.max().y }, 0.0);
        let hi = world_px(coord! { x: bounds.max().x, y: bounds.min().y }, 0.0);
        let extent = hi - lo;

        let fit = |avail: f64, span: f64| {
            if span > f64::EPSILON {
                (avail / span).log2()
            } else {
                f64::INFINITY
            }
        };
        let zoom = fit(available.x, extent.x).min(fit(available.y, extent.y));
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            self.camera.zoom
        };

        // Put the bounds' center at the center of the padded area
        let bounds_center = (world_px(coord! { x: bounds.min().x, y: bounds.max().y }, zoom)
            + world_px(coord! { x: bounds.max().x, y: bounds.min().y }, zoom))
            / 2.0;
        let shift = Vector2::new(
            (padding.right - padding.left) / 2.0,
            (padding.bottom - padding.top) / 2.0,
        );

        self.camera = Camera {
            center: from_world_px(bounds_center + shift, zoom),
            zoom,
        };
        self.log(SurfaceCall::FlyToBounds { bounds, animate });
    }

    fn zoom_by(&mut self, delta: f64, around: Option<Coord<f64>>, animate: bool) {
        let zoom = (self.camera.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        match around {
            Some(anchor) => {
                // Keep the anchor on the same screen pixel
                let offset = self.project(anchor) - self.size / 2.0;
                let center = world_px(anchor, zoom) - offset;
                self.camera = Camera {
                    center: from_world_px(center, zoom),
                    zoom,
                };
            }
            None => self.camera.zoom = zoom,
        }
        self.log(SurfaceCall::ZoomBy { delta, animate });
    }

    fn dispose(&mut self) {
        self.primitives.clear();
        self.disposed = true;
        self.log(SurfaceCall::Dispose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::surface::{LineDash, MarkerStyle};
    use approx::assert_relative_eq;

    fn line(coords: Vec<Coord<f64>>) -> Primitive {
        Primitive::Line {
            coords,
            style: LineStyle {
                color: Color::NEUTRAL,
                width: 2.0,
                dash: LineDash::Solid,
            },
        }
    }

    #[test]
    fn test_projection_round_trips_near_center() {
        let surface = HeadlessSurface::new(800.0, 600.0).with_camera(coord! { x: 7.0, y: 46.0 }, 10.0);
        let c = coord! { x: 7.05, y: 45.98 };
        let back = surface.unproject(surface.project(c));

        assert_relative_eq!(back.x, c.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, c.y, epsilon = 1e-9);

        let center = surface.project(coord! { x: 7.0, y: 46.0 });
        assert_relative_eq!(center.x, 400.0, epsilon = 1e-6);
        assert_relative_eq!(center.y, 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_world_px_at_zoom_zero() {
        let origin = world_px(coord! { x: 0.0, y: 0.0 }, 0.0);
        assert_relative_eq!(origin.x, 128.0, epsilon = 1e-9);
        assert_relative_eq!(origin.y, 128.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fly_to_bounds_fits_inside_padding() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        let bounds = Rect::new(coord! { x: 7.0, y: 46.0 }, coord! { x: 7.2, y: 46.1 });
        let padding = EdgePadding {
            top: 50.0,
            right: 10.0,
            bottom: 100.0,
            left: 10.0,
        };
        surface.fly_to_bounds(bounds, padding, false);

        let nw = surface.project(coord! { x: 7.0, y: 46.1 });
        let se = surface.project(coord! { x: 7.2, y: 46.0 });
        let eps = 1e-6;
        assert!(nw.x >= padding.left - eps && nw.y >= padding.top - eps);
        assert!(se.x <= 800.0 - padding.right + eps && se.y <= 600.0 - padding.bottom + eps);

        // One axis is tight
        let tight_x = (se.x - nw.x - (800.0 - 20.0)).abs() < 1e-6;
        let tight_y = (se.y - nw.y - (600.0 - 150.0)).abs() < 1e-6;
        assert!(tight_x || tight_y);
    }

    #[test]
    fn test_fly_to_point_keeps_zoom() {
        let mut surface = HeadlessSurface::new(400.0, 400.0).with_camera(coord! { x: 0.0, y: 0.0 }, 9.0);
        let p = coord! { x: 8.0, y: 47.0 };
        surface.fly_to_bounds(Rect::new(p, p), EdgePadding::default(), false);

        assert_relative_eq!(surface.camera().zoom, 9.0);
        assert_relative_eq!(surface.camera().center.x, 8.0, epsilon = 1e-9);
        assert_relative_eq!(surface.camera().center.y, 47.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zoom_around_anchor_keeps_anchor_fixed() {
        let mut surface = HeadlessSurface::new(800.0, 600.0).with_camera(coord! { x: 7.0, y: 46.0 }, 10.0);
        let anchor = coord! { x: 7.1, y: 46.05 };
        let before = surface.project(anchor);

        surface.zoom_by(1.0, Some(anchor), true);
        let after = surface.project(anchor);

        assert_relative_eq!(surface.camera().zoom, 11.0);
        assert_relative_eq!(before.x, after.x, epsilon = 1e-6);
        assert_relative_eq!(before.y, after.y, epsilon = 1e-6);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut surface = HeadlessSurface::new(100.0, 100.0).with_camera(coord! { x: 0.0, y: 0.0 }, 21.5);
        surface.zoom_by(3.0, None, false);
        assert_relative_eq!(surface.camera().zoom, MAX_ZOOM);
    }

    #[test]
    fn test_primitive_store_and_log() {
        let mut surface = HeadlessSurface::new(100.0, 100.0);
        let a = coord! { x: 0.0, y: 0.0 };
        let b = coord! { x: 1.0, y: 1.0 };

        let id = surface.add(line(vec![a]), 10);
        surface.update_line(id, &[a, b]);
        assert_eq!(surface.line_coords(id), Some(&[a, b][..]));

        // Wrong primitive kind is ignored
        surface.move_marker(id, b, 0.0);
        surface.set_marker_style(
            id,
            MarkerStyle {
                color: Color::NEUTRAL,
                size: 4.0,
            },
        );

        surface.remove(id);
        surface.remove(id);
        assert_eq!(surface.primitive_count(), 0);
        assert_eq!(
            surface.calls(),
            &[
                SurfaceCall::Add { id, kind: "line", z_index: 10 },
                SurfaceCall::UpdateLine { id, len: 2 },
                SurfaceCall::Remove { id },
            ]
        );
    }
}
