//! Map surface abstraction.
//!
//! The surface is split in two capabilities:
//! - [`Primitives`]: add/update/remove drawable objects. This is all a
//!   renderer ever sees, borrowed for the duration of one call.
//! - [`MapSurface`]: camera and projection on top of that. Only the
//!   viewport controller uses it.

use geo::{Coord, Polygon, Rect};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::bounds::ViewportBounds;
use crate::color::Color;

/// Handle to a primitive stored by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(pub u64);

/// Stroke pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineDash {
    #[default]
    Solid,
    Dashed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: Color,
    /// Stroke width in pixels
    pub width: f64,
    pub dash: LineDash,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillStyle {
    pub fill: Color,
    pub stroke: Color,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub color: Color,
    /// Marker diameter in pixels
    pub size: f64,
}

/// A drawable object.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Line {
        coords: Vec<Coord<f64>>,
        style: LineStyle,
    },
    Polygon {
        polygon: Polygon<f64>,
        style: FillStyle,
    },
    Marker {
        position: Coord<f64>,
        /// Degrees clockwise from north
        heading: f64,
        style: MarkerStyle,
    },
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Line { .. } => "line",
            Primitive::Polygon { .. } => "polygon",
            Primitive::Marker { .. } => "marker",
        }
    }
}

/// Drawing capability handed to renderers.
///
/// Operations on an unknown id are ignored by implementations.
pub trait Primitives {
    /// Stores a primitive at the given stacking order (higher draws on top).
    fn add(&mut self, primitive: Primitive, z_index: i32) -> PrimitiveId;

    /// Replaces the coordinates of a line primitive.
    fn update_line(&mut self, id: PrimitiveId, coords: &[Coord<f64>]);

    fn move_marker(&mut self, id: PrimitiveId, position: Coord<f64>, heading: f64);

    fn set_line_style(&mut self, id: PrimitiveId, style: LineStyle);

    fn set_marker_style(&mut self, id: PrimitiveId, style: MarkerStyle);

    fn set_z_index(&mut self, id: PrimitiveId, z_index: i32);

    fn remove(&mut self, id: PrimitiveId);
}

/// Camera position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Geographic center of the view (x = longitude, y = latitude)
    pub center: Coord<f64>,
    /// Fractional zoom level
    pub zoom: f64,
}

/// Pixels reserved at each viewport edge for overlay UI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgePadding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl EdgePadding {
    pub const fn uniform(px: f64) -> Self {
        Self {
            top: px,
            right: px,
            bottom: px,
            left: px,
        }
    }

    /// Adds `px` to every edge.
    pub fn grow(self, px: f64) -> Self {
        Self {
            top: self.top + px,
            right: self.right + px,
            bottom: self.bottom + px,
            left: self.left + px,
        }
    }
}

/// A map with a camera.
///
/// Screen coordinates are pixels with the origin at the top-left corner.
pub trait MapSurface: Primitives {
    /// Viewport size in pixels.
    fn size(&self) -> Vector2<f64>;

    fn camera(&self) -> Camera;

    /// Geographic coordinate to screen pixels.
    fn project(&self, coord: Coord<f64>) -> Vector2<f64>;

    /// Screen pixels to geographic coordinate.
    fn unproject(&self, point: Vector2<f64>) -> Coord<f64>;

    /// Geographic rectangle currently on screen.
    fn visible_bounds(&self) -> ViewportBounds;

    /// Moves the camera center without changing zoom.
    fn pan_to(&mut self, center: Coord<f64>, animate: bool);

    /// Moves and zooms so `bounds` fits inside the viewport minus `padding`.
    fn fly_to_bounds(&mut self, bounds: Rect<f64>, padding: EdgePadding, animate: bool);

    /// Changes zoom by `delta` levels, keeping `around` fixed on screen when
    /// given (the viewport center otherwise).
    fn zoom_by(&mut self, delta: f64, around: Option<Coord<f64>>, animate: bool);

    /// Releases every surface resource.
    fn dispose(&mut self);
}
