//! Static geometry for a navigation task.

use geo::{BoundingRect, Coord, HaversineBearing, HaversineDestination, LineString, Point, Polygon};
use std::sync::Arc;
use tracing::debug;

use crate::bounds::ViewportBounds;
use crate::color::Color;
use crate::surface::{FillStyle, LineDash, LineStyle, Primitive, PrimitiveId, Primitives};
use crate::track::{Task, Turnpoint, ZoneShape};

/// Task geometry is drawn below every track.
pub const TASK_Z_INDEX: i32 = 5;

/// Vertices used to approximate a cylinder.
const CYLINDER_VERTICES: usize = 64;

const ZONE_STROKE: Color = Color::rgb(0x33, 0x66, 0xcc);
const ZONE_FILL: Color = Color::rgba(0x33, 0x66, 0xcc, 0x33);
const COURSE_LINE: Color = Color::rgba(0x33, 0x66, 0xcc, 0xb0);

/// Initial great-circle bearing from `from` to `to`, degrees in `[0, 360)`.
pub fn bearing(from: Coord<f64>, to: Coord<f64>) -> f64 {
    Point::from(from)
        .haversine_bearing(Point::from(to))
        .rem_euclid(360.0)
}

fn destination(origin: Coord<f64>, bearing_deg: f64, distance_m: f64) -> Coord<f64> {
    Point::from(origin)
        .haversine_destination(bearing_deg, distance_m)
        .into()
}

/// Closed ring approximating a circle of `radius_m` around `center`.
fn cylinder_ring(center: Coord<f64>, radius_m: f64) -> LineString<f64> {
    let step = 360.0 / CYLINDER_VERTICES as f64;
    let mut ring: Vec<Coord<f64>> = (0..CYLINDER_VERTICES)
        .map(|i| destination(center, i as f64 * step, radius_m))
        .collect();
    ring.push(ring[0]);
    LineString::from(ring)
}

/// Bearing of the leg a turnpoint's line zone is perpendicular to.
///
/// The outgoing leg is used when there is one, the incoming leg for the
/// last turnpoint, and north for a single-point task.
fn leg_bearing(turnpoints: &[Turnpoint], index: usize) -> f64 {
    let here = turnpoints[index].coord();
    if let Some(next) = turnpoints.get(index + 1) {
        bearing(here, next.coord())
    } else if index > 0 {
        bearing(turnpoints[index - 1].coord(), here)
    } else {
        0.0
    }
}

/// Renders a task's turnpoint zones and the course line through their
/// centers.
///
/// The geometry never changes; a new task means a new renderer.
#[derive(Debug)]
pub struct TaskRenderer {
    task: Arc<Task>,
    primitives: Vec<PrimitiveId>,
    extent: ViewportBounds,
    disposed: bool,
}

impl TaskRenderer {
    pub fn new<P>(task: Arc<Task>, surface: &mut P) -> Self
    where
        P: Primitives + ?Sized,
    {
        let mut primitives = Vec::new();
        let mut extent = ViewportBounds::empty();
        let turnpoints = &task.turnpoints;

        for (index, tp) in turnpoints.iter().enumerate() {
            let center = tp.coord();
            match tp.zone {
                ZoneShape::Cylinder { radius_m } => {
                    let polygon = Polygon::new(cylinder_ring(center, radius_m), vec![]);
                    extent = extent.union(polygon.bounding_rect().into());
                    primitives.push(surface.add(
                        Primitive::Polygon {
                            polygon,
                            style: FillStyle {
                                fill: ZONE_FILL,
                                stroke: ZONE_STROKE,
                                stroke_width: 1.5,
                            },
                        },
                        TASK_Z_INDEX,
                    ));
                }
                ZoneShape::Line { length_m } => {
                    let across = leg_bearing(turnpoints, index) + 90.0;
                    let half = length_m / 2.0;
                    let coords = vec![
                        destination(center, across, half),
                        destination(center, across + 180.0, half),
                    ];
                    extent = coords.iter().fold(extent, |b, c| b.extend(*c));
                    primitives.push(surface.add(
                        Primitive::Line {
                            coords,
                            style: LineStyle {
                                color: ZONE_STROKE,
                                width: 3.0,
                                dash: LineDash::Solid,
                            },
                        },
                        TASK_Z_INDEX,
                    ));
                }
            }
        }

        if turnpoints.len() > 1 {
            let course: Vec<Coord<f64>> = turnpoints.iter().map(Turnpoint::coord).collect();
            extent = course.iter().fold(extent, |b, c| b.extend(*c));
            primitives.push(surface.add(
                Primitive::Line {
                    coords: course,
                    style: LineStyle {
                        color: COURSE_LINE,
                        width: 1.5,
                        dash: LineDash::Dashed,
                    },
                },
                TASK_Z_INDEX,
            ));
        }

        debug!(
            turnpoints = turnpoints.len(),
            primitives = primitives.len(),
            "Task renderer built"
        );

        Self {
            task,
            primitives,
            extent,
            disposed: false,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Bounding box of all zone and course geometry.
    pub fn extent(&self) -> ViewportBounds {
        self.extent
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Removes every primitive. Idempotent.
    pub fn dispose<P>(&mut self, surface: &mut P)
    where
        P: Primitives + ?Sized,
    {
        if self.disposed {
            return;
        }
        for id in self.primitives.drain(..) {
            surface.remove(id);
        }
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessSurface;
    use approx::assert_relative_eq;
    use geo::{coord, HaversineLength};

    fn two_point_task() -> Arc<Task> {
        Arc::new(Task::new(vec![
            Turnpoint::new("Start", 46.0, 7.0, ZoneShape::Line { length_m: 2_000.0 }),
            Turnpoint::new("Goal", 46.0, 7.5, ZoneShape::Cylinder { radius_m: 1_000.0 }),
        ]))
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = coord! { x: 7.0, y: 46.0 };
        assert_relative_eq!(bearing(origin, coord! { x: 7.0, y: 47.0 }), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, coord! { x: 7.0, y: 45.0 }), 180.0, epsilon = 1e-9);
        let east = bearing(origin, coord! { x: 8.0, y: 46.0 });
        assert!(east > 89.0 && east < 91.0);
    }

    #[test]
    fn test_empty_task_draws_nothing() {
        let mut surface = HeadlessSurface::new(400.0, 300.0);
        let renderer = TaskRenderer::new(Arc::new(Task::default()), &mut surface);

        assert!(renderer.extent().is_empty());
        assert_eq!(surface.primitive_count(), 0);
    }

    #[test]
    fn test_zones_and_course_line() {
        let mut surface = HeadlessSurface::new(400.0, 300.0);
        let renderer = TaskRenderer::new(two_point_task(), &mut surface);

        // Start line, goal cylinder, course line
        assert_eq!(renderer.primitive_count(), 3);
        assert_eq!(surface.primitive_count(), 3);

        let extent = renderer.extent().rect().unwrap();
        // Cylinder reaches ~1km east of 7.5E
        assert!(extent.max().x > 7.5 && extent.max().x < 7.52);
        assert!(extent.min().x < 7.0 + 1e-6);
    }

    #[test]
    fn test_line_zone_is_perpendicular_and_sized() {
        let mut surface = HeadlessSurface::new(400.0, 300.0);
        let renderer = TaskRenderer::new(two_point_task(), &mut surface);
        let line_id = renderer.primitives[0];
        let coords = surface.line_coords(line_id).unwrap().to_vec();

        // Leg heads east, so the start line runs roughly north-south
        assert_relative_eq!(coords[0].x, 7.0, epsilon = 1e-3);
        assert_relative_eq!(coords[1].x, 7.0, epsilon = 1e-3);
        assert!(coords[0].y < 46.0 && coords[1].y > 46.0);
        let length = LineString::from(coords).haversine_length();
        assert_relative_eq!(length, 2_000.0, epsilon = 1.0);
    }

    #[test]
    fn test_cylinder_radius() {
        let center = coord! { x: 7.0, y: 46.0 };
        let ring = cylinder_ring(center, 500.0);
        assert_eq!(ring.0.len(), CYLINDER_VERTICES + 1);
        assert_eq!(ring.0.first(), ring.0.last());

        let north = ring.0[0];
        assert_relative_eq!(north.x, 7.0, epsilon = 1e-9);
        assert!(north.y > 46.0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut surface = HeadlessSurface::new(400.0, 300.0);
        let mut renderer = TaskRenderer::new(two_point_task(), &mut surface);
        renderer.dispose(&mut surface);
        renderer.dispose(&mut surface);
        assert_eq!(surface.primitive_count(), 0);
    }
}
