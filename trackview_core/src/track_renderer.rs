//! Per-track geometry: engine-state segments, time-clipped reveal and the
//! position marker.

use geo::{BoundingRect, Coord, LineString};
use tracing::debug;

use crate::bounds::ViewportBounds;
use crate::color::Color;
use crate::surface::{LineDash, LineStyle, MarkerStyle, Primitive, PrimitiveId, Primitives};
use crate::track::{Sample, Timestamp, Track, TrackId, TrackPosition};

/// Stacking order of the active track's lines; its marker sits one above.
pub const ACTIVE_Z_INDEX: i32 = 20;
/// Stacking order of inactive tracks' lines.
pub const INACTIVE_Z_INDEX: i32 = 10;

const ACTIVE_LINE_WIDTH: f64 = 3.0;
const INACTIVE_LINE_WIDTH: f64 = 2.0;
const ACTIVE_MARKER_SIZE: f64 = 14.0;
const INACTIVE_MARKER_SIZE: f64 = 9.0;

/// A contiguous run of samples sharing one engine state.
///
/// `start` and `end` are inclusive sample indices. Neighbouring segments
/// share their boundary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub engine_on: bool,
}

impl Segment {
    /// Number of samples covered, boundaries included.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Samples visible when the track is revealed up to `reveal`.
    ///
    /// `None` means the reveal point lies before the first sample.
    fn visible_len(&self, reveal: Option<usize>, full_track: bool) -> usize {
        if full_track {
            return self.len();
        }
        match reveal {
            None => 0,
            Some(idx) if self.end <= idx => self.len(),
            Some(idx) if self.start > idx => 0,
            Some(idx) => idx - self.start + 1,
        }
    }
}

/// Partitions samples into engine-state segments.
///
/// At every transition the engine-on sample is the shared boundary, so an
/// engine run covering samples `a..=b` yields exactly the segment `[a, b]`
/// and the surrounding engine-off segments end at `a` and start at `b`.
pub fn build_segments(samples: &[Sample]) -> Vec<Segment> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    let mut start = 0;
    let mut engine_on = first.engine_on;

    for (i, pair) in samples.windows(2).enumerate() {
        let next = i + 1;
        if pair[1].engine_on == pair[0].engine_on {
            continue;
        }
        let boundary = if pair[1].engine_on { next } else { i };
        segments.push(Segment {
            start,
            end: boundary,
            engine_on,
        });
        start = boundary;
        engine_on = pair[1].engine_on;
    }

    segments.push(Segment {
        start,
        end: samples.len() - 1,
        engine_on,
    });
    segments
}

#[derive(Debug)]
struct RenderedSegment {
    segment: Segment,
    /// Full geometry, sliced for the clipped view
    coords: Vec<Coord<f64>>,
    primitive: PrimitiveId,
    visible_len: usize,
}

/// Initial presentation of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub active: bool,
    pub full_track: bool,
}

/// Draws one track onto a surface and keeps it in sync with the playback
/// time.
///
/// Updates are incremental: a segment's primitive is only touched when the
/// number of visible samples in it changes.
#[derive(Debug)]
pub struct TrackRenderer {
    track: Track,
    color: Color,
    segments: Vec<RenderedSegment>,
    marker: PrimitiveId,
    marker_position: TrackPosition,
    extent: ViewportBounds,
    active: bool,
    full_track: bool,
    /// Last resolved reveal index; outer `None` before the first `set_time`
    reveal: Option<Option<usize>>,
    disposed: bool,
}

impl TrackRenderer {
    pub fn new<P>(track: Track, surface: &mut P, options: RenderOptions) -> Self
    where
        P: Primitives + ?Sized,
    {
        let color = track.color().unwrap_or(Color::NEUTRAL);
        let partition = build_segments(track.samples());
        let line_z = z_index(options.active);

        let segments: Vec<RenderedSegment> = partition
            .into_iter()
            .map(|segment| {
                let coords: Vec<Coord<f64>> = track.samples()[segment.start..=segment.end]
                    .iter()
                    .map(Sample::coord)
                    .collect();
                let visible_len = segment.visible_len(None, options.full_track);
                let primitive = surface.add(
                    Primitive::Line {
                        coords: coords[..visible_len].to_vec(),
                        style: line_style(color, segment.engine_on, options.active),
                    },
                    line_z,
                );
                RenderedSegment {
                    segment,
                    coords,
                    primitive,
                    visible_len,
                }
            })
            .collect();

        let extent = LineString::from(track.samples().iter().map(Sample::coord).collect::<Vec<_>>())
            .bounding_rect()
            .into();

        let marker_position = track.position_at(track.start());
        let marker = surface.add(
            Primitive::Marker {
                position: marker_position.coord,
                heading: marker_position.heading,
                style: marker_style(color, options.active),
            },
            line_z + 1,
        );

        debug!(
            track = %track.id(),
            segments = segments.len(),
            samples = track.len(),
            "Track renderer built"
        );

        Self {
            track,
            color,
            segments,
            marker,
            marker_position,
            extent,
            active: options.active,
            full_track: options.full_track,
            reveal: None,
            disposed: false,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track.id()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_full_track(&self) -> bool {
        self.full_track
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().map(|s| &s.segment)
    }

    /// Bounding box of the whole flight, independent of playback time.
    pub fn extent(&self) -> ViewportBounds {
        self.extent
    }

    pub fn marker_position(&self) -> &TrackPosition {
        &self.marker_position
    }

    pub fn marker(&self) -> PrimitiveId {
        self.marker
    }

    /// Visible coordinates of every segment, boundary duplicates removed.
    pub fn visible_path(&self) -> Vec<Coord<f64>> {
        let mut path: Vec<Coord<f64>> = Vec::new();
        for rendered in &self.segments {
            let visible = &rendered.coords[..rendered.visible_len];
            let skip = usize::from(!path.is_empty() && !visible.is_empty());
            path.extend_from_slice(&visible[skip.min(visible.len())..]);
        }
        path
    }

    /// Moves the renderer to a group-timeline instant.
    pub fn set_time<P>(&mut self, surface: &mut P, group_time: Timestamp)
    where
        P: Primitives + ?Sized,
    {
        if self.disposed {
            return;
        }

        let position = self.track.position_at(group_time);
        let reveal = if position.local_time < self.track.recording_start() {
            None
        } else {
            Some(position.index)
        };

        if self.reveal != Some(reveal) {
            self.reveal = Some(reveal);
            self.refresh_segments(surface);
        }

        if position.coord != self.marker_position.coord
            || position.heading != self.marker_position.heading
        {
            surface.move_marker(self.marker, position.coord, position.heading);
        }
        self.marker_position = position;
    }

    /// Switches between progressive reveal and the complete path.
    pub fn set_full_track<P>(&mut self, surface: &mut P, full_track: bool)
    where
        P: Primitives + ?Sized,
    {
        if self.disposed || self.full_track == full_track {
            return;
        }
        self.full_track = full_track;
        self.refresh_segments(surface);
    }

    /// Toggles emphasis and stacking order.
    pub fn set_active<P>(&mut self, surface: &mut P, active: bool)
    where
        P: Primitives + ?Sized,
    {
        if self.disposed || self.active == active {
            return;
        }
        self.active = active;

        let z = z_index(active);
        for rendered in &self.segments {
            surface.set_line_style(
                rendered.primitive,
                line_style(self.color, rendered.segment.engine_on, active),
            );
            surface.set_z_index(rendered.primitive, z);
        }
        surface.set_marker_style(self.marker, marker_style(self.color, active));
        surface.set_z_index(self.marker, z + 1);
    }

    /// Removes every primitive this renderer owns. Idempotent.
    pub fn dispose<P>(&mut self, surface: &mut P)
    where
        P: Primitives + ?Sized,
    {
        if self.disposed {
            return;
        }
        for rendered in &self.segments {
            surface.remove(rendered.primitive);
        }
        surface.remove(self.marker);
        self.disposed = true;
        debug!(track = %self.track.id(), "Track renderer disposed");
    }

    fn refresh_segments<P>(&mut self, surface: &mut P)
    where
        P: Primitives + ?Sized,
    {
        // Before the first set_time nothing is revealed
        let reveal = self.reveal.flatten();

        for rendered in &mut self.segments {
            let len = rendered.segment.visible_len(reveal, self.full_track);
            if len != rendered.visible_len {
                rendered.visible_len = len;
                surface.update_line(rendered.primitive, &rendered.coords[..len]);
            }
        }
    }
}

fn z_index(active: bool) -> i32 {
    if active {
        ACTIVE_Z_INDEX
    } else {
        INACTIVE_Z_INDEX
    }
}

fn line_style(color: Color, engine_on: bool, active: bool) -> LineStyle {
    LineStyle {
        color: if active { color } else { color.de_emphasized() },
        width: if active {
            ACTIVE_LINE_WIDTH
        } else {
            INACTIVE_LINE_WIDTH
        },
        dash: if engine_on {
            LineDash::Dashed
        } else {
            LineDash::Solid
        },
    }
}

fn marker_style(color: Color, active: bool) -> MarkerStyle {
    MarkerStyle {
        color: if active { color } else { color.de_emphasized() },
        size: if active {
            ACTIVE_MARKER_SIZE
        } else {
            INACTIVE_MARKER_SIZE
        },
    }
}
