//! Track data model - samples, tracks, groups and tasks.
//!
//! Everything in this module is produced by the external loader/analysis
//! collaborators and is immutable once built. Re-synchronizing a group or
//! assigning colors builds new `Track` values that share the original
//! sample storage.

use geo::{coord, Coord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::color::Color;

/// Signed duration in milliseconds.
pub type Millis = i64;

// ============================================================================
// TIME
// ============================================================================

/// A point on a timeline, in Unix milliseconds.
///
/// Arithmetic saturates instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp from Unix milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Returns the Unix milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Clamps into `[lo, hi]`. Callers guarantee `lo <= hi`.
    pub fn clamp_to(self, lo: Timestamp, hi: Timestamp) -> Self {
        Self(self.0.max(lo.0).min(hi.0))
    }
}

impl Add<Millis> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Millis) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl Sub<Millis> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Millis) -> Timestamp {
        Timestamp(self.0.saturating_sub(rhs))
    }
}

impl Sub for Timestamp {
    type Output = Millis;

    fn sub(self, rhs: Timestamp) -> Millis {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Timestamp {
    /// Formats as UTC time of day, `HH:MM:SS.mmm`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms_of_day = self.0.rem_euclid(86_400_000);
        let hours = ms_of_day / 3_600_000;
        let minutes = (ms_of_day / 60_000) % 60;
        let seconds = (ms_of_day / 1000) % 60;
        let millis = ms_of_day % 1000;
        write!(f, "{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Unique identifier for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Creates a new random TrackId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a TrackId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic TrackId from a seed (for simulation and tests).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to tell tracks apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Validation errors for collaborator-supplied track data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("Track {0} has no samples")]
    EmptyTrack(TrackId),

    #[error("Track {track} sample {index} is not after its predecessor")]
    NonMonotonicSamples { track: TrackId, index: usize },

    #[error("Track group is empty")]
    EmptyGroup,

    #[error("Track {0} appears more than once in the group")]
    DuplicateTrack(TrackId),
}

// ============================================================================
// SAMPLES
// ============================================================================

/// A single recorded fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Recording time (track-local clock)
    pub timestamp: Timestamp,

    /// WGS84 latitude in degrees
    pub latitude: f64,

    /// WGS84 longitude in degrees
    pub longitude: f64,

    /// Altitude in meters
    pub altitude: f64,

    /// Heading in degrees clockwise from north
    pub heading: f64,

    /// Engine state at this fix
    pub engine_on: bool,

    /// Values computed by the analysis collaborator, carried opaquely
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl Sample {
    /// Creates an engine-off sample at ground level with heading 0.
    pub fn new(timestamp: Timestamp, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: 0.0,
            heading: 0.0,
            engine_on: false,
            values: BTreeMap::new(),
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    pub fn with_engine(mut self, engine_on: bool) -> Self {
        self.engine_on = engine_on;
        self
    }

    /// Position as a map coordinate (x = longitude, y = latitude).
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        coord! { x: self.longitude, y: self.latitude }
    }
}

/// Interpolated position of a track at some instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    /// Index of the sample at/before the instant (clamped to the track)
    pub index: usize,

    /// Track-local time the position was resolved for
    pub local_time: Timestamp,

    /// Map coordinate (x = longitude, y = latitude)
    pub coord: Coord<f64>,

    /// Altitude in meters
    pub altitude: f64,

    /// Heading in degrees, taken from the sample at/before the instant
    pub heading: f64,
}

// ============================================================================
// TASKS
// ============================================================================

/// Acceptance zone around a turnpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneShape {
    /// Circle of the given radius
    Cylinder { radius_m: f64 },

    /// Line of the given length, perpendicular to the adjacent leg
    Line { length_m: f64 },
}

/// A navigation waypoint with its acceptance zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turnpoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zone: ZoneShape,
}

impl Turnpoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, zone: ZoneShape) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            zone,
        }
    }

    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        coord! { x: self.longitude, y: self.latitude }
    }
}

/// A navigation task: an ordered list of turnpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Task {
    pub turnpoints: Vec<Turnpoint>,
}

impl Task {
    pub fn new(turnpoints: Vec<Turnpoint>) -> Self {
        Self { turnpoints }
    }

    pub fn is_empty(&self) -> bool {
        self.turnpoints.is_empty()
    }
}

// ============================================================================
// TRACK
// ============================================================================

/// One recorded flight.
///
/// Cloning is cheap: samples live behind an `Arc` and are never mutated.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    samples: Arc<[Sample]>,
    /// Shift from track-local time to group time
    offset: Millis,
    task: Option<Arc<Task>>,
    color: Option<Color>,
    /// Takeoff instant found by the analysis collaborator (track-local)
    takeoff: Option<Timestamp>,
}

impl Track {
    /// Creates a track, validating that samples exist and are strictly
    /// increasing in time.
    pub fn new(id: TrackId, samples: Vec<Sample>) -> Result<Self, TrackError> {
        if samples.is_empty() {
            return Err(TrackError::EmptyTrack(id));
        }
        if let Some(index) = samples
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(TrackError::NonMonotonicSamples {
                track: id,
                index: index + 1,
            });
        }

        Ok(Self {
            id,
            samples: samples.into(),
            offset: 0,
            task: None,
            color: None,
            takeoff: None,
        })
    }

    pub fn with_task(mut self, task: Arc<Task>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_takeoff(mut self, takeoff: Timestamp) -> Self {
        self.takeoff = Some(takeoff);
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_offset(mut self, offset: Millis) -> Self {
        self.offset = offset;
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: construction rejects empty tracks.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn offset(&self) -> Millis {
        self.offset
    }

    pub fn task(&self) -> Option<&Arc<Task>> {
        self.task.as_ref()
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn takeoff(&self) -> Option<Timestamp> {
        self.takeoff
    }

    /// First sample time on the track's own clock.
    pub fn recording_start(&self) -> Timestamp {
        self.samples[0].timestamp
    }

    /// Last sample time on the track's own clock.
    pub fn recording_stop(&self) -> Timestamp {
        self.samples[self.samples.len() - 1].timestamp
    }

    /// Recording start on the group timeline.
    pub fn start(&self) -> Timestamp {
        self.recording_start() + self.offset
    }

    /// Recording stop on the group timeline.
    pub fn stop(&self) -> Timestamp {
        self.recording_stop() + self.offset
    }

    /// Converts a group-timeline instant to track-local time.
    pub fn to_local(&self, group_time: Timestamp) -> Timestamp {
        group_time - self.offset
    }

    /// Index of the last sample at or before `local`, clamped to the track.
    pub fn index_at(&self, local: Timestamp) -> usize {
        self.samples
            .partition_point(|s| s.timestamp <= local)
            .saturating_sub(1)
    }

    /// Interpolated position at a group-timeline instant.
    ///
    /// Before the recording the position is the first sample; after it, the
    /// last sample.
    pub fn position_at(&self, group_time: Timestamp) -> TrackPosition {
        let local = self.to_local(group_time);
        let index = self.index_at(local);
        let current = &self.samples[index];

        match self.samples.get(index + 1) {
            Some(next) if local > current.timestamp => {
                let span = (next.timestamp - current.timestamp) as f64;
                let t = (local - current.timestamp) as f64 / span;
                let from = current.coord();
                let to = next.coord();
                TrackPosition {
                    index,
                    local_time: local,
                    coord: from + (to - from) * t,
                    altitude: current.altitude + (next.altitude - current.altitude) * t,
                    heading: current.heading,
                }
            }
            _ => TrackPosition {
                index,
                local_time: local,
                coord: current.coord(),
                altitude: current.altitude,
                heading: current.heading,
            },
        }
    }
}

// ============================================================================
// TRACK GROUP
// ============================================================================

/// Tracks that share one synchronized timeline.
#[derive(Debug, Clone)]
pub struct TrackGroup {
    tracks: Vec<Track>,
    earliest: Timestamp,
    latest: Timestamp,
}

impl TrackGroup {
    /// Creates a group. Rejects empty sets and duplicate ids.
    pub fn new(tracks: Vec<Track>) -> Result<Self, TrackError> {
        if tracks.is_empty() {
            return Err(TrackError::EmptyGroup);
        }
        let mut seen = HashSet::new();
        for track in &tracks {
            if !seen.insert(track.id()) {
                return Err(TrackError::DuplicateTrack(track.id()));
            }
        }
        Ok(Self::from_validated(tracks))
    }

    fn from_validated(tracks: Vec<Track>) -> Self {
        let earliest = tracks.iter().map(Track::start).min().unwrap_or_default();
        let latest = tracks.iter().map(Track::stop).max().unwrap_or_default();
        Self {
            tracks,
            earliest,
            latest,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false: construction rejects empty groups.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.get(id).is_some()
    }

    /// Id of the first track in load order.
    pub fn first_id(&self) -> Option<TrackId> {
        self.tracks.first().map(Track::id)
    }

    /// Earliest synchronized start across all tracks.
    pub fn earliest(&self) -> Timestamp {
        self.earliest
    }

    /// Latest synchronized stop across all tracks.
    pub fn latest(&self) -> Timestamp {
        self.latest
    }

    /// Clamps an instant into `[earliest, latest]`.
    pub fn clamp(&self, t: Timestamp) -> Timestamp {
        t.clamp_to(self.earliest, self.latest)
    }

    /// Builds a new group with per-track offsets replaced.
    ///
    /// Tracks missing from `offsets` get offset 0.
    pub fn synchronized(&self, offsets: &BTreeMap<TrackId, Millis>) -> TrackGroup {
        self.map_tracks(|track| {
            let offset = offsets.get(&track.id()).copied().unwrap_or(0);
            track.clone().with_offset(offset)
        })
    }

    /// Builds a new group by transforming every track (ids must be kept).
    pub fn map_tracks<F>(&self, f: F) -> TrackGroup
    where
        F: FnMut(&Track) -> Track,
    {
        Self::from_validated(self.tracks.iter().map(f).collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// 2023-11-15 10:00:00 UTC, in Unix ms.
    pub const TEN_AM: i64 = 1_700_042_400_000;

    pub fn minutes(m: i64) -> Millis {
        m * 60_000
    }

    /// A straight eastbound track with one sample per `step_ms`, engine off.
    pub fn straight_track(seed: u64, start: Timestamp, count: usize, step_ms: i64) -> Track {
        let samples = (0..count)
            .map(|i| {
                Sample::new(start + i as i64 * step_ms, 46.0, 7.0 + i as f64 * 0.001)
                    .with_altitude(1000.0 + i as f64)
                    .with_heading(90.0)
            })
            .collect();
        Track::new(TrackId::from_seed(seed), samples).expect("valid fixture track")
    }
}
