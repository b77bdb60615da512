//! Track synchronization - aligning independent recordings onto one timeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::track::{Millis, Timestamp, Track, TrackGroup, TrackId};

/// Policy for aligning per-track recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizationMethod {
    /// Wall-clock time; no shift
    #[default]
    RealTime,
    /// Every recording starts together with the reference track
    RecordingStart,
    /// Every takeoff coincides with the reference track's takeoff
    Takeoff,
}

impl fmt::Display for SynchronizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynchronizationMethod::RealTime => "real-time",
            SynchronizationMethod::RecordingStart => "recording-start",
            SynchronizationMethod::Takeoff => "takeoff",
        };
        f.write_str(name)
    }
}

/// Computes per-track offsets (track-local time + offset = group time).
pub trait Synchronizer: Send + Sync {
    /// `reference` is the track the others are aligned to; when absent or
    /// unknown the group's first track is used.
    fn offsets(
        &self,
        group: &TrackGroup,
        method: SynchronizationMethod,
        reference: Option<TrackId>,
    ) -> BTreeMap<TrackId, Millis>;
}

/// Built-in alignment using recording starts and takeoff times.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSynchronizer;

impl StandardSynchronizer {
    fn anchor(track: &Track, method: SynchronizationMethod) -> Timestamp {
        match method {
            SynchronizationMethod::Takeoff => {
                track.takeoff().unwrap_or_else(|| track.recording_start())
            }
            _ => track.recording_start(),
        }
    }
}

impl Synchronizer for StandardSynchronizer {
    fn offsets(
        &self,
        group: &TrackGroup,
        method: SynchronizationMethod,
        reference: Option<TrackId>,
    ) -> BTreeMap<TrackId, Millis> {
        if method == SynchronizationMethod::RealTime {
            return group.tracks().iter().map(|t| (t.id(), 0)).collect();
        }

        let reference = reference
            .and_then(|id| group.get(id))
            .or_else(|| group.tracks().first());
        let Some(reference) = reference else {
            return BTreeMap::new();
        };
        let target = Self::anchor(reference, method);

        group
            .tracks()
            .iter()
            .map(|t| (t.id(), target - Self::anchor(t, method)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::fixtures::*;

    fn pair() -> TrackGroup {
        let start = Timestamp(TEN_AM);
        let a = straight_track(1, start, 31, minutes(1)).with_takeoff(start + minutes(10));
        let b = straight_track(2, start + minutes(5), 36, minutes(1));
        TrackGroup::new(vec![a, b]).unwrap()
    }

    #[test]
    fn test_real_time_is_zero() {
        let group = pair();
        let offsets = StandardSynchronizer.offsets(&group, SynchronizationMethod::RealTime, None);
        assert!(offsets.values().all(|&o| o == 0));
        assert_eq!(offsets.len(), 2);
    }

    #[test]
    fn test_recording_start_aligns_to_reference() {
        let group = pair();
        let b = group.tracks()[1].id();
        let offsets =
            StandardSynchronizer.offsets(&group, SynchronizationMethod::RecordingStart, Some(b));
        let synced = group.synchronized(&offsets);

        assert_eq!(synced.tracks()[0].start(), synced.tracks()[1].start());
        // The reference keeps its own clock
        assert_eq!(offsets[&b], 0);
        assert_eq!(synced.earliest(), Timestamp(TEN_AM) + minutes(5));
    }

    #[test]
    fn test_takeoff_falls_back_to_recording_start() {
        let group = pair();
        let a = group.tracks()[0].id();
        let b = group.tracks()[1].id();
        let offsets = StandardSynchronizer.offsets(&group, SynchronizationMethod::Takeoff, Some(a));

        // A took off at 10:10, B has no takeoff so its start (10:05) is used
        assert_eq!(offsets[&a], 0);
        assert_eq!(offsets[&b], minutes(5));
    }

    #[test]
    fn test_unknown_reference_uses_first_track() {
        let group = pair();
        let offsets = StandardSynchronizer.offsets(
            &group,
            SynchronizationMethod::RecordingStart,
            Some(TrackId::from_seed(99)),
        );
        assert_eq!(offsets[&group.tracks()[0].id()], 0);
        assert_eq!(offsets[&group.tracks()[1].id()], -minutes(5));
    }
}
