//! JSON exporter for playback traces.
//!
//! Records what a host would draw on every frame: where each marker sits
//! and how much of each path is revealed.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use trackview_core::{MapSurface, PlaybackSession, Timestamp, TrackRenderer};

/// A single frame of playback data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual clock time in seconds
    pub time_sec: f64,

    /// Group-timeline instant shown on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_timestamp: Option<Timestamp>,

    pub is_playing: bool,

    /// One entry per rendered track, in load order
    pub markers: Vec<MarkerFrame>,

    /// Notable transitions (end reached, sync switched, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

/// Marker and reveal state of one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerFrame {
    pub track_id: String,
    pub lon: f64,
    pub lat: f64,
    pub altitude: f64,
    pub heading: f64,
    /// Points of the path currently drawn
    pub visible_points: usize,
    pub active: bool,
}

impl MarkerFrame {
    pub fn from_renderer(renderer: &TrackRenderer) -> Self {
        let position = renderer.marker_position();
        Self {
            track_id: renderer.track_id().to_string(),
            lon: position.coord.x,
            lat: position.coord.y,
            altitude: position.altitude,
            heading: position.heading,
            visible_points: renderer.visible_path().len(),
            active: renderer.is_active(),
        }
    }
}

impl SimFrame {
    /// Captures the session as it stands.
    pub fn capture<S: MapSurface>(time_sec: f64, session: &PlaybackSession<S>) -> Self {
        let viewport = session.viewport();
        let markers = viewport
            .track_ids()
            .into_iter()
            .filter_map(|id| viewport.renderer(id))
            .map(MarkerFrame::from_renderer)
            .collect();
        let state = session.state();

        Self {
            time_sec,
            active_timestamp: state.active_timestamp,
            is_playing: state.is_playing,
            markers,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }
}

/// Complete playback export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds of virtual time
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{SimConfig, SimWorld};

    #[test]
    fn test_capture_and_write() {
        let config = SimConfig {
            num_tracks: 2,
            duration_secs: 120.0,
            sample_interval_ms: 1000,
            ..SimConfig::default()
        };
        let mut world = SimWorld::new(config).unwrap();
        world.load_generated().unwrap();

        let mut export = SimExport::new("capture", 42);
        export.add_frame(SimFrame::capture(0.0, &world.session).with_event("loaded"));
        world.play().unwrap();
        world.step().unwrap();
        export.add_frame(SimFrame::capture(1.0 / 30.0, &world.session));
        export.finalize(true);

        let first = &export.frames[0];
        assert_eq!(first.markers.len(), 2);
        assert_eq!(first.markers.iter().filter(|m| m.active).count(), 1);
        // Only the earliest track has started at load time
        assert_eq!(first.markers[0].visible_points, 1);

        let path = std::env::temp_dir().join("trackview_sim_export_test.json");
        export.write_to_file(&path).unwrap();
        let parsed: SimExport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.frames.len(), 2);
        assert!(parsed.passed);
        std::fs::remove_file(&path).ok();
    }
}
