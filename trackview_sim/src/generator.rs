//! Seeded synthetic flights.
//!
//! Every flight is a random walk: heading and climb rate drift with normal
//! noise while the aircraft moves at a constant ground speed along
//! great-circle steps. The same seed always produces the same group.

use crate::error::SimError;
use geo::{HaversineDestination, Point};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;
use trackview_core::{Sample, Task, Timestamp, Track, TrackGroup, TrackId, Turnpoint, ZoneShape};

/// 2023-11-15 10:00:00 UTC
pub const DEFAULT_EPOCH_MS: i64 = 1_700_042_400_000;

/// Parameters for synthetic flights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Flights per generated group (default: 3)
    pub num_tracks: usize,

    /// Recording length of each flight in seconds (default: 1800)
    pub duration_secs: f64,

    /// Time between samples in milliseconds (default: 5000)
    pub sample_interval_ms: i64,

    /// Latest recording start after the epoch, in seconds (default: 600)
    pub start_stagger_secs: f64,

    /// Group-time of the earliest possible recording start (default: 10:00 UTC)
    pub epoch_ms: i64,

    /// Launch latitude in degrees (default: 46.0)
    pub origin_lat: f64,

    /// Launch longitude in degrees (default: 7.0)
    pub origin_lon: f64,

    /// Ground speed in m/s (default: 12.0)
    pub ground_speed_mps: f64,

    /// Heading drift per sample, standard deviation in degrees (default: 8.0)
    pub heading_noise_deg: f64,

    /// Climb drift per sample, standard deviation in m/s (default: 0.8)
    pub climb_noise_mps: f64,

    /// Chance that a flight contains one engine run (default: 0.5)
    pub engine_run_probability: f64,

    /// Attach a three-turnpoint task to the first flight (default: true)
    pub with_task: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_tracks: 3,
            duration_secs: 1800.0,
            sample_interval_ms: 5000,
            start_stagger_secs: 600.0,
            epoch_ms: DEFAULT_EPOCH_MS,
            origin_lat: 46.0,
            origin_lon: 7.0,
            ground_speed_mps: 12.0,
            heading_noise_deg: 8.0,
            climb_noise_mps: 0.8,
            engine_run_probability: 0.5,
            with_task: true,
        }
    }
}

impl GeneratorConfig {
    /// Samples per flight, including both ends.
    pub fn samples_per_track(&self) -> usize {
        let span_ms = (self.duration_secs * 1000.0) as i64;
        (span_ms / self.sample_interval_ms.max(1)) as usize + 1
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.num_tracks == 0 {
            return Err(SimError::config("num_tracks must be at least 1"));
        }
        if self.sample_interval_ms <= 0 {
            return Err(SimError::config("sample_interval_ms must be positive"));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(SimError::config("duration_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.engine_run_probability) {
            return Err(SimError::config("engine_run_probability must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Deterministic flight source.
pub struct FlightGenerator {
    config: GeneratorConfig,
    seed: u64,
    rng: ChaCha8Rng,
    heading_noise: Normal<f64>,
    climb_noise: Normal<f64>,
    generated: u64,
}

impl FlightGenerator {
    pub fn new(seed: u64, config: GeneratorConfig) -> Result<Self, SimError> {
        config.validate()?;
        let heading_noise = Normal::new(0.0, config.heading_noise_deg)
            .map_err(|e| SimError::config(format!("heading_noise_deg: {e}")))?;
        let climb_noise = Normal::new(0.0, config.climb_noise_mps)
            .map_err(|e| SimError::config(format!("climb_noise_mps: {e}")))?;

        Ok(Self {
            config,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            heading_noise,
            climb_noise,
            generated: 0,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Allocates a track id unique to this generator.
    pub fn next_id(&mut self) -> TrackId {
        let id = TrackId::from_seed(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ self.generated);
        self.generated += 1;
        id
    }

    /// Generates a full group per the config.
    ///
    /// The first flight starts at the epoch; the rest start at a random
    /// offset within the stagger window.
    pub fn generate_group(&mut self) -> Result<TrackGroup, SimError> {
        let count = self.config.samples_per_track();
        let stagger_ms = (self.config.start_stagger_secs.max(0.0) * 1000.0) as i64;
        let epoch = Timestamp(self.config.epoch_ms);

        let mut tracks = Vec::with_capacity(self.config.num_tracks);
        for index in 0..self.config.num_tracks {
            let start = if index == 0 || stagger_ms == 0 {
                epoch
            } else {
                epoch + self.rng.gen_range(0..=stagger_ms)
            };

            let engine = if self.rng.gen_bool(self.config.engine_run_probability) {
                Some(self.random_engine_window(count))
            } else {
                None
            };

            let id = self.next_id();
            let mut track = self.flight(id, start, count, engine)?;
            if index == 0 && self.config.with_task {
                let task = Arc::new(task_along(&track));
                track = track.with_task(task);
            }
            tracks.push(track);
        }

        debug!(seed = self.seed, tracks = tracks.len(), "Generated group");
        Ok(TrackGroup::new(tracks)?)
    }

    /// Generates one flight of `count` samples starting at `start`.
    ///
    /// Samples whose index falls in `engine` have the engine running. The
    /// takeoff is marked a few samples after the recording start.
    pub fn flight(
        &mut self,
        id: TrackId,
        start: Timestamp,
        count: usize,
        engine: Option<RangeInclusive<usize>>,
    ) -> Result<Track, SimError> {
        let step_ms = self.config.sample_interval_ms;
        let step_m = self.config.ground_speed_mps * step_ms as f64 / 1000.0;
        let climb_scale = step_ms as f64 / 1000.0;

        // Spread launches so flights don't overlap exactly
        let mut position = Point::new(
            self.config.origin_lon + self.rng.gen_range(-0.01..0.01),
            self.config.origin_lat + self.rng.gen_range(-0.01..0.01),
        );
        let mut heading: f64 = self.rng.gen_range(0.0..360.0);
        let mut altitude: f64 = self.rng.gen_range(800.0..1600.0);

        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            let engine_on = engine.as_ref().is_some_and(|range| range.contains(&i));
            samples.push(
                Sample::new(start + i as i64 * step_ms, position.y(), position.x())
                    .with_altitude(altitude)
                    .with_heading(heading)
                    .with_engine(engine_on),
            );

            heading = (heading + self.heading_noise.sample(&mut self.rng)).rem_euclid(360.0);
            let climb = if engine_on { 2.0 } else { -0.3 };
            altitude = (altitude + (climb + self.climb_noise.sample(&mut self.rng)) * climb_scale).max(0.0);
            position = position.haversine_destination(heading, step_m);
        }

        let track = Track::new(id, samples)?;
        let takeoff_index = self.rng.gen_range(0..=(track.len() - 1).min(5));
        let takeoff = track.samples()[takeoff_index].timestamp;
        Ok(track.with_takeoff(takeoff))
    }

    /// A window covering 5-15% of the flight somewhere in its middle.
    fn random_engine_window(&mut self, count: usize) -> RangeInclusive<usize> {
        let len = (count as f64 * self.rng.gen_range(0.05..0.15)).max(1.0) as usize;
        let lo = count / 5;
        let hi = (count * 3 / 5).max(lo);
        let first = self.rng.gen_range(lo..=hi);
        first..=(first + len).min(count.saturating_sub(1))
    }
}

/// Start, midpoint and goal of `track` as a task.
pub fn task_along(track: &Track) -> Task {
    let samples = track.samples();
    let mid = &samples[samples.len() / 2];
    let first = &samples[0];
    let last = &samples[samples.len() - 1];
    Task::new(vec![
        Turnpoint::new("Start", first.latitude, first.longitude, ZoneShape::Cylinder { radius_m: 400.0 }),
        Turnpoint::new("TP1", mid.latitude, mid.longitude, ZoneShape::Cylinder { radius_m: 1000.0 }),
        Turnpoint::new("Goal", last.latitude, last.longitude, ZoneShape::Line { length_m: 400.0 }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{HaversineLength, LineString};
    use proptest::prelude::*;
    use trackview_core::build_segments;

    fn small() -> GeneratorConfig {
        GeneratorConfig {
            num_tracks: 4,
            duration_secs: 600.0,
            sample_interval_ms: 2000,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_group() {
        let a = FlightGenerator::new(7, small()).unwrap().generate_group().unwrap();
        let b = FlightGenerator::new(7, small()).unwrap().generate_group().unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.tracks().iter().zip(b.tracks()) {
            assert_eq!(x.id(), y.id());
            assert_eq!(x.samples(), y.samples());
            assert_eq!(x.takeoff(), y.takeoff());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = FlightGenerator::new(1, small()).unwrap().generate_group().unwrap();
        let b = FlightGenerator::new(2, small()).unwrap().generate_group().unwrap();
        assert_ne!(a.tracks()[0].samples(), b.tracks()[0].samples());
    }

    #[test]
    fn test_group_shape() {
        let config = small();
        let group = FlightGenerator::new(3, config.clone()).unwrap().generate_group().unwrap();

        assert_eq!(group.len(), config.num_tracks);
        assert_eq!(group.earliest(), Timestamp(config.epoch_ms));
        for track in group.tracks() {
            assert_eq!(track.len(), config.samples_per_track());
            let offset = track.recording_start() - Timestamp(config.epoch_ms);
            assert!((0..=600_000).contains(&offset));
            assert!(track.takeoff().unwrap() >= track.recording_start());
        }
        assert!(group.tracks()[0].task().is_some());
        assert!(group.tracks()[1].task().is_none());
    }

    #[test]
    fn test_flight_moves_at_ground_speed() {
        let mut generator = FlightGenerator::new(9, small()).unwrap();
        let id = generator.next_id();
        let track = generator.flight(id, Timestamp(0), 101, None).unwrap();

        let line: LineString<f64> = track.samples().iter().map(|s| s.coord()).collect();
        // 100 steps of 12 m/s * 2 s
        approx::assert_relative_eq!(line.haversine_length(), 2400.0, max_relative = 0.01);
        assert!(track.samples().iter().all(|s| s.altitude >= 0.0));
    }

    #[test]
    fn test_engine_window_produces_three_segments() {
        let mut generator = FlightGenerator::new(11, small()).unwrap();
        let id = generator.next_id();
        let track = generator.flight(id, Timestamp(0), 500, Some(100..=150)).unwrap();

        let segments = build_segments(track.samples());
        assert_eq!(segments.len(), 3);
        assert!(segments[1].engine_on);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GeneratorConfig {
            sample_interval_ms: 0,
            ..GeneratorConfig::default()
        };
        assert!(matches!(FlightGenerator::new(1, config), Err(SimError::Config(_))));

        let config = GeneratorConfig {
            heading_noise_deg: f64::NAN,
            ..GeneratorConfig::default()
        };
        assert!(FlightGenerator::new(1, config).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_any_seed_is_reproducible(seed in any::<u64>(), tracks in 1usize..4) {
            let config = GeneratorConfig {
                num_tracks: tracks,
                duration_secs: 120.0,
                ..small()
            };
            let a = FlightGenerator::new(seed, config.clone()).unwrap().generate_group().unwrap();
            let b = FlightGenerator::new(seed, config).unwrap().generate_group().unwrap();

            prop_assert_eq!(a.len(), tracks);
            for (x, y) in a.tracks().iter().zip(b.tracks()) {
                prop_assert_eq!(x.id(), y.id());
                prop_assert_eq!(x.samples(), y.samples());
                prop_assert_eq!(x.takeoff(), y.takeoff());
            }
        }
    }
}
