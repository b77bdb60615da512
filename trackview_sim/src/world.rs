//! SimWorld - The simulation harness container.

use crate::context::SimFrameClock;
use crate::error::SimError;
use crate::generator::{FlightGenerator, GeneratorConfig};

use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use trackview_core::{
    HeadlessSurface, PlaybackAction, PlaybackSession, SessionConfig, TrackGroup,
};
use trackview_env::{FrameClock, FrameConfig};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of flights to generate
    pub num_tracks: usize,

    /// Recording length of each generated flight in seconds
    pub duration_secs: f64,

    /// Time between generated samples in milliseconds
    pub sample_interval_ms: i64,

    /// Animation frames per second of virtual time
    pub frame_rate_hz: u32,

    /// Playback speed multiplier
    pub speed: f64,

    /// Headless viewport width in pixels
    pub viewport_width: f64,

    /// Headless viewport height in pixels
    pub viewport_height: f64,

    /// Session settings (playback, viewport, palette)
    pub session: SessionConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_tracks: 3,
            duration_secs: 1800.0,
            sample_interval_ms: 5000,
            frame_rate_hz: 30,
            speed: 60.0,
            viewport_width: 1280.0,
            viewport_height: 800.0,
            session: SessionConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            num_tracks: self.num_tracks,
            duration_secs: self.duration_secs,
            sample_interval_ms: self.sample_interval_ms,
            ..GeneratorConfig::default()
        }
    }

    /// Session config with the simulated frame rate applied.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frame: FrameConfig {
                frames_per_second: self.frame_rate_hz,
            },
            ..self.session.clone()
        }
    }
}

/// The SimWorld - a playback session on a headless surface, driven by a
/// virtual clock.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared virtual frame clock
    pub clock: Arc<SimFrameClock>,

    /// Session under test
    pub session: PlaybackSession<HeadlessSurface>,

    /// Seeded flight source
    generator: FlightGenerator,

    /// Frames stepped so far
    frames: u64,
}

impl SimWorld {
    /// Creates a world with nothing loaded.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let session_config = config.session_config();
        let clock = SimFrameClock::shared(session_config.frame);
        let surface = HeadlessSurface::new(config.viewport_width, config.viewport_height);
        let generator = FlightGenerator::new(config.seed, config.generator_config())?;

        info!(seed = config.seed, "SimWorld created");
        Ok(Self {
            session: PlaybackSession::new(surface, session_config),
            config,
            clock,
            generator,
            frames: 0,
        })
    }

    pub fn generator_mut(&mut self) -> &mut FlightGenerator {
        &mut self.generator
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The headless surface, until the session is destroyed.
    pub fn surface(&self) -> Option<&HeadlessSurface> {
        self.session.viewport().surface()
    }

    pub fn surface_mut(&mut self) -> Option<&mut HeadlessSurface> {
        self.session.viewport_mut().surface_mut()
    }

    /// Generates a group from the seed and loads it.
    pub fn load_generated(&mut self) -> Result<TrackGroup, SimError> {
        let group = self.generator.generate_group()?;
        self.load(group.clone())?;
        Ok(group)
    }

    pub fn load(&mut self, group: TrackGroup) -> Result<(), SimError> {
        self.session.load(group)?;
        self.session
            .dispatch(PlaybackAction::SetSpeed(self.config.speed))?;
        Ok(())
    }

    /// Starts playback if it is paused.
    pub fn play(&mut self) -> Result<(), SimError> {
        if !self.session.state().is_playing {
            self.session.dispatch(PlaybackAction::TogglePlay)?;
        }
        // Baseline frame so the first step advances time
        self.session.on_frame(self.clock.now())?;
        Ok(())
    }

    /// Advances virtual time by one frame and runs it.
    pub fn step(&mut self) -> Result<ControlFlow<()>, SimError> {
        self.clock.advance_time(self.clock.frame_interval());
        self.frames += 1;
        Ok(self.session.on_frame(self.clock.now())?)
    }

    /// Steps until playback stops or `max_frames` have run, calling
    /// `observe` after every frame. Returns the frames stepped.
    pub fn run_until_stopped<F>(&mut self, max_frames: u64, mut observe: F) -> Result<u64, SimError>
    where
        F: FnMut(&mut SimWorld) -> Result<(), SimError>,
    {
        let mut stepped = 0;
        while stepped < max_frames {
            let flow = self.step()?;
            stepped += 1;
            observe(self)?;
            if flow.is_break() {
                break;
            }
        }
        debug!(stepped, total = self.frames, "Run finished");
        Ok(stepped)
    }

    /// Drives the session through the async frame loop until it stops.
    pub async fn run(&mut self) -> Result<(), SimError> {
        let clock = Arc::clone(&self.clock);
        let start = clock.time_ns();
        self.session.run(clock.as_ref()).await?;
        let elapsed = clock.time_ns() - start;
        self.frames += elapsed / clock.frame_interval().as_nanos().max(1) as u64;
        Ok(())
    }
}
