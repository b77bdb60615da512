//! TrackView Deterministic Playback Simulation
//!
//! Runs the whole playback engine (time controller, renderers, camera)
//! against a headless map surface on a virtual clock, so every frame of a
//! multi-track replay is reproducible from a single 64-bit seed.
//!
//! - **Time**: the frame clock advances only when a frame is stepped
//! - **Flights**: synthetic tracks from a seeded ChaCha random walk
//! - **Surface**: an in-memory Web Mercator map that records every call
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │  ┌──────────────────┐      ┌───────────────────────────┐ │
//! │  │  SimFrameClock   │─────►│     PlaybackSession       │ │
//! │  │  (virtual time)  │ tick │  TimeController           │ │
//! │  └──────────────────┘      │  ViewportController       │ │
//! │  ┌──────────────────┐ load │    └─► HeadlessSurface    │ │
//! │  │ FlightGenerator  │─────►│                           │ │
//! │  └──────────────────┘      └───────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_sim::{SimConfig, SimWorld};
//!
//! let mut world = SimWorld::new(SimConfig { seed: 42, ..Default::default() })?;
//! world.load_generated()?;
//! world.play()?;
//! world.run_until_stopped(10_000, |_| Ok(()))?;
//! ```

mod context;
mod error;
mod exporter;
mod generator;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimFrameClock;
pub use error::SimError;
pub use exporter::{MarkerFrame, SimExport, SimFrame};
pub use generator::{task_along, FlightGenerator, GeneratorConfig, DEFAULT_EPOCH_MS};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld};
