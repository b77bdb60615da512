//! Playback scenarios for deterministic simulation.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// TV-001: two overlapping flights on the real-time timeline
    RealTimePair,

    /// TV-002: engine run split into three segments
    EngineRun,

    /// TV-003: play to the end, then replay from the start
    ReplayFromStart,

    /// TV-004: camera follows the active marker out of the usable area
    FollowPan,

    /// TV-005: switch synchronization method while following a track
    SyncSwitch,

    /// TV-006: destroy mid-playback, then keep dispatching
    Teardown,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::RealTimePair,
            ScenarioId::EngineRun,
            ScenarioId::ReplayFromStart,
            ScenarioId::FollowPan,
            ScenarioId::SyncSwitch,
            ScenarioId::Teardown,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::RealTimePair => "RealTimePair",
            ScenarioId::EngineRun => "EngineRun",
            ScenarioId::ReplayFromStart => "ReplayFromStart",
            ScenarioId::FollowPan => "FollowPan",
            ScenarioId::SyncSwitch => "SyncSwitch",
            ScenarioId::Teardown => "Teardown",
        }
    }

    /// Returns the scenario description.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::RealTimePair => {
                "Flights 10:00-10:30 and 10:05-10:40 share one timeline; markers clamp and interpolate"
            }
            ScenarioId::EngineRun => "Engine on for samples 100-150 of 500 renders as off/on/off",
            ScenarioId::ReplayFromStart => "Reaching the end stops once; play again restarts at the earliest instant",
            ScenarioId::FollowPan => "Markers inside the usable area leave the camera alone; outside, one pan",
            ScenarioId::SyncSwitch => "Changing sync method keeps the followed track and clamps the active time",
            ScenarioId::Teardown => "Operations after destroy succeed without touching the surface",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "real_time_pair" | "realtimepair" | "tv-001" => Ok(ScenarioId::RealTimePair),
            "engine_run" | "enginerun" | "tv-002" => Ok(ScenarioId::EngineRun),
            "replay_from_start" | "replayfromstart" | "tv-003" => Ok(ScenarioId::ReplayFromStart),
            "follow_pan" | "followpan" | "tv-004" => Ok(ScenarioId::FollowPan),
            "sync_switch" | "syncswitch" | "tv-005" => Ok(ScenarioId::SyncSwitch),
            "teardown" | "tv-006" => Ok(ScenarioId::Teardown),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
