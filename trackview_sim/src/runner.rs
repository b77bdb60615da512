//! Scenario runner - executes playback scenarios against a headless surface.

use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::generator::DEFAULT_EPOCH_MS;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use std::time::Duration;
use tracing::{debug, info, warn};
use trackview_core::viewport::{effective_padding, usable_area};
use trackview_core::{
    MapSurface, PlaybackAction, SessionError, SurfaceCall, SynchronizationMethod, Timestamp,
    Track, TrackError, TrackGroup,
};
use trackview_env::FrameClock;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total frames executed
    pub total_frames: u64,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Tracks loaded at the end
    pub final_track_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// Frames stepped
    pub frames: u64,

    /// Camera pans (follow)
    pub pans: u64,

    /// Camera fits (load, activation)
    pub fly_tos: u64,

    /// Zoom steps
    pub zooms: u64,

    /// Line primitive geometry updates
    pub line_updates: u64,

    /// Marker moves
    pub marker_moves: u64,

    /// Times playback stopped at the end of the timeline
    pub end_transitions: u64,
}

impl ScenarioMetrics {
    /// Counts the calls a surface has recorded.
    pub fn tally(&mut self, calls: &[SurfaceCall]) {
        for call in calls {
            match call {
                SurfaceCall::PanTo { .. } => self.pans += 1,
                SurfaceCall::FlyToBounds { .. } => self.fly_tos += 1,
                SurfaceCall::ZoomBy { .. } => self.zooms += 1,
                SurfaceCall::UpdateLine { .. } => self.line_updates += 1,
                SurfaceCall::MoveMarker { .. } => self.marker_moves += 1,
                _ => {}
            }
        }
    }
}

/// Why a scenario stopped early.
#[derive(Debug)]
enum Failure {
    Check(String),
    Sim(SimError),
}

impl From<SimError> for Failure {
    fn from(e: SimError) -> Self {
        Failure::Sim(e)
    }
}

impl From<SessionError> for Failure {
    fn from(e: SessionError) -> Self {
        Failure::Sim(e.into())
    }
}

impl From<TrackError> for Failure {
    fn from(e: TrackError) -> Self {
        Failure::Sim(e.into())
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Check(msg) => write!(f, "{}", msg),
            Failure::Sim(e) => write!(f, "{}", e),
        }
    }
}

fn ensure(condition: bool, msg: impl FnOnce() -> String) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::Check(msg()))
    }
}

/// One scenario in progress.
struct Run {
    world: SimWorld,
    metrics: ScenarioMetrics,
    export: Option<SimExport>,
}

impl Run {
    /// Moves the surface's recorded calls into the metrics.
    fn tally(&mut self) -> Vec<SurfaceCall> {
        let Some(surface) = self.world.surface_mut() else {
            return Vec::new();
        };
        let calls = surface.calls().to_vec();
        surface.clear_calls();
        self.metrics.tally(&calls);
        calls
    }

    fn capture(&mut self, event: Option<&str>) {
        if let Some(export) = &mut self.export {
            let time_sec = self.world.clock.now().as_secs_f64();
            let mut frame = SimFrame::capture(time_sec, &self.world.session);
            if let Some(event) = event {
                frame = frame.with_event(event);
            }
            export.add_frame(frame);
        }
    }

    /// Steps one frame, returning the calls it produced and whether
    /// playback is still running.
    fn step(&mut self) -> Result<(Vec<SurfaceCall>, bool), Failure> {
        let was_playing = self.world.session.state().is_playing;
        let running = self.world.step()?.is_continue();
        self.metrics.frames += 1;

        let ended = was_playing && !self.world.session.state().is_playing;
        if ended {
            self.metrics.end_transitions += 1;
        }
        let calls = self.tally();
        self.capture(ended.then_some("end"));
        Ok((calls, running))
    }

    /// Plays until playback stops, failing if `max_frames` run out first.
    fn play_to_end(&mut self, max_frames: u64) -> Result<(), Failure> {
        self.world.play()?;
        self.tally();
        for _ in 0..max_frames {
            let (_, running) = self.step()?;
            if !running {
                return Ok(());
            }
        }
        Err(Failure::Check(format!(
            "playback still running after {} frames",
            max_frames
        )))
    }
}

/// Runs playback scenarios.
pub struct ScenarioRunner {
    /// World configuration shared by every scenario
    config: SimConfig,

    /// Maximum virtual duration per scenario in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            max_duration_secs: 600.0,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn max_frames(&self) -> u64 {
        (self.max_duration_secs.max(0.0) * self.config.frame_rate_hz.max(1) as f64) as u64
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario, recording every frame for export.
    pub fn record(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.config.seed));
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, record: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let mut config = self.config.clone();
        if scenario == ScenarioId::SyncSwitch {
            config.num_tracks = config.num_tracks.max(2);
        }

        let mut run = match SimWorld::new(config) {
            Ok(world) => Run {
                world,
                metrics: ScenarioMetrics::default(),
                export: record.then(|| SimExport::new(scenario.name(), self.config.seed)),
            },
            Err(e) => {
                warn!("Scenario {} could not start: {}", scenario.name(), e);
                let result = ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: false,
                    total_frames: 0,
                    final_time_secs: 0.0,
                    final_track_count: 0,
                    failure_reason: Some(e.to_string()),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, None);
            }
        };

        let outcome = match scenario {
            ScenarioId::RealTimePair => self.run_real_time_pair(&mut run),
            ScenarioId::EngineRun => self.run_engine_run(&mut run),
            ScenarioId::ReplayFromStart => self.run_replay_from_start(&mut run),
            ScenarioId::FollowPan => self.run_follow_pan(&mut run),
            ScenarioId::SyncSwitch => self.run_sync_switch(&mut run),
            ScenarioId::Teardown => self.run_teardown(&mut run),
        };
        run.tally();

        let failure_reason = outcome.err().map(|f| f.to_string());
        let passed = failure_reason.is_none();
        if passed {
            info!("✅ {} PASSED ({} frames)", scenario.name(), run.metrics.frames);
        } else {
            warn!(
                "❌ {} FAILED: {}",
                scenario.name(),
                failure_reason.as_deref().unwrap_or_default()
            );
        }

        let mut export = run.export.take();
        if let Some(export) = &mut export {
            export.finalize(passed);
        }

        let result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed,
            total_frames: run.metrics.frames,
            final_time_secs: run.world.clock.now().as_secs_f64(),
            final_track_count: run.world.session.viewport().len(),
            failure_reason,
            metrics: run.metrics,
        };
        (result, export)
    }

    /// Builds a flight lasting `minutes` from `start` at the configured
    /// sample interval.
    fn flight(&self, run: &mut Run, start: Timestamp, minutes: i64) -> Result<Track, Failure> {
        let interval = run.world.config.sample_interval_ms.max(1);
        let count = (minutes * 60_000 / interval) as usize + 1;
        let generator = run.world.generator_mut();
        let id = generator.next_id();
        Ok(generator.flight(id, start, count, None)?)
    }

    /// TV-001: A 10:00-10:30 and B 10:05-10:40 on the real-time timeline.
    fn run_real_time_pair(&self, run: &mut Run) -> Result<(), Failure> {
        let ten = Timestamp(DEFAULT_EPOCH_MS);
        let a = self.flight(run, ten, 30)?;
        let b = self.flight(run, ten + 5 * 60_000, 35)?;
        let group = TrackGroup::new(vec![a.clone(), b.clone()])?;

        run.world.load(group)?;
        run.tally();
        run.capture(Some("loaded"));

        let loaded = run
            .world
            .session
            .group()
            .ok_or_else(|| Failure::Check("no group after load".into()))?;
        ensure(loaded.earliest() == a.start(), || {
            format!("earliest {} != A start {}", loaded.earliest(), a.start())
        })?;
        ensure(loaded.latest() == b.stop(), || {
            format!("latest {} != B stop {}", loaded.latest(), b.stop())
        })?;

        let probe = ten + 35 * 60_000;
        run.world
            .session
            .dispatch(PlaybackAction::SetActiveTimestamp(probe))?;
        run.tally();

        let viewport = run.world.session.viewport();
        let marker = |track: &Track| {
            viewport
                .renderer(track.id())
                .map(|r| r.marker_position().coord)
                .ok_or_else(|| Failure::Check(format!("track {} not rendered", track.id())))
        };
        let a_last = a.samples()[a.len() - 1].coord();
        ensure(marker(&a)? == a_last, || {
            "A's marker should rest on its last sample after A stops".into()
        })?;
        ensure(marker(&b)? == b.position_at(probe).coord, || {
            "B's marker should be interpolated at the probe time".into()
        })?;
        ensure(
            viewport.renderer(a.id()).map(|r| r.visible_path().len()) == Some(a.len()),
            || "A's revealed path should be complete".into(),
        )?;

        run.play_to_end(self.max_frames())?;
        self.check_end_state(run)
    }

    /// Stopped at `latest`, ended once, and further advances stay put.
    fn check_end_state(&self, run: &mut Run) -> Result<(), Failure> {
        let latest = run
            .world
            .session
            .group()
            .map(|g| g.latest())
            .ok_or_else(|| Failure::Check("no group loaded".into()))?;
        let state = run.world.session.state();
        ensure(state.active_timestamp == Some(latest), || {
            format!("stopped at {:?}, expected {}", state.active_timestamp, latest)
        })?;
        ensure(!state.is_playing, || "still playing after the end".into())?;
        ensure(run.metrics.end_transitions == 1, || {
            format!("end reported {} times", run.metrics.end_transitions)
        })?;

        run.world.session.dispatch(PlaybackAction::Advance(60_000))?;
        let after = run.world.session.state().active_timestamp;
        ensure(after == Some(latest), || {
            format!("advance after the end moved to {:?}", after)
        })
    }

    /// TV-002: engine on for samples 100-150 of 500.
    fn run_engine_run(&self, run: &mut Run) -> Result<(), Failure> {
        let generator = run.world.generator_mut();
        let id = generator.next_id();
        let track = generator.flight(id, Timestamp(DEFAULT_EPOCH_MS), 500, Some(100..=150))?;
        run.world
            .load(TrackGroup::new(vec![track.clone()])?)?;
        run.tally();

        let spans: Vec<(usize, usize, bool)> = run
            .world
            .session
            .viewport()
            .renderer(id)
            .map(|r| r.segments().map(|s| (s.start, s.end, s.engine_on)).collect())
            .unwrap_or_default();
        let expected = vec![(0, 100, false), (100, 150, true), (150, 499, false)];
        ensure(spans == expected, || format!("segments {:?}, expected {:?}", spans, expected))?;

        let visible = |run: &Run| {
            run.world
                .session
                .viewport()
                .renderer(id)
                .map(|r| r.visible_path().len())
                .unwrap_or_default()
        };

        let mid = track.samples()[125].timestamp;
        run.world
            .session
            .dispatch(PlaybackAction::SetActiveTimestamp(mid))?;
        run.tally();
        ensure(visible(run) == 126, || {
            format!("{} points revealed at sample 125", visible(run))
        })?;

        // Same instant again must not touch the surface
        run.world
            .session
            .dispatch(PlaybackAction::SetActiveTimestamp(mid))?;
        let repeated = run.tally();
        ensure(repeated.is_empty(), || {
            format!("repeated instant produced {} surface calls", repeated.len())
        })?;

        run.world
            .session
            .dispatch(PlaybackAction::SetRenderFullTrack(true))?;
        run.tally();
        ensure(visible(run) == 500, || {
            format!("full track shows {} of 500 points", visible(run))
        })?;
        run.capture(Some("full track"));
        Ok(())
    }

    /// TV-003: play to the end, then play again from the start.
    fn run_replay_from_start(&self, run: &mut Run) -> Result<(), Failure> {
        let group = run.world.load_generated()?;
        run.tally();
        let mut snapshots = run.world.session.subscribe();

        run.play_to_end(self.max_frames())?;
        self.check_end_state(run)?;
        ensure(snapshots.has_changed().unwrap_or(false), || {
            "subscribers saw no snapshot during playback".into()
        })?;
        let ended = *snapshots.borrow_and_update();
        ensure(!ended.is_playing, || "snapshot still playing at the end".into())?;

        run.world.session.dispatch(PlaybackAction::TogglePlay)?;
        let state = run.world.session.state();
        ensure(state.active_timestamp == Some(group.earliest()), || {
            format!("replay started at {:?}", state.active_timestamp)
        })?;
        ensure(state.is_playing, || "replay did not start playing".into())?;
        run.capture(Some("replay"));

        // A few frames into the replay time moves forward again
        run.world.play()?;
        for _ in 0..3 {
            run.step()?;
        }
        let resumed = run.world.session.state().active_timestamp;
        ensure(resumed > Some(group.earliest()), || {
            format!("replay did not advance: {:?}", resumed)
        })
    }

    /// TV-004: markers inside the usable area leave the camera alone; a
    /// marker outside it triggers exactly one pan and no zoom change.
    fn run_follow_pan(&self, run: &mut Run) -> Result<(), Failure> {
        run.world.load_generated()?;
        // Zoom in around the marker so it leaves the usable area mid-flight
        for _ in 0..5 {
            run.world.session.zoom_in()?;
        }
        run.tally();

        let viewport_config = run.world.session.viewport().config().clone();
        run.world.play()?;
        run.tally();

        for _ in 0..self.max_frames() {
            let zoom_before = self.camera_zoom(run);
            let (calls, running) = run.step()?;

            let moves: Vec<&SurfaceCall> = calls.iter().filter(|c| c.is_camera_move()).collect();
            ensure(moves.len() <= 1, || format!("{} camera moves in one frame", moves.len()))?;
            ensure(
                moves.iter().all(|c| matches!(c, SurfaceCall::PanTo { .. })),
                || format!("follow produced {:?}", moves),
            )?;
            ensure(self.camera_zoom(run) == zoom_before, || "follow changed the zoom".into())?;

            let viewport = run.world.session.viewport();
            let marker = viewport
                .active_track()
                .and_then(|id| viewport.renderer(id))
                .map(|r| r.marker_position().coord);
            if let (Some(surface), Some(marker)) = (viewport.surface(), marker) {
                let size = surface.size();
                let padding = effective_padding(
                    size,
                    viewport_config.padding,
                    viewport_config.min_usable_extent_px,
                );
                let (top_left, bottom_right) = usable_area(size, padding);
                let p = surface.project(marker);

                if moves.is_empty() {
                    let tolerance = 1e-6;
                    ensure(
                        p.x >= top_left.x - tolerance
                            && p.x <= bottom_right.x + tolerance
                            && p.y >= top_left.y - tolerance
                            && p.y <= bottom_right.y + tolerance,
                        || format!("marker at {:?} left the usable area without a pan", p),
                    )?;
                } else {
                    let center = (top_left + bottom_right) / 2.0;
                    ensure((p - center).norm() < 0.5, || {
                        format!("pan left the marker at {:?}, expected {:?}", p, center)
                    })?;
                }
            }

            if !running {
                break;
            }
        }

        ensure(run.metrics.pans > 0, || "the marker never left the usable area".into())?;
        debug!(pans = run.metrics.pans, "Follow scenario done");
        Ok(())
    }

    fn camera_zoom(&self, run: &Run) -> Option<f64> {
        run.world.surface().map(|s| s.camera().zoom)
    }

    /// TV-005: switching sync method keeps the followed track and the
    /// active time (clamped into the new range).
    fn run_sync_switch(&self, run: &mut Run) -> Result<(), Failure> {
        let group = run.world.load_generated()?;
        let followed = group.tracks()[1].id();
        run.world
            .session
            .dispatch(PlaybackAction::SetActiveTrack(followed))?;
        let midpoint = group.earliest() + (group.latest() - group.earliest()) / 2;
        run.world
            .session
            .dispatch(PlaybackAction::SetActiveTimestamp(midpoint))?;
        run.tally();

        for method in [
            SynchronizationMethod::RecordingStart,
            SynchronizationMethod::Takeoff,
            SynchronizationMethod::RealTime,
        ] {
            let before = run
                .world
                .session
                .state()
                .active_timestamp
                .ok_or_else(|| Failure::Check("no active time".into()))?;
            run.world
                .session
                .dispatch(PlaybackAction::SetSynchronizationMethod(method))?;
            run.tally();
            run.capture(Some(&format!("sync {}", method)));

            let session = &run.world.session;
            let synced = session
                .group()
                .ok_or_else(|| Failure::Check("group dropped on sync switch".into()))?;
            let state = session.state();
            ensure(state.followed_track == Some(followed), || {
                format!("{}: followed track changed to {:?}", method, state.followed_track)
            })?;
            ensure(session.viewport().active_track() == Some(followed), || {
                format!("{}: viewport lost the active track", method)
            })?;
            let expected = before.clamp_to(synced.earliest(), synced.latest());
            ensure(state.active_timestamp == Some(expected), || {
                format!(
                    "{}: active time {:?}, expected {}",
                    method, state.active_timestamp, expected
                )
            })?;

            let anchor = |t: &Track| match method {
                SynchronizationMethod::RealTime => t.offset(),
                SynchronizationMethod::RecordingStart => t.start().as_millis(),
                SynchronizationMethod::Takeoff => {
                    (t.takeoff().unwrap_or(t.recording_start()) + t.offset()).as_millis()
                }
            };
            let reference = synced
                .get(followed)
                .map(anchor)
                .ok_or_else(|| Failure::Check("followed track missing".into()))?;
            for track in synced.tracks() {
                ensure(anchor(track) == reference, || {
                    format!("{}: track {} is not aligned", method, track.id())
                })?;
                let rendered = session.viewport().renderer(track.id()).map(|r| r.track().offset());
                ensure(rendered == Some(track.offset()), || {
                    format!("{}: renderer for {} has a stale offset", method, track.id())
                })?;
            }
        }
        Ok(())
    }

    /// TV-006: destroy mid-playback; every later operation succeeds and
    /// touches nothing.
    fn run_teardown(&self, run: &mut Run) -> Result<(), Failure> {
        let group = run.world.load_generated()?;
        run.world.play()?;
        for _ in 0..10 {
            run.step()?;
        }
        run.capture(Some("destroy"));

        let surface = run
            .world
            .session
            .destroy()
            .ok_or_else(|| Failure::Check("destroy returned no surface".into()))?;
        ensure(surface.is_disposed(), || "surface not disposed".into())?;
        ensure(surface.primitive_count() == 0, || {
            format!("{} primitives leaked", surface.primitive_count())
        })?;

        let session = &mut run.world.session;
        session.dispatch(PlaybackAction::TogglePlay)?;
        session.dispatch(PlaybackAction::SetActiveTimestamp(group.latest()))?;
        session.zoom_in()?;
        session.zoom_to_fit()?;
        session.on_frame(Duration::from_secs(60))?;
        session.load(group)?;
        ensure(session.viewport().surface().is_none(), || {
            "surface reappeared after destroy".into()
        })?;
        ensure(session.destroy().is_none(), || "second destroy returned a surface".into())
    }
}
