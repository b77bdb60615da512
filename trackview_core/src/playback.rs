//! The playback engine - time state machine and actions.
//!
//! ```text
//!               load()                    TogglePlay
//! Unloaded ─────────────► Loaded&Paused ◄────────────► Loaded&Playing
//!    ▲                          │                            │
//!    └──────── unload() ────────┴────────────────────────────┘
//! ```
//!
//! Every dispatched action is applied in full before a single
//! [`PlaybackSnapshot`] is published to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sync::{StandardSynchronizer, SynchronizationMethod, Synchronizer};
use crate::track::{Millis, Timestamp, TrackGroup, TrackId};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the TimeController
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Speed multiplier applied on every load (default: 1.0 = real time)
    pub default_speed: f64,

    /// Lowest accepted speed multiplier (default: 0.25)
    pub min_speed: f64,

    /// Highest accepted speed multiplier (default: 512.0)
    pub max_speed: f64,

    /// Synchronization method selected at startup (default: real time)
    pub default_sync_method: SynchronizationMethod,

    /// Show complete paths instead of progressive reveal (default: false)
    pub render_full_track: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_speed: 1.0,
            min_speed: 0.25,
            max_speed: 512.0,
            default_sync_method: SynchronizationMethod::RealTime,
            render_full_track: false,
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Full playback state, owned by the [`TimeController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Group-timeline instant being shown; `None` while unloaded
    pub active_timestamp: Option<Timestamp>,
    pub is_playing: bool,
    pub speed: f64,
    /// Track the camera follows
    pub followed_track: Option<TrackId>,
    pub render_full_track: bool,
    pub sync_method: SynchronizationMethod,
}

/// What subscribers observe after each dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub active_timestamp: Option<Timestamp>,
    pub is_playing: bool,
    pub followed_track: Option<TrackId>,
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Inputs accepted by [`TimeController::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackAction {
    /// Scrub to an instant (clamped)
    SetActiveTimestamp(Timestamp),
    /// Elapsed wall-clock milliseconds, scaled by speed
    Advance(Millis),
    TogglePlay,
    SetSynchronizationMethod(SynchronizationMethod),
    SetActiveTrack(TrackId),
    SetRenderFullTrack(bool),
    SetSpeed(f64),
    /// Scrub relative to the active instant (clamped)
    StepBy(Millis),
}

/// Result of an advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Nothing loaded
    Idle,
    Advanced,
    /// Hit a timeline bound while paused
    Clamped,
    /// Hit the end while playing; playback was stopped
    ReachedEnd,
}

/// Which parts of the state a dispatch changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Changes {
    pub time: bool,
    pub playing: bool,
    pub followed: bool,
    pub render_mode: bool,
    pub speed: bool,
    /// The group was replaced (load or re-synchronization)
    pub group: bool,
    /// Playback stopped at the end of the timeline
    pub ended: bool,
}

impl Changes {
    fn everything() -> Self {
        Self {
            time: true,
            playing: true,
            followed: true,
            render_mode: true,
            speed: true,
            group: true,
            ended: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// TIME CONTROLLER
// ============================================================================

/// Owns playback state for one loaded group.
pub struct TimeController {
    config: PlaybackConfig,
    synchronizer: Box<dyn Synchronizer>,
    group: Option<TrackGroup>,
    state: PlaybackState,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

impl TimeController {
    /// Creates an unloaded controller using [`StandardSynchronizer`].
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_synchronizer(config, Box::new(StandardSynchronizer))
    }

    pub fn with_synchronizer(config: PlaybackConfig, synchronizer: Box<dyn Synchronizer>) -> Self {
        let state = PlaybackState {
            active_timestamp: None,
            is_playing: false,
            speed: config.default_speed,
            followed_track: None,
            render_full_track: config.render_full_track,
            sync_method: config.default_sync_method,
        };
        let (snapshots, _) = watch::channel(PlaybackSnapshot::default());
        Self {
            config,
            synchronizer,
            group: None,
            state,
            snapshots,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// The synchronized group, if loaded.
    pub fn group(&self) -> Option<&TrackGroup> {
        self.group.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.group.is_some()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            active_timestamp: self.state.active_timestamp,
            is_playing: self.state.is_playing,
            followed_track: self.state.followed_track,
        }
    }

    /// Subscribes to snapshots. The receiver starts at the current one.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.subscribe()
    }

    /// Replaces any loaded group.
    ///
    /// The current synchronization method is applied, playback is paused
    /// at the group's earliest instant, the first track is followed and
    /// the speed returns to its default.
    pub fn load(&mut self, group: TrackGroup) -> Changes {
        let followed = group.first_id();
        let offsets = self
            .synchronizer
            .offsets(&group, self.state.sync_method, followed);
        let group = group.synchronized(&offsets);

        self.state.active_timestamp = Some(group.earliest());
        self.state.is_playing = false;
        self.state.followed_track = followed;
        self.state.speed = self.config.default_speed;

        info!(
            tracks = group.len(),
            earliest = %group.earliest(),
            latest = %group.latest(),
            sync = %self.state.sync_method,
            "Track group loaded"
        );

        self.group = Some(group);
        self.publish();
        Changes::everything()
    }

    /// Drops the loaded group.
    pub fn unload(&mut self) -> Changes {
        if self.group.take().is_none() {
            return Changes::default();
        }
        self.state.active_timestamp = None;
        self.state.is_playing = false;
        self.state.followed_track = None;

        info!("Track group unloaded");
        self.publish();
        Changes::everything()
    }

    /// Applies one action and publishes the resulting snapshot.
    pub fn dispatch(&mut self, action: PlaybackAction) -> Changes {
        let changes = match action {
            PlaybackAction::SetActiveTimestamp(ts) => self.scrub_to(ts),
            PlaybackAction::StepBy(delta) => match self.state.active_timestamp {
                Some(active) => self.scrub_to(active + delta),
                None => Changes::default(),
            },
            PlaybackAction::Advance(delta) => match self.advance(delta) {
                AdvanceOutcome::Idle => Changes::default(),
                AdvanceOutcome::Advanced | AdvanceOutcome::Clamped => Changes {
                    time: true,
                    ..Changes::default()
                },
                AdvanceOutcome::ReachedEnd => Changes {
                    time: true,
                    playing: true,
                    ended: true,
                    ..Changes::default()
                },
            },
            PlaybackAction::TogglePlay => self.toggle_play(),
            PlaybackAction::SetSynchronizationMethod(method) => self.change_sync_method(method),
            PlaybackAction::SetActiveTrack(id) => self.set_followed(id),
            PlaybackAction::SetRenderFullTrack(full) => {
                let changed = self.state.render_full_track != full;
                self.state.render_full_track = full;
                Changes {
                    render_mode: changed,
                    ..Changes::default()
                }
            }
            PlaybackAction::SetSpeed(speed) => self.set_speed(speed),
        };

        if !changes.is_empty() {
            self.publish();
        }
        changes
    }

    fn scrub_to(&mut self, ts: Timestamp) -> Changes {
        let Some(group) = &self.group else {
            debug!("Scrub ignored, nothing loaded");
            return Changes::default();
        };
        let clamped = group.clamp(ts);
        let changed = self.state.active_timestamp != Some(clamped);
        self.state.active_timestamp = Some(clamped);
        Changes {
            time: changed,
            ..Changes::default()
        }
    }

    /// Moves the active instant forward by `delta * speed`.
    ///
    /// Crossing the end clamps to it; if playback was running it is stopped,
    /// so the end is reported as [`AdvanceOutcome::ReachedEnd`] once.
    pub fn advance(&mut self, delta: Millis) -> AdvanceOutcome {
        let Some(group) = &self.group else {
            return AdvanceOutcome::Idle;
        };

        // Loading always sets an instant; this covers controllers built
        // around a state that has none yet.
        let active = match self.state.active_timestamp {
            Some(active) => active,
            None => self
                .state
                .followed_track
                .and_then(|id| group.get(id))
                .map(|t| t.start())
                .unwrap_or_else(|| group.earliest()),
        };

        let scaled = (delta as f64 * self.state.speed).round();
        let scaled = if scaled.is_finite() {
            scaled.clamp(Millis::MIN as f64, Millis::MAX as f64) as Millis
        } else {
            0
        };
        let next = active + scaled;

        if next > group.latest() {
            self.state.active_timestamp = Some(group.latest());
            if self.state.is_playing {
                self.state.is_playing = false;
                info!(at = %group.latest(), "Playback reached the end");
                AdvanceOutcome::ReachedEnd
            } else {
                AdvanceOutcome::Clamped
            }
        } else if next < group.earliest() {
            self.state.active_timestamp = Some(group.earliest());
            AdvanceOutcome::Clamped
        } else {
            self.state.active_timestamp = Some(next);
            AdvanceOutcome::Advanced
        }
    }

    fn toggle_play(&mut self) -> Changes {
        let Some(group) = &self.group else {
            debug!("Toggle ignored, nothing loaded");
            return Changes::default();
        };

        let mut changes = Changes {
            playing: true,
            ..Changes::default()
        };
        if !self.state.is_playing {
            let at_end = self
                .state
                .active_timestamp
                .map_or(true, |active| active >= group.latest());
            if at_end {
                // Replay from the start
                self.state.active_timestamp = Some(group.earliest());
                changes.time = true;
            }
        }
        self.state.is_playing = !self.state.is_playing;
        changes
    }

    fn change_sync_method(&mut self, method: SynchronizationMethod) -> Changes {
        if self.state.sync_method == method {
            return Changes::default();
        }
        self.state.sync_method = method;

        let Some(group) = &self.group else {
            return Changes::default();
        };

        let offsets = self
            .synchronizer
            .offsets(group, method, self.state.followed_track);
        let group = group.synchronized(&offsets);
        let previous = self.state.active_timestamp;
        let active = previous.map(|ts| group.clamp(ts));
        self.state.active_timestamp = active;

        debug!(
            sync = %method,
            earliest = %group.earliest(),
            latest = %group.latest(),
            "Group re-synchronized"
        );
        self.group = Some(group);

        Changes {
            group: true,
            time: active != previous,
            ..Changes::default()
        }
    }

    fn set_followed(&mut self, id: TrackId) -> Changes {
        match &self.group {
            Some(group) if group.contains(id) => {
                let changed = self.state.followed_track != Some(id);
                self.state.followed_track = Some(id);
                Changes {
                    followed: changed,
                    ..Changes::default()
                }
            }
            _ => {
                warn!(track = %id, "Ignoring unknown active track");
                Changes::default()
            }
        }
    }

    fn set_speed(&mut self, speed: f64) -> Changes {
        if !speed.is_finite() {
            warn!(speed, "Ignoring non-finite playback speed");
            return Changes::default();
        }
        // max/min rather than clamp: host configs may carry inverted bounds
        let speed = speed.max(self.config.min_speed).min(self.config.max_speed);
        let changed = self.state.speed != speed;
        self.state.speed = speed;
        Changes {
            speed: changed,
            ..Changes::default()
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl std::fmt::Debug for TimeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeController")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("tracks", &self.group.as_ref().map(TrackGroup::len))
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::fixtures::*;
    use proptest::prelude::*;

    /// A: 10:00-10:30, B: 10:05-10:40
    fn pair() -> TrackGroup {
        let start = Timestamp(TEN_AM);
        let a = straight_track(1, start, 31, minutes(1));
        let b = straight_track(2, start + minutes(5), 36, minutes(1));
        TrackGroup::new(vec![a, b]).unwrap()
    }

    fn loaded() -> TimeController {
        let mut controller = TimeController::new(PlaybackConfig::default());
        controller.load(pair());
        controller
    }

    #[test]
    fn test_load_pauses_at_earliest() {
        let controller = loaded();
        let group = controller.group().unwrap();

        assert_eq!(group.earliest(), Timestamp(TEN_AM));
        assert_eq!(group.latest(), Timestamp(TEN_AM) + minutes(40));
        assert_eq!(controller.state().active_timestamp, Some(group.earliest()));
        assert!(!controller.state().is_playing);
        assert_eq!(controller.state().followed_track, Some(TrackId::from_seed(1)));
    }

    #[test]
    fn test_unloaded_ignores_everything() {
        let mut controller = TimeController::new(PlaybackConfig::default());
        assert_eq!(controller.advance(1000), AdvanceOutcome::Idle);
        assert!(controller.dispatch(PlaybackAction::TogglePlay).is_empty());
        assert!(controller
            .dispatch(PlaybackAction::SetActiveTimestamp(Timestamp(5)))
            .is_empty());
        assert_eq!(controller.state().active_timestamp, None);
    }

    #[test]
    fn test_scrub_clamps() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::SetActiveTimestamp(Timestamp(0)));
        assert_eq!(controller.state().active_timestamp, Some(Timestamp(TEN_AM)));

        controller.dispatch(PlaybackAction::SetActiveTimestamp(Timestamp(i64::MAX)));
        assert_eq!(
            controller.state().active_timestamp,
            Some(Timestamp(TEN_AM) + minutes(40))
        );

        controller.dispatch(PlaybackAction::StepBy(-minutes(5)));
        assert_eq!(
            controller.state().active_timestamp,
            Some(Timestamp(TEN_AM) + minutes(35))
        );
    }

    #[test]
    fn test_advance_reaches_end_exactly_once() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::TogglePlay);
        let latest = controller.group().unwrap().latest();

        let mut ends = 0;
        for _ in 0..100 {
            let changes = controller.dispatch(PlaybackAction::Advance(minutes(1)));
            if changes.ended {
                ends += 1;
            }
            assert!(controller.state().active_timestamp.unwrap() <= latest);
        }

        assert_eq!(ends, 1);
        assert_eq!(controller.state().active_timestamp, Some(latest));
        assert!(!controller.state().is_playing);
        assert_eq!(controller.advance(1), AdvanceOutcome::Clamped);
    }

    #[test]
    fn test_toggle_at_end_replays_from_start() {
        let mut controller = loaded();
        let (earliest, latest) = {
            let g = controller.group().unwrap();
            (g.earliest(), g.latest())
        };
        controller.dispatch(PlaybackAction::SetActiveTimestamp(latest));

        let changes = controller.dispatch(PlaybackAction::TogglePlay);

        assert!(changes.time && changes.playing);
        assert_eq!(controller.state().active_timestamp, Some(earliest));
        assert!(controller.state().is_playing);
    }

    #[test]
    fn test_toggle_mid_timeline_keeps_position() {
        let mut controller = loaded();
        let mid = Timestamp(TEN_AM) + minutes(12);
        controller.dispatch(PlaybackAction::SetActiveTimestamp(mid));

        controller.dispatch(PlaybackAction::TogglePlay);
        controller.dispatch(PlaybackAction::TogglePlay);

        assert_eq!(controller.state().active_timestamp, Some(mid));
        assert!(!controller.state().is_playing);
    }

    #[test]
    fn test_speed_scales_advance() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::SetSpeed(2.5));
        controller.advance(1_000);
        assert_eq!(
            controller.state().active_timestamp,
            Some(Timestamp(TEN_AM + 2_500))
        );
    }

    #[test]
    fn test_speed_is_clamped_and_validated() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::SetSpeed(10_000.0));
        assert_eq!(controller.state().speed, 512.0);

        let changes = controller.dispatch(PlaybackAction::SetSpeed(f64::NAN));
        assert!(changes.is_empty());
        assert_eq!(controller.state().speed, 512.0);

        controller.dispatch(PlaybackAction::SetSpeed(0.0));
        assert_eq!(controller.state().speed, 0.25);
    }

    #[test]
    fn test_inverted_speed_bounds_do_not_panic() {
        let config = PlaybackConfig {
            min_speed: 10.0,
            max_speed: 2.0,
            ..PlaybackConfig::default()
        };
        let mut controller = TimeController::new(config);
        controller.load(pair());

        controller.dispatch(PlaybackAction::SetSpeed(4.0));
        assert_eq!(controller.state().speed, 2.0);
        controller.dispatch(PlaybackAction::SetSpeed(0.5));
        assert_eq!(controller.state().speed, 2.0);
    }

    #[test]
    fn test_advance_without_instant_starts_at_followed_track() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::SetActiveTrack(TrackId::from_seed(2)));
        controller.state.active_timestamp = None;

        assert_eq!(controller.advance(minutes(1)), AdvanceOutcome::Advanced);
        assert_eq!(
            controller.state().active_timestamp,
            Some(Timestamp(TEN_AM) + minutes(6))
        );
    }

    #[test]
    fn test_sync_switch_preserves_followed_and_time() {
        let mut controller = loaded();
        let b = TrackId::from_seed(2);
        controller.dispatch(PlaybackAction::SetActiveTrack(b));
        let at = Timestamp(TEN_AM) + minutes(20);
        controller.dispatch(PlaybackAction::SetActiveTimestamp(at));

        let changes = controller.dispatch(PlaybackAction::SetSynchronizationMethod(
            SynchronizationMethod::RecordingStart,
        ));

        assert!(changes.group);
        assert_eq!(controller.state().followed_track, Some(b));
        assert_eq!(controller.state().active_timestamp, Some(at));
        // Aligned to B: both start at 10:05
        let group = controller.group().unwrap();
        assert_eq!(group.earliest(), Timestamp(TEN_AM) + minutes(5));
        assert_eq!(group.latest(), Timestamp(TEN_AM) + minutes(40));
    }

    #[test]
    fn test_sync_switch_clamps_time_into_new_range() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::SetActiveTrack(TrackId::from_seed(2)));

        // 10:02 is before the aligned start (10:05)
        controller.dispatch(PlaybackAction::SetActiveTimestamp(Timestamp(TEN_AM) + minutes(2)));
        let changes = controller.dispatch(PlaybackAction::SetSynchronizationMethod(
            SynchronizationMethod::RecordingStart,
        ));

        assert!(changes.time);
        assert_eq!(
            controller.state().active_timestamp,
            Some(Timestamp(TEN_AM) + minutes(5))
        );
    }

    #[test]
    fn test_unknown_track_ignored() {
        let mut controller = loaded();
        let changes = controller.dispatch(PlaybackAction::SetActiveTrack(TrackId::from_seed(42)));
        assert!(changes.is_empty());
        assert_eq!(controller.state().followed_track, Some(TrackId::from_seed(1)));
    }

    #[test]
    fn test_unload_resets() {
        let mut controller = loaded();
        controller.dispatch(PlaybackAction::TogglePlay);
        controller.unload();

        assert!(!controller.is_loaded());
        assert_eq!(controller.snapshot(), PlaybackSnapshot::default());
        assert!(controller.unload().is_empty());
    }

    #[test]
    fn test_subscribers_see_complete_snapshots() {
        let mut controller = TimeController::new(PlaybackConfig::default());
        let mut rx = controller.subscribe();

        controller.load(pair());
        assert!(rx.has_changed().unwrap());
        let snapshot = *rx.borrow_and_update();
        assert_eq!(snapshot.active_timestamp, Some(Timestamp(TEN_AM)));
        assert_eq!(snapshot.followed_track, Some(TrackId::from_seed(1)));

        // Speed is not part of the snapshot
        controller.dispatch(PlaybackAction::SetSpeed(4.0));
        assert!(!rx.has_changed().unwrap());

        controller.dispatch(PlaybackAction::TogglePlay);
        assert!(rx.borrow_and_update().is_playing);
    }

    fn action() -> impl Strategy<Value = PlaybackAction> {
        prop_oneof![
            (-minutes(60)..minutes(120))
                .prop_map(|m| PlaybackAction::SetActiveTimestamp(Timestamp(TEN_AM + m))),
            (-10_000i64..600_000).prop_map(PlaybackAction::Advance),
            (-minutes(30)..minutes(30)).prop_map(PlaybackAction::StepBy),
            Just(PlaybackAction::TogglePlay),
            (0.1f64..100.0).prop_map(PlaybackAction::SetSpeed),
            prop_oneof![
                Just(SynchronizationMethod::RealTime),
                Just(SynchronizationMethod::RecordingStart),
                Just(SynchronizationMethod::Takeoff),
            ]
            .prop_map(PlaybackAction::SetSynchronizationMethod),
            (1u64..3).prop_map(|s| PlaybackAction::SetActiveTrack(TrackId::from_seed(s))),
        ]
    }

    proptest! {
        #[test]
        fn prop_active_timestamp_stays_in_range(actions in prop::collection::vec(action(), 1..60)) {
            let mut controller = loaded();
            for action in actions {
                controller.dispatch(action);
                let group = controller.group().unwrap();
                let active = controller.state().active_timestamp.unwrap();
                prop_assert!(active >= group.earliest() && active <= group.latest());
            }
        }
    }
}
