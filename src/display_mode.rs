//! Distance-adaptive rendering: which mode the target is drawn in, how big, and facing where.
//!
//! Mode selection is a pure function of the GPS distance ([`select_mode`]). The engine layers
//! the frame-to-frame behavior on top of it: immediate switches into and out of
//! [`DisplayMode::Hidden`], timed cross-fades between the two visible modes, critically damped
//! scale changes and the collection-range flag.

use crate::ar::{billboard_rotation, CameraPose, Viewport};
use crate::events::TrackingEvent;
use crate::smoothing::SmoothDamp;
use crate::tracking::TrackingState;
use crate::util::{lerp, sanitize};
use std::fmt;
use std::time::Duration;
use uom::si::angle::radian;
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the target is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DisplayMode {
    /// Too far away to draw; only the overlays point at it.
    Hidden,
    /// Always faces the camera and keeps a constant apparent size.
    Billboard,
    /// Sits at its anchored position and follows true perspective.
    WorldLocked,
}

impl DisplayMode {
    #[must_use]
    pub fn is_visible(self) -> bool {
        self != Self::Hidden
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hidden => "hidden",
            Self::Billboard => "billboard",
            Self::WorldLocked => "world-locked",
        })
    }
}

/// Distance thresholds and rendering parameters for the display engine.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DisplayConfig {
    /// At or below this distance the target can be collected.
    pub collection_distance: Length,
    /// At or below this distance the target is world-locked.
    pub billboard_distance: Length,
    /// At or beyond this distance the target is hidden.
    pub hide_distance: Length,
    /// Length of the cross-fade between billboard and world-locked rendering.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_seconds"))]
    pub transition_duration: Duration,
    /// Apparent height a billboarded object keeps on screen.
    pub billboard_screen_height_px: f64,
    /// World scale at the collection distance.
    pub min_world_scale: f64,
    /// World scale at the billboard distance.
    pub max_world_scale: f64,
    /// Bounds for the constant-screen-size scale, in case the camera distance is garbage.
    pub min_billboard_scale: f64,
    pub max_billboard_scale: f64,
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_seconds"))]
    pub scale_smooth_time: Duration,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            collection_distance: Length::new::<meter>(5.),
            billboard_distance: Length::new::<meter>(15.),
            hide_distance: Length::new::<meter>(100.),
            transition_duration: Duration::from_millis(400),
            billboard_screen_height_px: 120.,
            min_world_scale: 0.5,
            max_world_scale: 1.5,
            min_billboard_scale: 0.05,
            max_billboard_scale: 25.,
            scale_smooth_time: Duration::from_millis(150),
        }
    }
}

/// The mode a target at `distance` should be shown in.
///
/// An unknown distance selects [`DisplayMode::Billboard`]: a target must never vanish just because
/// there is no fix yet.
#[must_use]
pub fn select_mode(distance: Option<Length>, config: &DisplayConfig) -> DisplayMode {
    select_mode_meters(distance.map(|d| d.get::<meter>()), config)
}

pub(crate) fn select_mode_meters(distance: Option<f64>, config: &DisplayConfig) -> DisplayMode {
    let Some(distance) = distance else {
        return DisplayMode::Billboard;
    };
    if distance <= config.billboard_distance.get::<meter>() {
        DisplayMode::WorldLocked
    } else if distance < config.hide_distance.get::<meter>() {
        DisplayMode::Billboard
    } else {
        DisplayMode::Hidden
    }
}

/// World size that makes an object `distance_to_camera` meters away appear
/// `screen_height_px` tall.
///
/// This inverts the perspective projection: the visible height at that distance is
/// `2 · d · tan(fov / 2)`, of which the object should cover `screen_height_px / viewport height`.
#[must_use]
pub fn constant_screen_size(
    screen_height_px: f64,
    distance_to_camera: f64,
    viewport: &Viewport,
) -> Option<f64> {
    if !viewport.is_usable() {
        return None;
    }
    let half_fov = viewport.vertical_fov.get::<radian>() / 2.;
    let size = screen_height_px * distance_to_camera * 2. * half_fov.tan() / viewport.height_px;
    size.is_finite().then_some(size)
}

/// How much each visible mode contributes to the rendered object this frame.
///
/// The weights sum to 1 while visible and are both 0 while hidden.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeWeights {
    pub billboard: f64,
    pub world_locked: f64,
}

/// Per-frame driver of the display mode, scale and facing of a [`TrackingState`].
#[derive(Debug, Clone)]
pub struct DisplayModeEngine {
    config: DisplayConfig,
    scale: SmoothDamp,
}

impl DisplayModeEngine {
    #[must_use]
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            scale: SmoothDamp::new(config.scale_smooth_time),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Advances `state` by `dt`, appending any mode or collection-range events to `events`.
    pub fn update(
        &self,
        state: &mut TrackingState,
        camera: Option<&CameraPose>,
        viewport: &Viewport,
        dt: Duration,
        events: &mut Vec<TrackingEvent>,
    ) {
        let snap_scale = self.retarget(state, events);
        self.advance_transition(state, dt, events);
        self.update_scale(state, camera, viewport, dt, snap_scale);
        self.update_facing(state, camera);
        self.update_collection_range(state, events);
    }

    /// The mode this frame's distance asks for, given what the positioner could achieve.
    fn desired_mode(&self, state: &TrackingState) -> DisplayMode {
        // no current fix: the frozen distance only feeds the overlays
        if state.is_stale {
            return DisplayMode::Billboard;
        }
        match select_mode_meters(state.gps_distance_m, &self.config) {
            // world-locking an object that is not pinned down would make it swim with the drift
            DisplayMode::WorldLocked if !state.placement.is_anchored() => DisplayMode::Billboard,
            mode => mode,
        }
    }

    /// Picks a new target mode. Returns `true` if the displayed mode switched immediately.
    fn retarget(&self, state: &mut TrackingState, events: &mut Vec<TrackingEvent>) -> bool {
        let desired = self.desired_mode(state);
        if desired == state.target_mode {
            return false;
        }
        tracing::debug!(
            target_id = %state.target_id,
            from = %state.target_mode,
            to = %desired,
            distance_m = ?state.gps_distance_m,
            "display mode target changed"
        );
        state.target_mode = desired;

        if desired == state.current_mode {
            // turned back before the cross-fade finished
            state.transition_progress = 1.;
            return false;
        }
        if !desired.is_visible() || !state.current_mode.is_visible() {
            let from = std::mem::replace(&mut state.current_mode, desired);
            state.transition_progress = 1.;
            events.push(TrackingEvent::ModeChanged { from, to: desired });
            return true;
        }
        state.transition_progress = 0.;
        false
    }

    /// Moves an ongoing cross-fade forward.
    fn advance_transition(
        &self,
        state: &mut TrackingState,
        dt: Duration,
        events: &mut Vec<TrackingEvent>,
    ) {
        if !state.is_transitioning() {
            return;
        }
        let duration = self.config.transition_duration.as_secs_f64();
        let step = if duration > 0. {
            dt.as_secs_f64() / duration
        } else {
            1.
        };
        state.transition_progress = (state.transition_progress + step).min(1.);
        if state.transition_progress < 1. {
            return;
        }
        let from = std::mem::replace(&mut state.current_mode, state.target_mode);
        tracing::debug!(target_id = %state.target_id, %from, to = %state.current_mode, "cross-fade complete");
        events.push(TrackingEvent::ModeChanged {
            from,
            to: state.current_mode,
        });
    }

    fn update_scale(
        &self,
        state: &mut TrackingState,
        camera: Option<&CameraPose>,
        viewport: &Viewport,
        dt: Duration,
        snap: bool,
    ) {
        let from = self.mode_scale(state.current_mode, state, camera, viewport);
        let to = self.mode_scale(state.target_mode, state, camera, viewport);
        let target = match (from, to) {
            (Some(from), Some(to)) => lerp(from, to, ease(state.transition_progress)),
            (Some(only), None) | (None, Some(only)) => only,
            // nothing to size against this frame; hold
            (None, None) => return,
        };

        if snap || !state.current_scale.is_finite() {
            state.current_scale = target;
            state.scale_velocity = 0.;
        } else {
            state.current_scale = self.scale.step(
                state.current_scale,
                target,
                &mut state.scale_velocity,
                dt,
            );
        }
        state.current_scale = sanitize(state.current_scale, 0., self.scale_ceiling());
        tracing::trace!(target_id = %state.target_id, scale = state.current_scale, target_scale = target);
    }

    /// Scale the object should have if it were fully in `mode`, if that can be determined.
    fn mode_scale(
        &self,
        mode: DisplayMode,
        state: &TrackingState,
        camera: Option<&CameraPose>,
        viewport: &Viewport,
    ) -> Option<f64> {
        match mode {
            DisplayMode::Hidden => Some(0.),
            DisplayMode::Billboard => {
                let camera = camera?;
                let position = state.ar_local_position?;
                let size = constant_screen_size(
                    self.config.billboard_screen_height_px,
                    camera.distance_to(&position),
                    viewport,
                )?;
                Some(size.clamp(
                    self.config.min_billboard_scale,
                    self.config.max_billboard_scale,
                ))
            }
            DisplayMode::WorldLocked => {
                let near = self.config.collection_distance.get::<meter>();
                let far = self.config.billboard_distance.get::<meter>();
                let distance = state.gps_distance_m.unwrap_or(far);
                let t = if far > near {
                    (distance - near) / (far - near)
                } else {
                    1.
                };
                Some(lerp(
                    self.config.min_world_scale,
                    self.config.max_world_scale,
                    t,
                ))
            }
        }
    }

    fn scale_ceiling(&self) -> f64 {
        self.config
            .max_billboard_scale
            .max(self.config.max_world_scale)
    }

    fn update_facing(&self, state: &mut TrackingState, camera: Option<&CameraPose>) {
        let weights = mode_weights(state);
        if weights.billboard == 0. && weights.world_locked == 0. {
            return;
        }
        let billboard = camera.zip(state.ar_local_position).and_then(|(camera, position)| {
            billboard_rotation(&position, &camera.position)
        });
        let anchored = state.placement.anchor().map(|anchor| anchor.rotation);

        let facing = match (billboard, anchored) {
            (Some(billboard), Some(anchored)) if weights.world_locked > 0. => billboard
                .try_slerp(&anchored, weights.world_locked, 1e-9)
                .or(Some(anchored)),
            (Some(billboard), _) => Some(billboard),
            (None, Some(anchored)) if weights.world_locked > 0. => Some(anchored),
            // degenerate direction: keep last frame's orientation
            _ => None,
        };
        if let Some(facing) = facing {
            state.facing = Some(facing);
        }
    }

    fn update_collection_range(&self, state: &mut TrackingState, events: &mut Vec<TrackingEvent>) {
        let Some(distance) = state.gps_distance_m else {
            return;
        };
        let inside = distance <= self.config.collection_distance.get::<meter>();
        if inside == state.is_in_collection_range {
            return;
        }
        state.is_in_collection_range = inside;
        tracing::debug!(target_id = %state.target_id, distance_m = distance, inside, "collection range crossed");
        events.push(if inside {
            TrackingEvent::EnteredCollectionRange
        } else {
            TrackingEvent::ExitedCollectionRange
        });
    }
}

/// Cross-fade weights of the two visible modes for `state`.
#[must_use]
pub fn mode_weights(state: &TrackingState) -> ModeWeights {
    let weight_of = |mode: DisplayMode| match mode {
        DisplayMode::Hidden => ModeWeights {
            billboard: 0.,
            world_locked: 0.,
        },
        DisplayMode::Billboard => ModeWeights {
            billboard: 1.,
            world_locked: 0.,
        },
        DisplayMode::WorldLocked => ModeWeights {
            billboard: 0.,
            world_locked: 1.,
        },
    };
    let from = weight_of(state.current_mode);
    let to = weight_of(state.target_mode);
    let t = ease(state.transition_progress);
    ModeWeights {
        billboard: lerp(from.billboard, to.billboard, t),
        world_locked: lerp(from.world_locked, to.world_locked, t),
    }
}

/// Smoothstep, so cross-fades start and end gently.
fn ease(t: f64) -> f64 {
    let t = t.clamp(0., 1.);
    t * t * (3. - 2. * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ar::{Anchor, AnchorId};
    use crate::tracking::Placement;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use rstest::rstest;
    use uom::si::angle::degree;
    use uom::si::f64::Angle;

    const FRAME: Duration = Duration::from_millis(100);

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn viewport() -> Viewport {
        Viewport::new(1000., 1000., Angle::new::<degree>(60.))
    }

    fn camera() -> CameraPose {
        CameraPose::level(Point3::origin(), Angle::new::<degree>(0.))
    }

    fn anchored_state(distance: f64) -> TrackingState {
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(distance);
        state.gps_bearing_deg = Some(0.);
        state.is_stale = false;
        let anchor = Anchor {
            id: AnchorId(1),
            position: Point3::new(0., -1.5, -4.),
            rotation: UnitQuaternion::identity(),
        };
        state.placement = Placement::Anchored(anchor);
        state.ar_local_position = Some(anchor.position);
        state
    }

    fn run(engine: &DisplayModeEngine, state: &mut TrackingState, frames: usize) -> Vec<TrackingEvent> {
        let mut events = Vec::new();
        for _ in 0..frames {
            engine.update(state, Some(&camera()), &viewport(), FRAME, &mut events);
        }
        events
    }

    #[rstest]
    #[case(Some(0.), DisplayMode::WorldLocked)]
    #[case(Some(5.), DisplayMode::WorldLocked)]
    #[case(Some(15.), DisplayMode::WorldLocked)]
    #[case(Some(16.), DisplayMode::Billboard)]
    #[case(Some(99.9), DisplayMode::Billboard)]
    #[case(Some(100.), DisplayMode::Hidden)]
    #[case(Some(101.), DisplayMode::Hidden)]
    #[case(None, DisplayMode::Billboard)]
    fn mode_is_a_function_of_distance(#[case] distance: Option<f64>, #[case] expected: DisplayMode) {
        let config = DisplayConfig::default();
        assert_eq!(select_mode(distance.map(m), &config), expected);
    }

    #[test]
    fn unknown_location_shows_billboard() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        let events = run(&engine, &mut state, 1);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
        assert_eq!(
            events,
            vec![TrackingEvent::ModeChanged {
                from: DisplayMode::Hidden,
                to: DisplayMode::Billboard
            }]
        );

        // losing the distance while world-locked also ends up as a billboard
        let mut state = anchored_state(10.);
        run(&engine, &mut state, 10);
        assert_eq!(state.current_mode(), DisplayMode::WorldLocked);
        state.gps_distance_m = None;
        run(&engine, &mut state, 10);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
    }

    #[rstest]
    #[case::was_hidden(150.)]
    #[case::was_world_locked(10.)]
    fn stale_distance_shows_billboard(#[case] last_known: f64) {
        let engine = DisplayModeEngine::new(DisplayConfig {
            transition_duration: Duration::ZERO,
            ..Default::default()
        });
        let mut state = anchored_state(last_known);
        run(&engine, &mut state, 2);
        assert_ne!(state.current_mode(), DisplayMode::Billboard);

        state.is_stale = true;
        run(&engine, &mut state, 2);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
        assert_eq!(state.gps_distance_m, Some(last_known));
    }

    #[test]
    fn world_locked_needs_an_anchor() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(3.);
        run(&engine, &mut state, 10);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
    }

    #[test]
    fn hidden_switches_are_immediate() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = anchored_state(150.);
        let events = run(&engine, &mut state, 1);
        assert!(events.is_empty());
        assert_eq!(state.current_mode(), DisplayMode::Hidden);

        state.gps_distance_m = Some(50.);
        let events = run(&engine, &mut state, 1);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
        assert!(!state.is_transitioning());
        assert_eq!(events.len(), 1);

        state.gps_distance_m = Some(500.);
        run(&engine, &mut state, 1);
        assert_eq!(state.current_mode(), DisplayMode::Hidden);
        assert_eq!(state.transition_progress(), 1.);
    }

    #[test]
    fn visible_switches_cross_fade() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = anchored_state(50.);
        run(&engine, &mut state, 1);
        assert_eq!(state.current_mode(), DisplayMode::Billboard);

        state.gps_distance_m = Some(10.);
        let events = run(&engine, &mut state, 3);
        assert!(events.is_empty());
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
        assert_eq!(state.target_mode(), DisplayMode::WorldLocked);
        assert!(state.is_transitioning());
        let weights = mode_weights(&state);
        assert!(weights.world_locked > 0.5 && weights.world_locked < 1.);
        assert_relative_eq!(weights.billboard + weights.world_locked, 1., epsilon = 1e-12);

        let events = run(&engine, &mut state, 2);
        assert_eq!(
            events,
            vec![TrackingEvent::ModeChanged {
                from: DisplayMode::Billboard,
                to: DisplayMode::WorldLocked
            }]
        );
        assert_eq!(state.current_mode(), state.target_mode());
        assert_eq!(state.transition_progress(), 1.);
    }

    #[test]
    fn turning_back_mid_fade_cancels_it() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = anchored_state(50.);
        run(&engine, &mut state, 1);
        state.gps_distance_m = Some(10.);
        run(&engine, &mut state, 2);
        assert!(state.is_transitioning());

        state.gps_distance_m = Some(50.);
        let events = run(&engine, &mut state, 1);
        assert!(events.is_empty());
        assert!(!state.is_transitioning());
        assert_eq!(state.current_mode(), DisplayMode::Billboard);
    }

    #[test]
    fn billboard_keeps_constant_screen_height() {
        let engine = DisplayModeEngine::new(DisplayConfig {
            scale_smooth_time: Duration::ZERO,
            ..Default::default()
        });
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(40.);
        state.ar_local_position = Some(Point3::new(0., 0., -10.));
        run(&engine, &mut state, 1);
        // 120 px of a 1000 px tall, 60° view at 10 m
        let expected = 120. * 10. * 2. * 30f64.to_radians().tan() / 1000.;
        assert_relative_eq!(state.current_scale(), expected, epsilon = 1e-9);
    }

    #[test]
    fn scale_changes_are_smoothed() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(40.);
        state.ar_local_position = Some(Point3::new(0., 0., -10.));
        run(&engine, &mut state, 1);
        let before = state.current_scale();

        state.ar_local_position = Some(Point3::new(0., 0., -20.));
        run(&engine, &mut state, 1);
        let after = state.current_scale();
        assert!(after > before);
        assert!(after < 2. * before);
    }

    #[rstest]
    #[case(5., 0.5)]
    #[case(10., 1.)]
    #[case(15., 1.5)]
    #[case(2., 0.5)]
    fn world_locked_scale_interpolates(#[case] distance: f64, #[case] expected: f64) {
        let engine = DisplayModeEngine::new(DisplayConfig {
            scale_smooth_time: Duration::ZERO,
            transition_duration: Duration::ZERO,
            ..Default::default()
        });
        let mut state = anchored_state(distance);
        run(&engine, &mut state, 2);
        assert_eq!(state.current_mode(), DisplayMode::WorldLocked);
        assert_relative_eq!(state.current_scale(), expected, epsilon = 1e-9);
    }

    #[test]
    fn glitched_camera_distance_is_clamped() {
        let engine = DisplayModeEngine::new(DisplayConfig {
            scale_smooth_time: Duration::ZERO,
            ..Default::default()
        });
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(40.);
        state.ar_local_position = Some(Point3::new(0., 0., -1e9));
        run(&engine, &mut state, 1);
        assert_eq!(state.current_scale(), 25.);
    }

    #[test]
    fn collection_events_fire_once_per_crossing() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        let mut events = Vec::new();
        for distance in [10., 6., 4., 6., 4.] {
            state.gps_distance_m = Some(distance);
            engine.update(&mut state, None, &viewport(), FRAME, &mut events);
        }
        let entered = events
            .iter()
            .filter(|e| **e == TrackingEvent::EnteredCollectionRange)
            .count();
        let exited = events
            .iter()
            .filter(|e| **e == TrackingEvent::ExitedCollectionRange)
            .count();
        assert_eq!((entered, exited), (2, 1));
        assert!(state.is_in_collection_range());
    }

    #[test]
    fn hovering_inside_does_not_refire() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        let mut events = Vec::new();
        for distance in [4.9, 4.99, 5., 4.2] {
            state.gps_distance_m = Some(distance);
            engine.update(&mut state, None, &viewport(), FRAME, &mut events);
        }
        state.gps_distance_m = None;
        engine.update(&mut state, None, &viewport(), FRAME, &mut events);
        let crossings: Vec<_> = events
            .into_iter()
            .filter(|e| !matches!(e, TrackingEvent::ModeChanged { .. }))
            .collect();
        assert_eq!(crossings, vec![TrackingEvent::EnteredCollectionRange]);
    }

    #[test]
    fn billboard_faces_the_camera() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(40.);
        state.ar_local_position = Some(Point3::new(0., 0., -10.));
        run(&engine, &mut state, 1);
        let facing = state.facing().expect("camera is not overhead");
        assert_relative_eq!(facing * Vector3::z(), Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn degenerate_facing_keeps_previous_rotation() {
        let engine = DisplayModeEngine::new(DisplayConfig::default());
        let mut state = TrackingState::new("coin");
        state.gps_distance_m = Some(40.);
        state.ar_local_position = Some(Point3::new(3., 0., -4.));
        run(&engine, &mut state, 1);
        let before = state.facing();
        assert!(before.is_some());

        // camera directly above the object
        state.ar_local_position = Some(Point3::new(0., -2., 0.));
        run(&engine, &mut state, 1);
        assert_eq!(state.facing(), before);
    }
}
