//! The per-frame driver for the single active target.
//!
//! A [`Tracker`] owns the injected location and heading sources, the optional AR session and the
//! [`TrackingState`] of whichever target is currently being hunted. Once per rendered frame,
//! [`Tracker::frame`] drains the sources, then runs the positioner, the display engine, the
//! indicator and the radar in that order, and returns everything the UI needs to draw.

use crate::ar::{ArSession, CameraPose, Viewport};
use crate::config::{ConfigError, TrackerConfig};
use crate::display_mode::{mode_weights, DisplayMode, DisplayModeEngine, ModeWeights};
use crate::events::{EventBus, Subscription, TrackingEvent};
use crate::geo_math::CardinalDirection;
use crate::indicator::{DirectionIndicator, DistanceBand, IndicatorPlacement, Rgba};
use crate::positioner::CoinPositioner;
use crate::radar::{BlipStyle, RadarOffset, RadarProjector};
use crate::sensors::{HeadingSample, HeadingSource, LocationSource};
use crate::tracking::{TargetObject, TrackingState};
use nalgebra::{Point3, UnitQuaternion};
use std::fmt;
use std::time::Duration;
use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};

/// Everything the UI needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub heading: HeadingSample,
    /// Where the "N" label sits on the radar rim.
    pub north_marker: RadarOffset,
    /// `None` while no target is active.
    pub target: Option<TargetFrame>,
    /// Events raised since the previous frame, in order. Also published on the tracker's bus.
    pub events: Vec<TrackingEvent>,
}

/// Render state of the active target for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFrame {
    pub target_id: String,
    pub mode: DisplayMode,
    pub target_mode: DisplayMode,
    pub transition_progress: f64,
    pub weights: ModeWeights,
    pub distance: Option<Length>,
    pub bearing: Option<Angle>,
    pub cardinal: Option<CardinalDirection>,
    pub is_stale: bool,
    pub position: Option<Point3<f64>>,
    pub facing: Option<UnitQuaternion<f64>>,
    pub scale: f64,
    pub in_collection_range: bool,
    pub indicator: Option<IndicatorPlacement>,
    pub distance_band: DistanceBand,
    pub message: String,
    pub color: Rgba,
    pub radar: Option<RadarOffset>,
    pub blip: BlipStyle,
}

struct Active {
    target: TargetObject,
    state: TrackingState,
}

/// Tracks one target at a time against a location feed, a heading feed and, optionally, an AR
/// session.
pub struct Tracker<L, H> {
    config: TrackerConfig,
    location: L,
    heading: H,
    session: Option<Box<dyn ArSession>>,
    positioner: CoinPositioner,
    display: DisplayModeEngine,
    indicator: DirectionIndicator,
    radar: RadarProjector,
    active: Option<Active>,
    /// Set when the fix changed or a new target needs its first distance.
    location_dirty: bool,
    bus: EventBus,
    pending: Vec<TrackingEvent>,
}

impl<L, H> fmt::Debug for Tracker<L, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("has_ar_session", &self.session.is_some())
            .field("target", &self.active.as_ref().map(|a| &a.target.id))
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl<L, H> Tracker<L, H>
where
    L: LocationSource,
    H: HeadingSource,
{
    /// Builds a tracker without AR support; see [`with_ar_session`](Self::with_ar_session).
    pub fn new(config: TrackerConfig, location: L, heading: H) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::debug!(?config, "tracker configured");
        Ok(Self {
            positioner: CoinPositioner::new(config.positioner),
            display: DisplayModeEngine::new(config.display),
            indicator: DirectionIndicator::new(config.indicator),
            radar: RadarProjector::new(config.radar),
            config,
            location,
            heading,
            session: None,
            active: None,
            location_dirty: true,
            bus: EventBus::new(),
            pending: Vec::new(),
        })
    }

    /// Enables surface anchoring through `session`.
    #[must_use]
    pub fn with_ar_session(mut self, session: impl ArSession + 'static) -> Self {
        self.set_ar_session(Some(Box::new(session)));
        self
    }

    /// Swaps the AR session. Anything anchored through the previous one is released first.
    pub fn set_ar_session(&mut self, session: Option<Box<dyn ArSession>>) {
        if let Some(active) = &mut self.active {
            self.positioner
                .release(&mut active.state, self.session.as_deref_mut());
        }
        self.session = session;
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn location_mut(&mut self) -> &mut L {
        &mut self.location
    }

    pub fn heading_mut(&mut self) -> &mut H {
        &mut self.heading
    }

    #[must_use]
    pub fn target(&self) -> Option<&TargetObject> {
        self.active.as_ref().map(|active| &active.target)
    }

    #[must_use]
    pub fn state(&self) -> Option<&TrackingState> {
        self.active.as_ref().map(|active| &active.state)
    }

    /// Registers a listener for [`TrackingEvent`]s until the subscription is dropped.
    #[must_use = "the listener is removed as soon as the subscription is dropped"]
    pub fn subscribe(&self, listener: impl FnMut(&TrackingEvent) + 'static) -> Subscription {
        self.bus.subscribe(listener)
    }

    /// Makes `target` the one being hunted, replacing any previous one.
    pub fn set_target(&mut self, target: TargetObject) {
        self.clear_target();
        tracing::info!(target_id = %target.id, tier = %target.tier, locked = target.is_locked, "target set");
        self.pending.push(TrackingEvent::TargetSet {
            id: target.id.clone(),
        });
        self.active = Some(Active {
            state: TrackingState::new(target.id.clone()),
            target,
        });
        self.location_dirty = true;
    }

    /// Stops hunting the current target, releasing its anchor. Returns the target, if any.
    pub fn clear_target(&mut self) -> Option<TargetObject> {
        let mut active = self.active.take()?;
        self.positioner
            .release(&mut active.state, self.session.as_deref_mut());
        self.indicator.reset();
        tracing::info!(target_id = %active.target.id, mode = %active.state.current_mode, "target cleared");
        self.pending.push(TrackingEvent::TargetCleared {
            id: active.target.id.clone(),
        });
        Some(active.target)
    }

    /// Advances everything by `dt` and produces this frame's render state.
    ///
    /// `camera` is `None` when the AR session is not tracking this frame.
    pub fn frame(
        &mut self,
        dt: Duration,
        camera: Option<&CameraPose>,
        viewport: &Viewport,
    ) -> FrameOutput {
        if self.location.poll_update() {
            self.location_dirty = true;
        }
        let heading_changed = self.heading.poll_update();
        let heading = self.heading.sample();
        let heading_degrees = heading.or_north();
        if heading_changed {
            tracing::trace!(
                heading_deg = heading.degrees_from_north,
                available = heading.is_available,
                "heading updated"
            );
        }
        let refresh_gps = std::mem::take(&mut self.location_dirty);
        let mut events = std::mem::take(&mut self.pending);

        let target = self.active.as_mut().map(|active| {
            if refresh_gps {
                let player = self.location.latest();
                self.positioner
                    .update_gps(&mut active.state, player.as_ref(), &active.target.location);
            }
            self.positioner.update_placement(
                &mut active.state,
                heading_degrees,
                camera,
                self.session.as_deref_mut(),
            );
            self.display
                .update(&mut active.state, camera, viewport, dt, &mut events);
            let indicator =
                self.indicator
                    .update(&active.state, heading_degrees, camera, viewport, dt);
            let radar = self.radar.project_state(&active.state, heading_degrees);
            target_frame(active, indicator, radar, &self.config)
        });

        for event in &events {
            self.bus.publish(event);
        }
        if let Some(target) = &target {
            tracing::trace!(
                target_id = %target.target_id,
                mode = %target.mode,
                scale = target.scale,
                stale = target.is_stale,
                heading_deg = heading_degrees
            );
        }

        FrameOutput {
            heading,
            north_marker: self
                .radar
                .north_marker(Angle::new::<degree>(heading_degrees)),
            target,
            events,
        }
    }
}

fn target_frame(
    active: &Active,
    indicator: Option<IndicatorPlacement>,
    radar: Option<RadarOffset>,
    config: &TrackerConfig,
) -> TargetFrame {
    let state = &active.state;
    let distance = state.gps_distance();
    let bearing = state.gps_bearing();
    let band = DistanceBand::classify(distance, &config.display);
    TargetFrame {
        target_id: state.target_id.clone(),
        mode: state.current_mode,
        target_mode: state.target_mode,
        transition_progress: state.transition_progress,
        weights: mode_weights(state),
        distance,
        bearing,
        cardinal: bearing.map(CardinalDirection::from_bearing),
        is_stale: state.is_stale,
        position: state.ar_local_position,
        facing: state.facing,
        scale: state.current_scale,
        in_collection_range: state.is_in_collection_range,
        indicator,
        distance_band: band,
        message: band.message(distance),
        color: band.color(),
        radar,
        blip: BlipStyle::new(&active.target, state.is_in_collection_range),
    }
}
