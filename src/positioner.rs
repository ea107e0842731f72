//! Reconciles the target's fixed GPS location with the drifting AR tracking frame.
//!
//! Every frame the positioner refreshes the GPS distance and bearing from the latest player fix
//! and decides where the object sits in the tracking frame:
//!
//! - Near targets with a detected floor get pinned to it through an [anchor](crate::ar::Anchor).
//!   Once anchored, the position is never re-derived, so tracking drift cannot move it.
//! - Everything else is placed relative to the camera along the GPS bearing, re-derived every
//!   frame. That position is only good enough for billboard rendering.

use crate::ar::{billboard_rotation, AnchorPoll, ArSession, CameraPose};
use crate::geo_math;
use crate::tracking::{Placement, TargetObject, TrackingState};
use crate::GeoPoint;
use nalgebra::{Point3, UnitQuaternion};
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for GPS refresh and AR placement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PositionerConfig {
    /// GPS distance under which the target may be anchored, and how far from the camera a
    /// surface may be to anchor onto.
    pub anchor_range: Length,
    /// GPS distance beyond which an existing anchor is released again.
    pub anchor_release_distance: Length,
    /// How far along the camera's view an anchored object is placed.
    pub placement_distance: Length,
    /// Extra horizontal push away from the camera after dropping onto the surface.
    pub placement_bias: Length,
    /// Camera-relative placements are kept within `[min, max]` meters of the camera.
    pub camera_relative_min: Length,
    pub camera_relative_max: Length,
    /// Fixes with a worse horizontal accuracy are treated as missing. `None` accepts all fixes.
    pub max_fix_accuracy: Option<Length>,
    /// Frames to wait after a failed anchor request before trying again.
    pub anchor_retry_frames: u32,
}

impl Default for PositionerConfig {
    fn default() -> Self {
        Self {
            anchor_range: Length::new::<meter>(20.),
            anchor_release_distance: Length::new::<meter>(40.),
            placement_distance: Length::new::<meter>(2.),
            placement_bias: Length::new::<meter>(0.5),
            camera_relative_min: Length::new::<meter>(2.),
            camera_relative_max: Length::new::<meter>(10.),
            max_fix_accuracy: None,
            anchor_retry_frames: 30,
        }
    }
}

/// Keeps a [`TrackingState`]'s GPS numbers and AR placement current.
#[derive(Debug, Clone)]
pub struct CoinPositioner {
    config: PositionerConfig,
}

impl CoinPositioner {
    #[must_use]
    pub fn new(config: PositionerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PositionerConfig {
        &self.config
    }

    /// Refreshes both the GPS numbers and the AR placement for this frame.
    pub fn update(
        &self,
        state: &mut TrackingState,
        player: Option<&GeoPoint>,
        target: &TargetObject,
        heading_degrees: f64,
        camera: Option<&CameraPose>,
        session: Option<&mut (dyn ArSession + '_)>,
    ) {
        self.update_gps(state, player, &target.location);
        self.update_placement(state, heading_degrees, camera, session);
    }

    /// Recomputes distance and bearing from the player's fix.
    ///
    /// Without a usable fix the previous values are kept and the state is marked stale. Returns
    /// whether the values were refreshed.
    pub fn update_gps(
        &self,
        state: &mut TrackingState,
        player: Option<&GeoPoint>,
        target: &GeoPoint,
    ) -> bool {
        let Some(player) = player.filter(|fix| self.accepts(fix)) else {
            state.is_stale = true;
            return false;
        };

        let distance = geo_math::distance_meters(player, target);
        let bearing = geo_math::bearing_degrees(player, target);
        if !distance.is_finite() || !bearing.is_finite() {
            tracing::warn!(target_id = %state.target_id, "discarding non-finite GPS geometry");
            state.is_stale = true;
            return false;
        }

        state.gps_distance_m = Some(distance.max(0.));
        state.gps_bearing_deg = Some(bearing);
        state.is_stale = false;
        tracing::trace!(target_id = %state.target_id, distance_m = distance, bearing_deg = bearing);
        true
    }

    fn accepts(&self, fix: &GeoPoint) -> bool {
        match self.config.max_fix_accuracy {
            Some(limit) if fix.horizontal_accuracy() > limit => {
                tracing::debug!(
                    accuracy_m = fix.horizontal_accuracy().get::<meter>(),
                    limit_m = limit.get::<meter>(),
                    "ignoring imprecise fix"
                );
                false
            }
            _ => true,
        }
    }

    /// Decides where the object sits in the tracking frame this frame.
    pub fn update_placement(
        &self,
        state: &mut TrackingState,
        heading_degrees: f64,
        camera: Option<&CameraPose>,
        mut session: Option<&mut (dyn ArSession + '_)>,
    ) {
        state.anchor_retry_in = state.anchor_retry_in.saturating_sub(1);

        // walked away from an anchored (or anchoring) object: let go of it
        if let (Some(id), Some(distance)) = (state.placement.anchor_id(), state.gps_distance_m) {
            if distance > self.config.anchor_release_distance.get::<meter>() {
                tracing::info!(target_id = %state.target_id, anchor = %id, distance_m = distance, "releasing anchor, target out of range");
                self.release(state, session.as_deref_mut());
            }
        }

        match state.placement {
            Placement::Anchored(anchor) => {
                state.ar_local_position = Some(anchor.position);
                return;
            }
            Placement::Pending(id) => match session.as_deref_mut().map(|s| s.poll_anchor(id)) {
                Some(AnchorPoll::Ready(anchor)) => {
                    tracing::info!(target_id = %state.target_id, anchor = %anchor.id, "anchor ready");
                    state.placement = Placement::Anchored(anchor);
                    state.ar_local_position = Some(anchor.position);
                    return;
                }
                Some(AnchorPoll::Pending) => {}
                Some(AnchorPoll::Failed) | None => {
                    tracing::warn!(target_id = %state.target_id, anchor = %id, "anchor request failed");
                    state.placement = Placement::Unplaced;
                    state.anchor_retry_in = self.config.anchor_retry_frames;
                }
            },
            Placement::Unplaced | Placement::CameraRelative => {
                if let (Some(camera), Some(session)) = (camera, session.as_deref_mut()) {
                    self.try_anchor(state, camera, session);
                }
            }
        }

        // until an anchor resolves, keep the object in view next to the camera
        match camera.and_then(|camera| self.camera_relative_position(state, heading_degrees, camera)) {
            Some(position) => {
                state.ar_local_position = Some(position);
                if !matches!(state.placement, Placement::Pending(_)) {
                    state.placement = Placement::CameraRelative;
                }
            }
            None if camera.is_none() => {
                state.ar_local_position = None;
                if !matches!(state.placement, Placement::Pending(_)) {
                    state.placement = Placement::Unplaced;
                }
            }
            // degenerate camera direction: keep last frame's position
            None => {}
        }
    }

    fn try_anchor(&self, state: &mut TrackingState, camera: &CameraPose, session: &mut dyn ArSession) {
        if state.anchor_retry_in > 0 {
            return;
        }
        let anchor_range = self.config.anchor_range.get::<meter>();
        let near_enough = state.gps_distance_m.is_some_and(|d| d <= anchor_range);
        if !near_enough {
            return;
        }
        let Some(plane) = session.nearest_horizontal_plane(camera, anchor_range) else {
            return;
        };
        let Some(horizontal) = camera.horizontal_forward() else {
            // looking straight up or down; try again next frame
            return;
        };

        let mut position =
            camera.position + camera.forward() * self.config.placement_distance.get::<meter>();
        position.y = plane.height();
        position += horizontal.into_inner() * self.config.placement_bias.get::<meter>();

        let rotation =
            billboard_rotation(&position, &camera.position).unwrap_or_else(UnitQuaternion::identity);
        let id = session.request_anchor(position, rotation);
        tracing::debug!(
            target_id = %state.target_id,
            anchor = %id,
            x = position.x,
            y = position.y,
            z = position.z,
            "requested anchor"
        );
        state.placement = Placement::Pending(id);
    }

    fn camera_relative_position(
        &self,
        state: &TrackingState,
        heading_degrees: f64,
        camera: &CameraPose,
    ) -> Option<Point3<f64>> {
        let bearing = state.gps_bearing_deg?;
        let distance = state.gps_distance_m?;
        let relative = geo_math::relative_bearing_degrees(bearing, heading_degrees);
        let direction = camera.horizontal_direction(relative)?;
        let range = distance.clamp(
            self.config.camera_relative_min.get::<meter>(),
            self.config.camera_relative_max.get::<meter>(),
        );
        Some(camera.position + direction.into_inner() * range)
    }

    /// Lets go of any anchor or anchor request held by `state`.
    pub fn release(&self, state: &mut TrackingState, session: Option<&mut (dyn ArSession + '_)>) {
        if let Some(id) = state.placement.anchor_id() {
            match session {
                Some(session) => session.release_anchor(id),
                None => tracing::warn!(anchor = %id, "no AR session to release anchor with"),
            }
        }
        state.placement = Placement::Unplaced;
        state.ar_local_position = None;
    }
}
