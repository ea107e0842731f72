//! The local AR tracking frame and the collaborators that live in it.
//!
//! Positions in the tracking frame are plain [`nalgebra`] points in meters. The frame is
//! right-handed with +Y up, and an unrotated camera looks along −Z. Nothing here knows about
//! latitude or longitude; the tracking frame drifts relative to the earth, which is exactly why
//! placement in it goes through [anchors](ArSession::request_anchor).

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use std::fmt;
use uom::si::angle::degree;
use uom::si::f64::Angle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Below this horizontal length (in meters) a direction is treated as degenerate.
pub(crate) const DEGENERATE_LENGTH: f64 = 1e-6;

/// Where the AR camera is and how it is rotated, in the tracking frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraPose {
    pub position: Point3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl CameraPose {
    #[must_use]
    pub fn new(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// A camera at `position` turned `yaw` clockwise (seen from above) from the frame's −Z axis,
    /// held level.
    #[must_use]
    pub fn level(position: Point3<f64>, yaw: Angle) -> Self {
        // rotating about +Y by a positive angle turns −Z towards −X, ie to the left
        let rotation =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -yaw.get::<uom::si::angle::radian>());
        Self { position, rotation }
    }

    /// Unit vector the camera is looking along.
    #[must_use]
    pub fn forward(&self) -> Vector3<f64> {
        self.rotation * -Vector3::z()
    }

    /// The camera's forward direction projected onto the horizontal plane.
    ///
    /// Returns `None` when the camera points (nearly) straight up or down.
    #[must_use]
    pub fn horizontal_forward(&self) -> Option<Unit<Vector3<f64>>> {
        horizontal(self.forward())
    }

    /// Clockwise angle, in degrees, from the frame's −Z axis to [`horizontal_forward`].
    ///
    /// [`horizontal_forward`]: Self::horizontal_forward
    #[must_use]
    pub fn yaw_degrees(&self) -> Option<f64> {
        self.horizontal_forward().map(|f| yaw_of(&f))
    }

    /// Signed horizontal angle, in degrees, from the camera's facing to `point`.
    ///
    /// Positive means `point` is to the right. Returns `None` when either direction is
    /// degenerate (the point is straight above/below the camera, or the camera looks straight
    /// up/down).
    #[must_use]
    pub fn horizontal_angle_to(&self, point: &Point3<f64>) -> Option<f64> {
        let forward = self.yaw_degrees()?;
        let towards = horizontal(point - self.position).map(|d| yaw_of(&d))?;
        Some(crate::util::signed_degrees(towards - forward))
    }

    /// Straight-line distance from the camera to `point`.
    #[must_use]
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        nalgebra::distance(&self.position, point)
    }

    /// Direction on the horizontal plane obtained by turning `relative` degrees clockwise from
    /// the camera's horizontal forward.
    #[must_use]
    pub fn horizontal_direction(&self, relative_degrees: f64) -> Option<Unit<Vector3<f64>>> {
        let forward = self.horizontal_forward()?;
        let turn = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -relative_degrees.to_radians());
        Some(Unit::new_normalize(turn * forward.into_inner()))
    }
}

/// Clockwise yaw of a horizontal direction, measured from −Z.
fn yaw_of(direction: &Vector3<f64>) -> f64 {
    // −Z is 0°, +X is 90°
    direction.x.atan2(-direction.z).to_degrees()
}

fn horizontal(v: Vector3<f64>) -> Option<Unit<Vector3<f64>>> {
    let flat = Vector3::new(v.x, 0., v.z);
    Unit::try_new(flat, DEGENERATE_LENGTH)
}

/// The rendering surface the scene is projected onto.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub width_px: f64,
    pub height_px: f64,
    /// Vertical field of view of the AR camera.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub vertical_fov: Angle,
}

impl Viewport {
    #[must_use]
    pub fn new(width_px: f64, height_px: f64, vertical_fov: Angle) -> Self {
        Self {
            width_px,
            height_px,
            vertical_fov,
        }
    }

    /// Half of the horizontal field of view, derived from the vertical one and the aspect ratio.
    #[must_use]
    pub fn half_horizontal_fov_degrees(&self) -> f64 {
        if self.height_px <= 0. {
            return 0.;
        }
        let half_vertical = self.vertical_fov.get::<uom::si::angle::radian>() / 2.;
        let aspect = self.width_px / self.height_px;
        (half_vertical.tan() * aspect).atan().to_degrees()
    }

    /// Whether the viewport can be projected onto at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.width_px > 0.
            && self.height_px > 0.
            && self.vertical_fov.get::<degree>() > 0.
            && self.vertical_fov.get::<degree>() < 180.
    }
}

/// A horizontal support surface reported by the AR session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HorizontalPlane {
    /// Some point on the plane, typically the centre of its detected extent.
    pub center: Point3<f64>,
}

impl HorizontalPlane {
    /// Height of the plane in the tracking frame.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.center.y
    }
}

/// Identifies an anchor request and, once resolved, the anchor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnchorId(pub u64);

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchor#{}", self.0)
    }
}

/// A pose pinned to a physical surface. Once created, its pose is fixed in the tracking frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Anchor {
    pub id: AnchorId,
    pub position: Point3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

/// Outcome of polling an outstanding anchor request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorPoll {
    Pending,
    Ready(Anchor),
    Failed,
}

/// Surface detection and anchoring provided by the platform's AR runtime.
///
/// Anchoring is two-phase: [`request_anchor`](Self::request_anchor) returns immediately, and the
/// anchor is picked up by [`poll_anchor`](Self::poll_anchor) on some later frame. Requests that
/// are no longer wanted (eg, because the target was cleared) are handed back through
/// [`release_anchor`](Self::release_anchor), which must also cancel a request that is still
/// pending.
pub trait ArSession {
    /// The nearest trackable horizontal plane within `max_distance` meters of the camera, if any.
    fn nearest_horizontal_plane(
        &self,
        camera: &CameraPose,
        max_distance: f64,
    ) -> Option<HorizontalPlane>;

    fn request_anchor(&mut self, position: Point3<f64>, rotation: UnitQuaternion<f64>) -> AnchorId;

    fn poll_anchor(&mut self, id: AnchorId) -> AnchorPoll;

    fn release_anchor(&mut self, id: AnchorId);
}

/// Rotation about +Y that turns an object's +Z axis towards `camera`, keeping it upright.
///
/// Returns `None` when the camera is (nearly) straight above or below the object, in which case
/// the caller should keep whatever orientation it had.
#[must_use]
pub fn billboard_rotation(object: &Point3<f64>, camera: &Point3<f64>) -> Option<UnitQuaternion<f64>> {
    let towards = horizontal(camera - object)?;
    let yaw = towards.x.atan2(towards.z);
    Some(UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw))
}
