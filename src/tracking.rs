use crate::ar::{Anchor, AnchorId};
use crate::display_mode::DisplayMode;
use crate::GeoPoint;
use nalgebra::{Point3, UnitQuaternion};
use std::fmt;
use uom::si::f64::{Angle, Length};
use uom::si::{angle::degree, length::meter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rarity class of a target. Only used for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoinTier {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for CoinTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        };
        f.write_str(name)
    }
}

/// The object being hunted, as handed to us by whoever owns the hunt.
///
/// It is read, never modified.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetObject {
    pub id: String,
    pub location: GeoPoint,
    pub is_locked: bool,
    pub tier: CoinTier,
    pub value_hint: f64,
}

impl TargetObject {
    /// An unlocked common target at `location`.
    #[must_use]
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
            is_locked: false,
            tier: CoinTier::default(),
            value_hint: 0.,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: CoinTier) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub fn locked(mut self, is_locked: bool) -> Self {
        self.is_locked = is_locked;
        self
    }

    #[must_use]
    pub fn with_value_hint(mut self, value_hint: f64) -> Self {
        self.value_hint = value_hint;
        self
    }
}

/// How the target is currently placed in the AR tracking frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Placement {
    /// No meaningful AR position (no camera, or the direction was degenerate this frame).
    #[default]
    Unplaced,
    /// Re-derived every frame from the camera and the GPS bearing.
    CameraRelative,
    /// An anchor has been requested at the stored position and has not resolved yet.
    Pending(AnchorId),
    /// Pinned to a surface; the position is never re-derived.
    Anchored(Anchor),
}

impl Placement {
    #[must_use]
    pub fn anchor(&self) -> Option<&Anchor> {
        match self {
            Self::Anchored(anchor) => Some(anchor),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_anchored(&self) -> bool {
        matches!(self, Self::Anchored(_))
    }

    /// The anchor (or anchor request) that has to be released when this placement is dropped.
    pub(crate) fn anchor_id(&self) -> Option<AnchorId> {
        match self {
            Self::Pending(id) => Some(*id),
            Self::Anchored(anchor) => Some(anchor.id),
            _ => None,
        }
    }
}

/// Everything tracked about the single active target, updated once per frame.
///
/// Created when a target becomes active and dropped when it is cleared or replaced.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TrackingState {
    pub(crate) target_id: String,

    pub(crate) gps_distance_m: Option<f64>,
    pub(crate) gps_bearing_deg: Option<f64>,
    pub(crate) is_stale: bool,

    pub(crate) placement: Placement,
    pub(crate) ar_local_position: Option<Point3<f64>>,
    pub(crate) facing: Option<UnitQuaternion<f64>>,
    /// Frames to wait before asking for another anchor after a failed request.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) anchor_retry_in: u32,

    pub(crate) current_mode: DisplayMode,
    pub(crate) target_mode: DisplayMode,
    pub(crate) transition_progress: f64,
    pub(crate) current_scale: f64,
    pub(crate) scale_velocity: f64,

    pub(crate) is_in_collection_range: bool,
}

impl TrackingState {
    pub(crate) fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            gps_distance_m: None,
            gps_bearing_deg: None,
            is_stale: true,
            placement: Placement::Unplaced,
            ar_local_position: None,
            facing: None,
            anchor_retry_in: 0,
            current_mode: DisplayMode::Hidden,
            target_mode: DisplayMode::Hidden,
            transition_progress: 1.,
            current_scale: 0.,
            scale_velocity: 0.,
            is_in_collection_range: false,
        }
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Great-circle distance from the player to the target, or `None` before the first fix.
    ///
    /// While [`is_stale`](Self::is_stale), this is the last known value.
    #[must_use]
    pub fn gps_distance(&self) -> Option<Length> {
        self.gps_distance_m.map(Length::new::<meter>)
    }

    /// Bearing from the player to the target, or `None` before the first fix.
    #[must_use]
    pub fn gps_bearing(&self) -> Option<Angle> {
        self.gps_bearing_deg.map(Angle::new::<degree>)
    }

    /// `true` when the distance and bearing were not refreshed from a current fix this frame.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Where the object sits in the AR tracking frame, when that is meaningful.
    #[must_use]
    pub fn ar_local_position(&self) -> Option<Point3<f64>> {
        self.ar_local_position
    }

    /// Orientation to render the object with, if one could be determined.
    #[must_use]
    pub fn facing(&self) -> Option<UnitQuaternion<f64>> {
        self.facing
    }

    #[must_use]
    pub fn current_mode(&self) -> DisplayMode {
        self.current_mode
    }

    #[must_use]
    pub fn target_mode(&self) -> DisplayMode {
        self.target_mode
    }

    /// Progress of the cross-fade from [`current_mode`](Self::current_mode) to
    /// [`target_mode`](Self::target_mode), in [0, 1].
    #[must_use]
    pub fn transition_progress(&self) -> f64 {
        self.transition_progress
    }

    /// World-space scale to render the object with.
    #[must_use]
    pub fn current_scale(&self) -> f64 {
        self.current_scale
    }

    #[must_use]
    pub fn is_in_collection_range(&self) -> bool {
        self.is_in_collection_range
    }

    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.transition_progress < 1.
    }
}
