//! The on-screen arrow that points the player towards the target.
//!
//! Each frame the indicator works out the target's bearing relative to where the player is
//! looking, suppresses small jitter with a deadzone, smooths what is left with a critically damped
//! angular follower and decides (with hysteresis) whether the target counts as on-screen. From
//! that it lays out a badge: centred near the bottom while on-screen, otherwise pinned to the
//! left or right edge, climbing towards the top as the target swings behind the player.

use crate::ar::{CameraPose, Viewport};
use crate::display_mode::DisplayConfig;
use crate::geo_math::{self, format_distance};
use crate::smoothing::SmoothDamp;
use crate::tracking::TrackingState;
use crate::util::{lerp, sanitize};
use std::fmt;
use std::time::Duration;
use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for [`DirectionIndicator`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IndicatorConfig {
    /// Relative bearings smaller than this are reported as exactly zero.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub deadzone: Angle,
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_seconds"))]
    pub smooth_time: Duration,
    /// Widest relative bearing still treated as on-screen. Narrow fields of view lower it further.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub on_screen_threshold: Angle,
    /// Half-width of the band around the threshold in which the on-screen flag holds its value.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub hysteresis: Angle,
    /// Relative bearing past which the target counts as behind the player.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub behind_threshold: Angle,
    /// Within this distance the camera-to-object angle is used instead of the GPS bearing, when
    /// the object has a position in the AR scene.
    pub near_approach_distance: Length,
    /// Vertical position of the on-screen badge, as a fraction of the viewport height from the
    /// top.
    pub bottom_anchor_fraction: f64,
    /// Distance kept from the viewport edges.
    pub edge_margin_px: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            deadzone: Angle::new::<degree>(4.),
            smooth_time: Duration::from_millis(120),
            on_screen_threshold: Angle::new::<degree>(25.),
            hysteresis: Angle::new::<degree>(5.),
            behind_threshold: Angle::new::<degree>(90.),
            near_approach_distance: Length::new::<meter>(15.),
            bottom_anchor_fraction: 0.8,
            edge_margin_px: 48.,
        }
    }
}

/// A position in screen pixels, origin top-left, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for ScreenPoint {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // pixels; anything below half a pixel is invisible
        0.5
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.x.abs_diff_eq(&other.x, epsilon) && self.y.abs_diff_eq(&other.y, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for ScreenPoint {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.x.relative_eq(&other.x, epsilon, max_relative)
            && self.y.relative_eq(&other.y, epsilon, max_relative)
    }
}

/// The viewport edge an off-screen indicator is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScreenEdge {
    Left,
    Right,
    /// The target is behind the player.
    Top,
}

/// Where and how to draw the indicator this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndicatorPlacement {
    pub position: ScreenPoint,
    pub on_screen: bool,
    /// `None` while on-screen.
    pub edge: Option<ScreenEdge>,
    /// Smoothed relative bearing; rotate an "up" arrow clockwise by this much.
    #[cfg_attr(feature = "serde", serde(with = "crate::util::serde_degrees"))]
    pub arrow_angle: Angle,
}

/// Per-target arrow state. [`reset`](Self::reset) it when the target changes.
#[derive(Debug, Clone)]
pub struct DirectionIndicator {
    config: IndicatorConfig,
    damp: SmoothDamp,
    smoothed: Option<f64>,
    velocity: f64,
    on_screen: bool,
}

impl DirectionIndicator {
    #[must_use]
    pub fn new(config: IndicatorConfig) -> Self {
        Self {
            damp: SmoothDamp::new(config.smooth_time),
            config,
            smoothed: None,
            velocity: 0.,
            on_screen: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Forgets all smoothing and hysteresis state.
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.velocity = 0.;
        self.on_screen = false;
    }

    /// The smoothed relative bearing in degrees, (-180, 180], if one has been computed.
    #[must_use]
    pub fn relative_bearing_degrees(&self) -> Option<f64> {
        self.smoothed
    }

    #[must_use]
    pub fn is_on_screen(&self) -> bool {
        self.on_screen
    }

    /// Advances the indicator by `dt` and lays it out for `viewport`.
    ///
    /// Returns `None` when there is nothing to point along (no bearing has ever been known).
    pub fn update(
        &mut self,
        state: &TrackingState,
        heading_degrees: f64,
        camera: Option<&CameraPose>,
        viewport: &Viewport,
        dt: Duration,
    ) -> Option<IndicatorPlacement> {
        let Some(raw) = self.raw_relative_bearing(state, heading_degrees, camera) else {
            return self.layout(viewport);
        };
        self.step(raw, viewport, dt);
        self.layout(viewport)
    }

    /// Feeds one raw relative bearing (degrees, positive = right).
    pub fn step(&mut self, raw_degrees: f64, viewport: &Viewport, dt: Duration) {
        let deadzone = self.config.deadzone.get::<degree>();
        let raw = geo_math::relative_bearing_degrees(raw_degrees, 0.);
        let raw = if raw.abs() < deadzone { 0. } else { raw };
        let mut smoothed = match self.smoothed {
            Some(previous) => self.damp.step_angle(previous, raw, &mut self.velocity, dt),
            None => raw,
        };
        if raw == 0. && smoothed.abs() < deadzone {
            // settled inside the deadzone
            smoothed = 0.;
            self.velocity = 0.;
        }
        self.smoothed = Some(smoothed);

        let was_on_screen = self.on_screen;
        self.on_screen = on_screen_with_hysteresis(
            was_on_screen,
            smoothed.abs(),
            self.threshold(viewport),
            self.config.hysteresis.get::<degree>(),
        );
        if self.on_screen != was_on_screen {
            tracing::trace!(relative_deg = smoothed, on_screen = self.on_screen, "indicator flipped");
        }
    }

    fn raw_relative_bearing(
        &self,
        state: &TrackingState,
        heading_degrees: f64,
        camera: Option<&CameraPose>,
    ) -> Option<f64> {
        let near = state
            .gps_distance_m
            .is_some_and(|d| d <= self.config.near_approach_distance.get::<meter>());
        if near {
            let precise = camera
                .zip(state.ar_local_position)
                .and_then(|(camera, position)| camera.horizontal_angle_to(&position));
            if precise.is_some() {
                return precise;
            }
        }
        state
            .gps_bearing_deg
            .map(|bearing| geo_math::relative_bearing_degrees(bearing, heading_degrees))
    }

    fn threshold(&self, viewport: &Viewport) -> f64 {
        let configured = self.config.on_screen_threshold.get::<degree>();
        if viewport.is_usable() {
            configured.min(viewport.half_horizontal_fov_degrees())
        } else {
            configured
        }
    }

    /// Lays out the current state for `viewport`, eg after the device rotated.
    #[must_use]
    pub fn layout(&self, viewport: &Viewport) -> Option<IndicatorPlacement> {
        let angle = self.smoothed?;
        let width = viewport.width_px.max(0.);
        let height = viewport.height_px.max(0.);
        let margin = self.config.edge_margin_px.max(0.);
        let center_x = width / 2.;
        let bottom_y = height * self.config.bottom_anchor_fraction.clamp(0., 1.);

        let (x, y, edge) = if self.on_screen {
            (center_x, bottom_y, None)
        } else {
            let magnitude = angle.abs();
            let (side_x, side) = if angle < 0. {
                (margin, ScreenEdge::Left)
            } else {
                (width - margin, ScreenEdge::Right)
            };
            let threshold = self.threshold(viewport);
            let behind = self.config.behind_threshold.get::<degree>().max(threshold);
            if magnitude <= behind {
                let t = fraction(magnitude, threshold, behind);
                (side_x, lerp(bottom_y, margin, t), Some(side))
            } else {
                let t = fraction(magnitude, behind, 180.);
                (lerp(side_x, center_x, t), margin, Some(ScreenEdge::Top))
            }
        };

        Some(IndicatorPlacement {
            position: clamp_to_viewport(ScreenPoint::new(x, y), width, height, margin),
            on_screen: self.on_screen,
            edge,
            arrow_angle: Angle::new::<degree>(angle),
        })
    }
}

/// Whether the target is on-screen this frame, given whether it was last frame.
///
/// Entering requires the angle to drop below `threshold - hysteresis`; leaving requires it to
/// exceed `threshold + hysteresis`.
fn on_screen_with_hysteresis(was_on_screen: bool, angle: f64, threshold: f64, hysteresis: f64) -> bool {
    if was_on_screen {
        angle <= threshold + hysteresis
    } else {
        angle <= (threshold - hysteresis).max(0.)
    }
}

/// Where `value` lies between `from` and `to`, clamped to [0, 1].
fn fraction(value: f64, from: f64, to: f64) -> f64 {
    if to > from {
        ((value - from) / (to - from)).clamp(0., 1.)
    } else {
        1.
    }
}

fn clamp_to_viewport(point: ScreenPoint, width: f64, height: f64, margin: f64) -> ScreenPoint {
    let clamp = |value: f64, extent: f64| {
        if extent <= 2. * margin {
            extent / 2.
        } else {
            sanitize(value, margin, extent - margin)
        }
    };
    ScreenPoint::new(clamp(point.x, width), clamp(point.y, height))
}

/// An RGBA color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1. }
    }

    #[must_use]
    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// How close the target is, for colouring and labelling the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistanceBand {
    InRange,
    VeryNear,
    Near,
    Far,
    /// No fix yet.
    Unknown,
}

impl DistanceBand {
    /// Buckets `distance` against the display thresholds. Independent of bearing.
    #[must_use]
    pub fn classify(distance: Option<Length>, config: &DisplayConfig) -> Self {
        let Some(distance) = distance.map(|d| d.get::<meter>()) else {
            return Self::Unknown;
        };
        let collection = config.collection_distance.get::<meter>();
        let billboard = config.billboard_distance.get::<meter>();
        if distance <= collection {
            Self::InRange
        } else if distance <= billboard {
            Self::VeryNear
        } else if distance <= 2. * billboard {
            Self::Near
        } else {
            Self::Far
        }
    }

    #[must_use]
    pub fn color(self) -> Rgba {
        match self {
            Self::InRange => Rgba::rgb(0.2, 0.9, 0.3),
            Self::VeryNear => Rgba::rgb(1., 0.84, 0.),
            Self::Near => Rgba::rgb(1., 0.55, 0.1),
            Self::Far => Rgba::rgb(0.9, 0.25, 0.2),
            Self::Unknown => Rgba::rgb(0.6, 0.6, 0.6),
        }
    }

    /// Whether the UI should draw attention to the badge (pulse, haptics).
    #[must_use]
    pub fn is_urgent(self) -> bool {
        self == Self::InRange
    }

    /// Label for the badge, including the distance when there is one.
    #[must_use]
    pub fn message(self, distance: Option<Length>) -> String {
        let distance = distance.map(format_distance);
        match (self, distance) {
            (Self::InRange, _) => "In range! Tap to collect".to_owned(),
            (Self::VeryNear, Some(d)) => format!("Very near, {d}"),
            (Self::Near, Some(d)) => format!("Getting close, {d}"),
            (Self::Far, Some(d)) => format!("{d} away"),
            (Self::Unknown, _) | (_, None) => "Waiting for location".to_owned(),
        }
    }
}

impl fmt::Display for DistanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InRange => "in range",
            Self::VeryNear => "very near",
            Self::Near => "near",
            Self::Far => "far",
            Self::Unknown => "unknown",
        })
    }
}
