//! The 2D radar overlay: a disc with the player at the centre and "forward" pointing up.

use crate::indicator::Rgba;
use crate::tracking::{CoinTier, TargetObject, TrackingState};
use crate::util::sanitize;
use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Size of the radar disc on screen and how much of the world it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RadarConfig {
    pub radius_px: f64,
    /// Real-world distance that maps onto the rim of the disc.
    pub range: Length,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            radius_px: 80.,
            range: Length::new::<meter>(100.),
        }
    }
}

/// Pixel offset from the centre of the radar disc.
///
/// `+x` is right and `+y` is up (forward); flip `y` for y-down screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RadarOffset {
    pub x: f64,
    pub y: f64,
}

impl RadarOffset {
    #[must_use]
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for RadarOffset {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // NOTE: pixels
        0.5
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.x.abs_diff_eq(&other.x, epsilon) && self.y.abs_diff_eq(&other.y, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for RadarOffset {
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

/// Maps bearing and distance onto the radar disc.
///
/// Stateless: the same inputs always produce the same offset.
#[derive(Debug, Clone)]
pub struct RadarProjector {
    config: RadarConfig,
}

impl RadarProjector {
    #[must_use]
    pub fn new(config: RadarConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RadarConfig {
        &self.config
    }

    /// Offset of a target at `bearing` and `distance` while the device faces `heading`.
    ///
    /// Targets beyond the radar's range are pinned to the rim rather than drawn off the disc.
    #[must_use]
    pub fn project(&self, bearing: Angle, distance: Length, heading: Angle) -> RadarOffset {
        self.project_degrees(
            bearing.get::<degree>(),
            distance.get::<meter>(),
            heading.get::<degree>(),
        )
    }

    pub(crate) fn project_degrees(&self, bearing: f64, distance: f64, heading: f64) -> RadarOffset {
        let radius = sanitize(self.config.radius_px, 0., f64::MAX);
        let range = self.config.range.get::<meter>();
        let fraction = if range > 0. {
            // a NaN distance lands in the centre, an infinite one on the rim
            sanitize(distance / range, 0., 1.)
        } else {
            1.
        };
        let pixel_distance = fraction * radius;

        // the disc turns against the device so that up is always forward
        let adjusted = bearing - heading;
        let (sin, cos) = if adjusted.is_finite() {
            adjusted.to_radians().sin_cos()
        } else {
            (0., 1.)
        };
        RadarOffset {
            x: sanitize(sin * pixel_distance, -radius, radius),
            y: sanitize(cos * pixel_distance, -radius, radius),
        }
    }

    /// The blip for the active target, or `None` if no bearing has been known yet.
    ///
    /// An unknown distance is drawn on the rim: far until proven otherwise.
    #[must_use]
    pub fn project_state(&self, state: &TrackingState, heading_degrees: f64) -> Option<RadarOffset> {
        let bearing = state.gps_bearing_deg?;
        let distance = state.gps_distance_m.unwrap_or(f64::INFINITY);
        Some(self.project_degrees(bearing, distance, heading_degrees))
    }

    /// Where to put the "N" label on the rim while the device faces `heading`.
    #[must_use]
    pub fn north_marker(&self, heading: Angle) -> RadarOffset {
        self.project_degrees(0., f64::INFINITY, heading.get::<degree>())
    }
}

/// How a blip is drawn. Purely a function of the target's flags.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlipStyle {
    pub scale: f64,
    pub color: Rgba,
}

impl BlipStyle {
    #[must_use]
    pub fn new(target: &TargetObject, in_collection_range: bool) -> Self {
        let color = if target.is_locked {
            Rgba::rgb(0.5, 0.5, 0.5).with_alpha(0.7)
        } else {
            tier_color(target.tier)
        };
        let scale = match (target.is_locked, in_collection_range) {
            (true, _) => 0.8,
            (false, true) => 1.5,
            (false, false) => match target.tier {
                CoinTier::Common => 1.,
                CoinTier::Rare => 1.1,
                CoinTier::Epic => 1.2,
                CoinTier::Legendary => 1.3,
            },
        };
        Self { scale, color }
    }
}

fn tier_color(tier: CoinTier) -> Rgba {
    match tier {
        CoinTier::Common => Rgba::rgb(1., 0.84, 0.),
        CoinTier::Rare => Rgba::rgb(0.25, 0.55, 1.),
        CoinTier::Epic => Rgba::rgb(0.65, 0.3, 0.95),
        CoinTier::Legendary => Rgba::rgb(1., 0.5, 0.),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;

    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn radar() -> RadarProjector {
        RadarProjector::new(RadarConfig {
            radius_px: 100.,
            range: m(50.),
        })
    }

    #[rstest]
    #[case(0., 25., 0., RadarOffset { x: 0., y: 50. })]
    #[case(90., 25., 0., RadarOffset { x: 50., y: 0. })]
    #[case(90., 50., 90., RadarOffset { x: 0., y: 100. })]
    #[case(0., 10., 90., RadarOffset { x: -20., y: 0. })]
    #[case(180., 5., 0., RadarOffset { x: 0., y: -10. })]
    fn projects_relative_to_heading(
        #[case] bearing: f64,
        #[case] distance: f64,
        #[case] heading: f64,
        #[case] expected: RadarOffset,
    ) {
        assert_relative_eq!(
            radar().project(d(bearing), m(distance), d(heading)),
            expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn out_of_range_sits_on_the_rim() {
        let offset = radar().project(d(45.), m(5_000.), d(0.));
        assert_relative_eq!(offset.length(), 100., epsilon = 1e-9);
    }

    #[test]
    fn glitches_stay_on_the_disc() {
        let radar = radar();
        for offset in [
            radar.project_degrees(f64::NAN, 10., 0.),
            radar.project_degrees(10., f64::NAN, 0.),
            radar.project_degrees(10., -40., 0.),
            radar.project_degrees(f64::INFINITY, f64::INFINITY, 0.),
        ] {
            assert!(offset.x.is_finite() && offset.y.is_finite());
            assert!(offset.length() <= 100. + 1e-9);
        }
    }

    #[test]
    fn north_marker_turns_against_heading() {
        assert_relative_eq!(
            radar().north_marker(d(90.)),
            RadarOffset { x: -100., y: 0. },
            epsilon = 1e-9
        );
    }

    #[test]
    fn unknown_distance_is_drawn_far() {
        let mut state = TrackingState::new("coin");
        assert!(radar().project_state(&state, 0.).is_none());
        state.gps_bearing_deg = Some(0.);
        let offset = radar().project_state(&state, 0.).expect("bearing is known");
        assert_relative_eq!(offset, RadarOffset { x: 0., y: 100. }, epsilon = 1e-9);
    }

    quickcheck! {
        fn projection_is_idempotent(bearing: f64, distance: f64, heading: f64) -> bool {
            let radar = radar();
            let first = radar.project_degrees(bearing, distance, heading);
            let second = radar.project_degrees(bearing, distance, heading);
            first == second
        }
    }

    #[test]
    fn blip_style_follows_flags() {
        let location = GeoPoint::from_degrees(0., 0.).expect("latitude is in range");
        let common = TargetObject::new("a", location);
        let legendary = TargetObject::new("b", location).with_tier(CoinTier::Legendary);
        let locked = TargetObject::new("c", location)
            .with_tier(CoinTier::Legendary)
            .locked(true);

        assert_eq!(BlipStyle::new(&common, false).scale, 1.);
        assert!(BlipStyle::new(&legendary, false).scale > BlipStyle::new(&common, false).scale);
        assert_eq!(BlipStyle::new(&common, true).scale, 1.5);
        assert_eq!(BlipStyle::new(&locked, true).scale, 0.8);
        assert_ne!(
            BlipStyle::new(&locked, false).color,
            BlipStyle::new(&legendary, false).color
        );
    }
}
