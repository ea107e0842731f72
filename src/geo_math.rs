//! Pure spherical-earth helpers shared by every per-frame component.
//!
//! All functions here treat the earth as a sphere of radius [`EARTH_RADIUS`]. Over the few
//! kilometers a hunt spans this is well within half a percent of the ellipsoidal answer, and it
//! keeps every function cheap enough to call several times per frame.

use crate::util::{signed_degrees, wrap_degrees, BoundedAngle};
use crate::GeoPoint;
use std::fmt;
use uom::si::f64::{Angle, Length};
use uom::si::{
    angle::{degree, radian},
    length::{kilometer, meter},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Computes the [great-circle distance] between two locations in meters.
///
/// The implementation uses the [haversine formulation], which stays well-conditioned for the
/// meter-scale separations that matter at the end of a hunt. The result is symmetric and exactly
/// zero for identical inputs.
///
/// [great-circle distance]: https://en.wikipedia.org/wiki/Great-circle_distance
/// [haversine formulation]: https://en.wikipedia.org/wiki/Haversine_formula#Formulation
#[doc(alias = "haversine")]
#[must_use]
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_a = a.latitude().get::<radian>(); // φ1
    let lat_b = b.latitude().get::<radian>(); // φ2
    let delta_lat = lat_b - lat_a;
    let delta_lon = (b.longitude() - a.longitude()).get::<radian>();

    let h = (delta_lat / 2.).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.).sin().powi(2);
    EARTH_RADIUS * 2. * h.clamp(0., 1.).sqrt().asin()
}

/// [`distance_meters`] as a [`Length`].
#[must_use]
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> Length {
    Length::new::<meter>(distance_meters(a, b))
}

/// Computes the initial bearing (forward azimuth) from `from` towards `to` in degrees.
///
/// The result is measured clockwise from true north and is always in [0, 360). Identical
/// points yield 0.
#[must_use]
pub fn bearing_degrees(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat_a = from.latitude().get::<radian>();
    let lat_b = to.latitude().get::<radian>();
    let delta_lon = (to.longitude() - from.longitude()).get::<radian>();

    let y = delta_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * delta_lon.cos();
    wrap_degrees(y.atan2(x).to_degrees())
}

/// [`bearing_degrees`] as an [`Angle`].
#[must_use]
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> Angle {
    Angle::new::<degree>(bearing_degrees(from, to))
}

/// Signed angular difference `target - reference` in degrees, wrapped to the shortest turn.
///
/// The result is in (-180, 180]. Positive values mean "turn right" (clockwise seen from
/// above); a target exactly behind reads as +180.
#[must_use]
pub fn relative_bearing_degrees(target: f64, reference: f64) -> f64 {
    signed_degrees(target - reference)
}

/// [`relative_bearing_degrees`] over [`Angle`]s.
#[must_use]
pub fn relative_bearing(target: Angle, reference: Angle) -> Angle {
    BoundedAngle::new(target - reference).to_signed_angle()
}

/// Computes the point reached by travelling `distance` from `from` along the great circle that
/// starts at `bearing`.
///
/// This is the inverse of [`distance`] and [`bearing`]; it is mostly useful for laying out
/// synthetic targets.
#[must_use]
pub fn destination(from: &GeoPoint, bearing: Angle, distance: Length) -> GeoPoint {
    let lat = from.latitude().get::<radian>();
    let lon = from.longitude().get::<radian>();
    let theta = bearing.get::<radian>();
    let delta = distance.get::<meter>() / EARTH_RADIUS;

    let lat2 = (lat.sin() * delta.cos() + lat.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon
        + (theta.sin() * delta.sin() * lat.cos()).atan2(delta.cos() - lat.sin() * lat2.sin());

    let builder = GeoPoint::builder()
        .horizontal_accuracy(from.horizontal_accuracy())
        .longitude(Angle::new::<radian>(lon2));
    let builder = match from.altitude() {
        Some(altitude) => builder.altitude(altitude),
        None => builder,
    };
    builder
        .latitude(Angle::new::<radian>(lat2.clamp(
            -std::f64::consts::FRAC_PI_2,
            std::f64::consts::FRAC_PI_2,
        )))
        .map(|b| b.build())
        // asin only produces latitudes in [-90°, 90°]
        .unwrap_or(*from)
}

/// Offset of `target` from `origin` on the local tangent plane, as `(east, north)`.
#[must_use]
pub fn east_north_offset(origin: &GeoPoint, target: &GeoPoint) -> (Length, Length) {
    let range = distance_meters(origin, target);
    let theta = bearing_degrees(origin, target).to_radians();
    (
        Length::new::<meter>(range * theta.sin()),
        Length::new::<meter>(range * theta.cos()),
    )
}

/// Renders a distance for humans: whole meters below one kilometer, tenths of kilometers above.
#[must_use]
pub fn format_distance(distance: Length) -> String {
    let meters = distance.get::<meter>().max(0.);
    if meters < 1000. {
        format!("{meters:.0} m")
    } else {
        format!("{:.1} km", distance.get::<kilometer>())
    }
}

/// One of the eight principal points of the compass rose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CardinalDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CardinalDirection {
    const ALL: [Self; 8] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    /// Returns the compass point whose 45° sector contains `bearing`.
    ///
    /// Sectors are centred on their point, so north covers [337.5°, 22.5°).
    #[must_use]
    pub fn from_bearing(bearing: Angle) -> Self {
        let degrees = BoundedAngle::new(bearing).get_bounded();
        let sector = ((degrees + 22.5) / 45.).floor() as usize % 8;
        Self::ALL[sector]
    }

    /// Short label, eg `"NE"`.
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::North => "N",
            Self::NorthEast => "NE",
            Self::East => "E",
            Self::SouthEast => "SE",
            Self::South => "S",
            Self::SouthWest => "SW",
            Self::West => "W",
            Self::NorthWest => "NW",
        }
    }

    /// Bearing of the centre of this point's sector.
    #[must_use]
    pub fn bearing(self) -> Angle {
        let index = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Angle::new::<degree>(index as f64 * 45.)
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::{quickcheck, Arbitrary, Gen};
    use rstest::rstest;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::from_degrees(lat, lon).expect("latitude is in range")
    }
    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }
    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[derive(Clone, Copy, Debug)]
    struct AnyPoint(GeoPoint);

    impl Arbitrary for AnyPoint {
        fn arbitrary(g: &mut Gen) -> Self {
            // quickcheck will give us awkward f64 values -- we ignore those
            let mut finite = || loop {
                match f64::arbitrary(g) {
                    0. => break 0.,
                    f if f.is_normal() => break f,
                    _ => {}
                }
            };
            let lat = finite().rem_euclid(180.) - 90.;
            let lon = finite().rem_euclid(360.) - 180.;
            AnyPoint(p(lat, lon))
        }
    }

    quickcheck! {
        fn distance_is_symmetric(a: AnyPoint, b: AnyPoint) -> bool {
            distance_meters(&a.0, &b.0) == distance_meters(&b.0, &a.0)
        }

        fn distance_to_self_is_zero(a: AnyPoint) -> bool {
            distance_meters(&a.0, &a.0) == 0.
        }

        fn bearing_is_in_range(a: AnyPoint, b: AnyPoint) -> bool {
            let deg = bearing_degrees(&a.0, &b.0);
            (0. ..360.).contains(&deg)
        }

        fn relative_bearing_is_in_range(target: f64, reference: f64) -> bool {
            let deg = relative_bearing_degrees(target, reference);
            deg > -180. && deg <= 180.
        }
    }

    #[test]
    fn san_francisco_scenario() {
        let player = p(37.7749, -122.4194);
        let target = p(37.7849, -122.4094);
        let km = distance(&player, &target).get::<kilometer>();
        assert!((1.40..1.50).contains(&km), "distance was {km} km");
        let deg = bearing(&player, &target).get::<degree>();
        assert!((32. ..=40.).contains(&deg), "bearing was {deg}°");
        assert_eq!(
            CardinalDirection::from_bearing(bearing(&player, &target)),
            CardinalDirection::NorthEast
        );
    }

    #[test]
    fn due_north_and_east() {
        let origin = p(47.3769, 8.5417);
        assert_relative_eq!(
            bearing(&origin, &p(47.3869, 8.5417)).get::<degree>(),
            0.,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            bearing(&origin, &p(47.3769, 8.5517)).get::<degree>(),
            90.,
            epsilon = 0.01
        );
        assert_relative_eq!(
            bearing(&origin, &p(47.3669, 8.5417)).get::<degree>(),
            180.,
            epsilon = 1e-6
        );
    }

    #[test]
    fn one_degree_of_latitude() {
        // 2πR / 360
        let expected = std::f64::consts::TAU * EARTH_RADIUS / 360.;
        assert_relative_eq!(
            distance(&p(10., 20.), &p(11., 20.)).get::<meter>(),
            expected,
            max_relative = 1e-9
        );
    }

    #[rstest]
    #[case(10., 0., 10.)]
    #[case(350., 10., -20.)]
    #[case(10., 350., 20.)]
    #[case(180., 0., 180.)]
    #[case(0., 180., 180.)]
    #[case(90., 270., 180.)]
    #[case(271., 90., -179.)]
    fn relative_bearing_wraps(#[case] target: f64, #[case] reference: f64, #[case] expected: f64) {
        assert_relative_eq!(
            relative_bearing(d(target), d(reference)).get::<degree>(),
            expected,
            epsilon = 1e-9
        );
    }

    #[rstest]
    #[case(0., 5.)]
    #[case(45., 120.)]
    #[case(200., 1500.)]
    #[case(315., 20_000.)]
    fn destination_inverts_distance_and_bearing(#[case] bearing_deg: f64, #[case] meters: f64) {
        let origin = p(37.7749, -122.4194);
        let there = destination(&origin, d(bearing_deg), m(meters));
        assert_relative_eq!(distance(&origin, &there).get::<meter>(), meters, max_relative = 1e-6);
        assert_relative_eq!(
            bearing(&origin, &there).get::<degree>(),
            bearing_deg,
            epsilon = 1e-3
        );
    }

    #[test]
    fn east_north_offset_matches_axes() {
        let origin = p(0., 0.);
        let (east, north) = east_north_offset(&origin, &destination(&origin, d(90.), m(100.)));
        assert_relative_eq!(east.get::<meter>(), 100., epsilon = 1e-3);
        assert_relative_eq!(north.get::<meter>(), 0., epsilon = 1e-3);
    }

    #[rstest]
    #[case(0., CardinalDirection::North)]
    #[case(22.4, CardinalDirection::North)]
    #[case(22.5, CardinalDirection::NorthEast)]
    #[case(90., CardinalDirection::East)]
    #[case(200., CardinalDirection::South)]
    #[case(292.5, CardinalDirection::NorthWest)]
    #[case(337.5, CardinalDirection::North)]
    #[case(-45., CardinalDirection::NorthWest)]
    fn cardinal_sectors(#[case] deg: f64, #[case] expected: CardinalDirection) {
        assert_eq!(CardinalDirection::from_bearing(d(deg)), expected);
    }

    #[test]
    fn cardinal_bearing_roundtrips() {
        for c in CardinalDirection::ALL {
            assert_eq!(CardinalDirection::from_bearing(c.bearing()), c);
        }
    }

    #[test]
    fn formats_distances() {
        insta::assert_snapshot!(format_distance(m(4.4)), @"4 m");
        insta::assert_snapshot!(format_distance(m(999.)), @"999 m");
        insta::assert_snapshot!(format_distance(m(1490.)), @"1.5 km");
        insta::assert_snapshot!(format_distance(m(-3.)), @"0 m");
    }
}
