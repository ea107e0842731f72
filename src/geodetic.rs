use crate::util::BoundedAngle;
use std::fmt;
use std::fmt::Display;
use std::marker::PhantomData;
use uom::si::f64::{Angle, Length};
use uom::si::{angle::degree, length::meter};
use uom::ConstZero;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single location fix on the surface of the earth, as reported by a GPS provider or stored
/// for a target.
///
/// `GeoPoint` deliberately does not implement `PartialEq`: two fixes are compared by the distance
/// between them (see [`distance`](crate::geo_math::distance)), never by their raw components.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    latitude: Angle,
    longitude: Angle,
    altitude: Option<Length>,
    horizontal_accuracy: Length,
}

impl GeoPoint {
    /// Constructs a location from its components.
    ///
    /// The latitude must be in [-90°,90°] % 360°. If it is not, this function returns `None`.
    #[must_use]
    pub fn build(
        Components {
            latitude,
            longitude,
            altitude,
            horizontal_accuracy,
        }: Components,
    ) -> Option<Self> {
        let mut point = Self::builder()
            .latitude(latitude)?
            .longitude(longitude)
            .horizontal_accuracy(horizontal_accuracy)
            .build();
        point.altitude = altitude;
        Some(point)
    }

    /// Provides a constructor for a [`GeoPoint`].
    pub fn builder() -> Builder<MissingLatitude, MissingLongitude> {
        Builder {
            under_construction: GeoPoint {
                latitude: Angle::ZERO,
                longitude: Angle::ZERO,
                altitude: None,
                horizontal_accuracy: Length::ZERO,
            },
            has: (PhantomData, PhantomData),
        }
    }

    /// Shorthand for a point with no altitude and perfect accuracy, given in decimal degrees.
    ///
    /// Returns `None` when the latitude is outside [-90°, 90°] or either value is not finite.
    #[must_use]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        Some(
            Self::builder()
                .latitude(Angle::new::<degree>(latitude))?
                .longitude(Angle::new::<degree>(longitude))
                .build(),
        )
    }

    /// Returns the latitude, always in [-90°, 90°].
    #[must_use]
    pub fn latitude(&self) -> Angle {
        BoundedAngle::new(self.latitude).to_signed_angle()
    }

    /// Returns the longitude, normalized into (-180°, 180°].
    #[must_use]
    pub fn longitude(&self) -> Angle {
        BoundedAngle::new(self.longitude).to_signed_angle()
    }

    /// Altitude above the reference ellipsoid, when the provider reported one.
    #[must_use]
    pub fn altitude(&self) -> Option<Length> {
        self.altitude
    }

    /// Radius of the provider's horizontal uncertainty around this fix.
    #[must_use]
    pub fn horizontal_accuracy(&self) -> Length {
        self.horizontal_accuracy
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat = self.latitude();
        let lat_is_positive = lat.is_sign_positive();
        let lat = lat.abs().get::<degree>();
        let lon = self.longitude();
        let lon_is_positive = lon.is_sign_positive();
        let lon = lon.abs().get::<degree>();
        let ns = if lat_is_positive { 'N' } else { 'S' };
        let ew = if lon_is_positive { 'E' } else { 'W' };
        write!(f, "{lat:.6}°{ns}, {lon:.6}°{ew}")?;
        if let Some(alt) = self.altitude {
            write!(f, ", {:.1}m", alt.get::<meter>())?;
        }
        write!(f, " (±{:.1}m)", self.horizontal_accuracy.get::<meter>())
    }
}

/// Argument type for [`GeoPoint::build`].
#[derive(Debug, Default)]
#[must_use]
pub struct Components {
    /// The latitude must be in [-90°,90°] % 360°.
    pub latitude: Angle,

    pub longitude: Angle,

    pub altitude: Option<Length>,

    /// Negative values are treated as zero.
    pub horizontal_accuracy: Length,
}

/// Used to indicate that a partially-constructed [`GeoPoint`] is missing the latitude component.
pub struct MissingLatitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] has the latitude component set.
pub struct HasLatitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] is missing the longitude component.
pub struct MissingLongitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] has the longitude component set.
pub struct HasLongitude;

/// [Builder] for a [`GeoPoint`].
///
/// Construct one through [`GeoPoint::builder`], and finalize with [`Builder::build`]. Altitude
/// and accuracy are optional and may be set at any point.
///
/// [Builder]: https://rust-unofficial.github.io/patterns/patterns/creational/builder.html
#[derive(Debug)]
#[must_use]
pub struct Builder<Latitude, Longitude> {
    under_construction: GeoPoint,
    has: (PhantomData<Latitude>, PhantomData<Longitude>),
}

impl<L1, L2> Builder<L1, L2> {
    /// Sets the latitude of the [`GeoPoint`]-to-be.
    ///
    /// The latitude must be in [-90°,90°] % 360°. If it is not, this function returns `None`.
    pub fn latitude(mut self, latitude: impl Into<Angle>) -> Option<Builder<HasLatitude, L2>> {
        let latitude = latitude.into();
        let signed = BoundedAngle::new(latitude).to_signed_range();
        if !(-90. ..=90.).contains(&signed) {
            None
        } else {
            self.under_construction.latitude = latitude;
            Some(Builder {
                under_construction: self.under_construction,
                has: (PhantomData::<HasLatitude>, self.has.1),
            })
        }
    }

    /// Sets the longitude of the [`GeoPoint`]-to-be.
    pub fn longitude(mut self, longitude: impl Into<Angle>) -> Builder<L1, HasLongitude> {
        self.under_construction.longitude = longitude.into();
        Builder {
            under_construction: self.under_construction,
            has: (self.has.0, PhantomData::<HasLongitude>),
        }
    }

    /// Sets the altitude above the reference ellipsoid.
    pub fn altitude(mut self, altitude: impl Into<Length>) -> Self {
        self.under_construction.altitude = Some(altitude.into());
        self
    }

    /// Sets the horizontal accuracy radius. Negative values are treated as zero.
    pub fn horizontal_accuracy(mut self, accuracy: impl Into<Length>) -> Self {
        let accuracy = accuracy.into();
        self.under_construction.horizontal_accuracy = if accuracy > Length::ZERO {
            accuracy
        } else {
            Length::ZERO
        };
        self
    }
}

impl Builder<HasLatitude, HasLongitude> {
    #[must_use]
    pub fn build(self) -> GeoPoint {
        self.under_construction
    }
}
