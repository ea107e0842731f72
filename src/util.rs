use uom::si::angle::degree;
use uom::si::f64::Angle;

/// An angle kept in degrees and only ever read back through one of the two normalized ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundedAngle {
    degrees: f64,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self::from_degrees(angle.into().get::<degree>())
    }

    pub(crate) fn from_degrees(degrees: f64) -> Self {
        Self {
            degrees: wrap_degrees(degrees),
        }
    }

    /// Returns the angle in [0°, 360°) in degrees.
    pub(crate) fn get_bounded(self) -> f64 {
        self.degrees
    }

    /// Returns the angle in (-180°, 180°] in degrees.
    ///
    /// Exactly 180° stays positive, so a target directly behind reads as "turn right".
    pub(crate) fn to_signed_range(self) -> f64 {
        if self.degrees > 180. {
            self.degrees - 360.
        } else {
            self.degrees
        }
    }

    pub(crate) fn to_signed_angle(self) -> Angle {
        Angle::new::<degree>(self.to_signed_range())
    }
}

/// Every value that can be converted into an [`Angle`] can be converted into [`BoundedAngle`].
impl<U: Into<Angle>> From<U> for BoundedAngle {
    fn from(value: U) -> Self {
        BoundedAngle::new(value)
    }
}

/// Wraps degrees into [0, 360).
pub(crate) fn wrap_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.;
    }
    let wrapped = degrees.rem_euclid(360.);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if wrapped >= 360. {
        0.
    } else {
        wrapped
    }
}

/// Wraps degrees into (-180, 180].
pub(crate) fn signed_degrees(degrees: f64) -> f64 {
    BoundedAngle::from_degrees(degrees).to_signed_range()
}

pub(crate) fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t.clamp(0., 1.)
}

/// Replaces non-finite values and clamps into `[min, max]`.
pub(crate) fn sanitize(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Serializes an [`Angle`] as plain degrees.
#[cfg(feature = "serde")]
pub(crate) mod serde_degrees {
    use serde::{Deserialize, Deserializer, Serializer};
    use uom::si::angle::degree;
    use uom::si::f64::Angle;

    pub(crate) fn serialize<S: Serializer>(angle: &Angle, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(angle.get::<degree>())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Angle, D::Error> {
        Ok(Angle::new::<degree>(f64::deserialize(deserializer)?))
    }
}

/// Serializes a [`Duration`](std::time::Duration) as fractional seconds.
#[cfg(feature = "serde")]
pub(crate) mod serde_seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(D::Error::custom)
    }
}
