//! This library turns a player's live GPS position and a target's fixed geographic location into
//! something that can be drawn: an object in an augmented-reality scene, a blip on a radar disc,
//! and an arrow at the edge of the screen.
//!
//! The hard part is that the two sides do not share a coordinate system. Locations are
//! earth-referenced [`GeoPoint`]s, while the AR scene lives in a local tracking frame (see
//! [`ar`]) that drifts relative to the earth as the session runs. The crate keeps the two apart:
//! every decision about _how_ to show the target (hidden, billboarded, or world-locked) is made
//! from the GPS distance alone, and the AR frame is only used to place the object once it is near
//! enough to be pinned to a detected surface.
//!
//! The moving parts, leaves first:
//!
//! - [`geo_math`]: great-circle distance, bearings, relative bearings and compass points.
//! - [`sensors`]: the [`LocationSource`](sensors::LocationSource) and
//!   [`HeadingSource`](sensors::HeadingSource) traits, plus non-blocking channels that hand
//!   platform samples over to the render thread.
//! - [`positioner`]: keeps the GPS distance and bearing current and places the object in the
//!   AR frame, anchoring it to a surface when possible.
//! - [`display_mode`]: picks the display mode from the distance, cross-fades between modes and
//!   keeps the scale and facing smooth.
//! - [`indicator`] and [`radar`]: the two 2D overlays.
//! - [`Tracker`]: runs all of the above once per frame for the single active target and reports
//!   [`TrackingEvent`]s.
//!
//! # Examples
//!
//! ```
//! use geosight::ar::Viewport;
//! use geosight::sensors::{HeadingConfig, LatestLocation, SmoothedHeading};
//! use geosight::{DisplayMode, GeoPoint, TargetObject, Tracker, TrackerConfig};
//! use std::time::Duration;
//! use uom::si::angle::degree;
//! use uom::si::f64::Angle;
//!
//! let mut tracker = Tracker::new(
//!     TrackerConfig::default(),
//!     LatestLocation::new(),
//!     SmoothedHeading::new(HeadingConfig::default()),
//! )
//! .expect("the default configuration is valid");
//!
//! let coin = GeoPoint::from_degrees(37.7849, -122.4094).expect("latitude is in range");
//! tracker.set_target(TargetObject::new("coin-1", coin));
//!
//! let viewport = Viewport::new(1080., 1920., Angle::new::<degree>(60.));
//! let dt = Duration::from_millis(16);
//!
//! // there is no fix yet, but the coin must not disappear because of that
//! let frame = tracker.frame(dt, None, &viewport);
//! assert_eq!(frame.target.expect("coin is active").mode, DisplayMode::Billboard);
//!
//! // the coin turns out to be well over a kilometer away
//! let player = GeoPoint::from_degrees(37.7749, -122.4194).expect("latitude is in range");
//! tracker.location_mut().update(player);
//! let frame = tracker.frame(dt, None, &viewport);
//! let coin = frame.target.expect("coin is active");
//! assert_eq!(coin.mode, DisplayMode::Hidden);
//! assert_eq!(coin.message, "1.4 km away");
//! ```

mod geodetic;
mod smoothing;
mod tracking;
mod util;

pub mod ar;
pub mod config;
pub mod display_mode;
pub mod events;
pub mod geo_math;
pub mod indicator;
pub mod positioner;
pub mod radar;
pub mod sensors;
pub mod tracker;

/// Type-state markers and argument types for constructing a [`GeoPoint`].
pub mod geo_point {
    pub use super::geodetic::{
        Builder, Components, HasLatitude, HasLongitude, MissingLatitude, MissingLongitude,
    };
}

pub use config::{ConfigError, TrackerConfig};
pub use display_mode::DisplayMode;
pub use events::{EventBus, Subscription, TrackingEvent};
pub use geodetic::GeoPoint;
pub use tracker::{FrameOutput, TargetFrame, Tracker};
pub use tracking::{CoinTier, Placement, TargetObject, TrackingState};
