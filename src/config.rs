//! Configuration for a whole [`Tracker`](crate::Tracker).
//!
//! Every section has sensible defaults and, with the `serde` feature, deserializes from partial
//! documents: distances are given in meters, angles in degrees and durations in seconds.
//!
//! ```yaml
//! display:
//!   collection_distance: 3.0
//!   transition_duration: 0.25
//! indicator:
//!   deadzone: 2.5
//! ```

use crate::display_mode::DisplayConfig;
use crate::indicator::IndicatorConfig;
use crate::positioner::PositionerConfig;
use crate::radar::RadarConfig;
use crate::sensors::{HeadingConfig, SensorConfig};
use thiserror::Error;
use uom::si::angle::degree;
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reasons a [`TrackerConfig`] is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(
        "distance thresholds must satisfy 0 < collection ({collection} m) < billboard ({billboard} m) < hide ({hide} m)"
    )]
    ThresholdOrder {
        collection: f64,
        billboard: f64,
        hide: f64,
    },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} range is empty: minimum {min} exceeds maximum {max}")]
    EmptyRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field} must be within [0, 1], got {value}")]
    NotAFraction { field: &'static str, value: f64 },

    #[error("{field} ({value}°) must be smaller than the on-screen threshold ({threshold}°)")]
    AboveOnScreenThreshold {
        field: &'static str,
        value: f64,
        threshold: f64,
    },

    #[error("anchor release distance ({release} m) must not be below the anchor range ({range} m)")]
    AnchorRelease { release: f64, range: f64 },

    #[error("heading smoothing must be within (0, 1], got {0}")]
    HeadingSmoothing(f64),

    #[error("sensor queue capacity must be at least 1")]
    QueueCapacity,
}

/// All settings of a [`Tracker`](crate::Tracker).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackerConfig {
    pub positioner: PositionerConfig,
    pub display: DisplayConfig,
    pub indicator: IndicatorConfig,
    pub radar: RadarConfig,
    pub heading: HeadingConfig,
    pub sensors: SensorConfig,
}

impl TrackerConfig {
    /// Checks that the settings are consistent with each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_display()?;
        self.validate_positioner()?;
        self.validate_indicator()?;

        positive("radar.radius_px", self.radar.radius_px)?;
        positive("radar.range", self.radar.range.get::<meter>())?;

        let smoothing = self.heading.smoothing;
        if !(smoothing > 0. && smoothing <= 1.) {
            return Err(ConfigError::HeadingSmoothing(smoothing));
        }
        if self.sensors.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        Ok(())
    }

    fn validate_display(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        let collection = display.collection_distance.get::<meter>();
        let billboard = display.billboard_distance.get::<meter>();
        let hide = display.hide_distance.get::<meter>();
        if !(0. < collection && collection < billboard && billboard < hide) {
            return Err(ConfigError::ThresholdOrder {
                collection,
                billboard,
                hide,
            });
        }
        positive(
            "display.billboard_screen_height_px",
            display.billboard_screen_height_px,
        )?;
        positive("display.min_world_scale", display.min_world_scale)?;
        range(
            "display world scale",
            display.min_world_scale,
            display.max_world_scale,
        )?;
        positive("display.min_billboard_scale", display.min_billboard_scale)?;
        range(
            "display billboard scale",
            display.min_billboard_scale,
            display.max_billboard_scale,
        )
    }

    fn validate_positioner(&self) -> Result<(), ConfigError> {
        let positioner = &self.positioner;
        let anchor_range = positioner.anchor_range.get::<meter>();
        positive("positioner.anchor_range", anchor_range)?;
        let release = positioner.anchor_release_distance.get::<meter>();
        if !(release >= anchor_range) {
            return Err(ConfigError::AnchorRelease {
                release,
                range: anchor_range,
            });
        }
        non_negative(
            "positioner.placement_distance",
            positioner.placement_distance.get::<meter>(),
        )?;
        non_negative(
            "positioner.placement_bias",
            positioner.placement_bias.get::<meter>(),
        )?;
        positive(
            "positioner.camera_relative_min",
            positioner.camera_relative_min.get::<meter>(),
        )?;
        range(
            "positioner camera-relative distance",
            positioner.camera_relative_min.get::<meter>(),
            positioner.camera_relative_max.get::<meter>(),
        )?;
        if let Some(accuracy) = positioner.max_fix_accuracy {
            positive("positioner.max_fix_accuracy", accuracy.get::<meter>())?;
        }
        Ok(())
    }

    fn validate_indicator(&self) -> Result<(), ConfigError> {
        let indicator = &self.indicator;
        let threshold = indicator.on_screen_threshold.get::<degree>();
        positive("indicator.on_screen_threshold", threshold)?;
        for (field, value) in [
            ("indicator.hysteresis", indicator.hysteresis.get::<degree>()),
            ("indicator.deadzone", indicator.deadzone.get::<degree>()),
        ] {
            non_negative(field, value)?;
            if value >= threshold {
                return Err(ConfigError::AboveOnScreenThreshold {
                    field,
                    value,
                    threshold,
                });
            }
        }
        non_negative(
            "indicator.behind_threshold",
            indicator.behind_threshold.get::<degree>(),
        )?;
        non_negative(
            "indicator.near_approach_distance",
            indicator.near_approach_distance.get::<meter>(),
        )?;
        non_negative("indicator.edge_margin_px", indicator.edge_margin_px)?;
        let fraction = indicator.bottom_anchor_fraction;
        if !(0. ..=1.).contains(&fraction) {
            return Err(ConfigError::NotAFraction {
                field: "indicator.bottom_anchor_fraction",
                value: fraction,
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    // NaN fails too
    if value > 0. {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0. {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn range(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::EmptyRange { field, min, max })
    }
}
