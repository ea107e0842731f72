//! Frame-rate independent smoothing carried from frame to frame.
//!
//! [`SmoothDamp`] is a critically damped spring: it approaches its target as fast as possible
//! without overshooting, which is what keeps scale changes and arrows from "popping" or
//! oscillating. The closed-form step is the one popularised in *Game Programming Gems 4*
//! (§1.10), which approximates `exp(-ωΔt)` with a cubic so it is cheap to evaluate every frame.

use crate::util::signed_degrees;
use std::time::Duration;

/// A critically damped follower with a given smoothing time.
///
/// The velocity lives with the caller (in the per-target state), so one `SmoothDamp` can drive
/// any number of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SmoothDamp {
    smooth_time: f64,
}

impl SmoothDamp {
    /// `smooth_time` is roughly the time it takes to reach the target. Zero disables smoothing.
    pub(crate) fn new(smooth_time: Duration) -> Self {
        Self {
            smooth_time: smooth_time.as_secs_f64(),
        }
    }

    /// Advances `current` towards `target` by `dt`, updating `velocity` in place.
    pub(crate) fn step(&self, current: f64, target: f64, velocity: &mut f64, dt: Duration) -> f64 {
        let dt = dt.as_secs_f64();
        if !current.is_finite() || !velocity.is_finite() {
            *velocity = 0.;
            return target;
        }
        if self.smooth_time <= 0. {
            *velocity = 0.;
            return target;
        }
        if dt <= 0. {
            return current;
        }

        let omega = 2. / self.smooth_time;
        let x = omega * dt;
        let decay = 1. / (1. + x + 0.48 * x * x + 0.235 * x * x * x);

        let change = current - target;
        let temp = (*velocity + omega * change) * dt;
        *velocity = (*velocity - omega * temp) * decay;
        let mut output = target + (change + temp) * decay;

        // never overshoot
        if (target - current > 0.) == (output > target) {
            output = target;
            *velocity = 0.;
        }
        output
    }

    /// Like [`step`](Self::step), but for angles in degrees.
    ///
    /// The target is unwrapped to the shortest arc from `current`, so a bearing moving from 179°
    /// to -179° turns 2° instead of swinging back through zero. The result is in (-180, 180].
    pub(crate) fn step_angle(
        &self,
        current: f64,
        target: f64,
        velocity: &mut f64,
        dt: Duration,
    ) -> f64 {
        let unwrapped = current + signed_degrees(target - current);
        signed_degrees(self.step(current, unwrapped, velocity, dt))
    }
}
