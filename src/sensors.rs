//! Location and heading inputs.
//!
//! Platform sensors deliver samples on their own threads and at their own cadence. The per-frame
//! components never talk to them directly; instead they read a [`LocationSource`] and a
//! [`HeadingSource`], which the [`Tracker`](crate::Tracker) polls exactly once per frame.
//!
//! [`location_channel`] and [`heading_channel`] provide the usual wiring: a publisher half that the
//! platform callback pushes into without ever blocking, and a source half that drains the queue on
//! the render thread.

use crate::util::{signed_degrees, wrap_degrees};
use crate::GeoPoint;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uom::si::angle::degree;
use uom::si::f64::Angle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Provides the player's most recent location fix.
pub trait LocationSource {
    /// The latest fix, or `None` if no fix has been obtained (or the provider has reported that
    /// it lost its fix).
    ///
    /// `None` means "distance unknown", never "distance zero".
    fn latest(&self) -> Option<GeoPoint>;

    /// Takes in any pending updates. Returns `true` if the value of [`latest`](Self::latest)
    /// may have changed since the previous call.
    ///
    /// Consumers only recompute distance and bearing after `true`, so sources that cannot tell
    /// keep the default, which always reports a change.
    fn poll_update(&mut self) -> bool {
        true
    }
}

/// Provides the device's heading.
pub trait HeadingSource {
    /// Degrees clockwise from north, in [0, 360). Only meaningful while
    /// [`is_available`](Self::is_available).
    fn heading_degrees(&self) -> f64;

    fn is_available(&self) -> bool;

    /// Takes in any pending updates. Returns `true` if the heading or its availability changed.
    fn poll_update(&mut self) -> bool {
        false
    }

    fn heading(&self) -> Angle {
        Angle::new::<degree>(self.heading_degrees())
    }

    fn sample(&self) -> HeadingSample {
        HeadingSample {
            degrees_from_north: wrap_degrees(self.heading_degrees()),
            is_available: self.is_available(),
        }
    }

    /// The heading to project with: the sensor value when available, otherwise north.
    fn heading_or_north(&self) -> f64 {
        self.sample().or_north()
    }
}

/// A heading reading as seen by the per-frame consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeadingSample {
    pub degrees_from_north: f64,
    pub is_available: bool,
}

impl HeadingSample {
    #[must_use]
    pub fn or_north(&self) -> f64 {
        if self.is_available {
            self.degrees_from_north
        } else {
            0.
        }
    }
}

impl LocationSource for Option<GeoPoint> {
    fn latest(&self) -> Option<GeoPoint> {
        *self
    }
}

/// A location source that is fed by hand, eg from a platform callback on the render thread.
#[derive(Debug, Clone, Default)]
pub struct LatestLocation {
    fix: Option<GeoPoint>,
    changed: bool,
}

impl LatestLocation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, fix: GeoPoint) {
        self.fix = Some(fix);
        self.changed = true;
    }

    /// Forgets the current fix, eg when the provider reports that it lost signal.
    pub fn clear(&mut self) {
        if self.fix.take().is_some() {
            self.changed = true;
        }
    }
}

impl LocationSource for LatestLocation {
    fn latest(&self) -> Option<GeoPoint> {
        self.fix
    }

    fn poll_update(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Settings for compass smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HeadingConfig {
    /// Fraction of the way each raw sample pulls the smoothed heading, in (0, 1]. 1 disables
    /// smoothing.
    pub smoothing: f64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self { smoothing: 0.25 }
    }
}

/// Compass heading with shortest-arc exponential smoothing.
///
/// Unavailable until the first sample arrives. Smoothing is done on the circle, so samples
/// jittering around north do not drag the average towards south.
#[derive(Debug, Clone)]
pub struct SmoothedHeading {
    smoothing: f64,
    degrees: f64,
    available: bool,
    changed: bool,
}

impl SmoothedHeading {
    #[must_use]
    pub fn new(config: HeadingConfig) -> Self {
        Self {
            smoothing: config.smoothing.clamp(f64::EPSILON, 1.),
            degrees: 0.,
            available: false,
            changed: false,
        }
    }

    /// Feeds a raw sample in degrees from north. Non-finite samples are ignored.
    pub fn push(&mut self, raw_degrees: f64) {
        if !raw_degrees.is_finite() {
            tracing::trace!(raw_degrees, "ignoring non-finite compass sample");
            return;
        }
        let raw = wrap_degrees(raw_degrees);
        self.degrees = if self.available {
            wrap_degrees(self.degrees + self.smoothing * signed_degrees(raw - self.degrees))
        } else {
            // first sample after (re)acquiring the sensor: nothing to smooth against
            raw
        };
        self.available = true;
        self.changed = true;
    }

    pub fn mark_unavailable(&mut self) {
        if self.available {
            self.available = false;
            self.changed = true;
        }
    }
}

impl HeadingSource for SmoothedHeading {
    fn heading_degrees(&self) -> f64 {
        self.degrees
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn poll_update(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Queue settings for the sensor hand-off channels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorConfig {
    /// Samples buffered between two frames before the oldest ones are dropped.
    pub queue_capacity: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

#[derive(Debug)]
enum LocationMessage {
    Fix(GeoPoint),
    Lost,
}

#[derive(Debug)]
enum HeadingMessage {
    Reading(f64),
    Unavailable,
}

/// Producer half of [`location_channel`]. Publishing never blocks; a full queue gives up its
/// oldest entry.
#[derive(Debug)]
pub struct LocationPublisher {
    tx: Sender<LocationMessage>,
    evict: Receiver<LocationMessage>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of [`location_channel`]; drains its queue in [`LocationSource::poll_update`].
#[derive(Debug)]
pub struct ChannelLocationSource {
    rx: Receiver<LocationMessage>,
    latest: LatestLocation,
    dropped: Arc<AtomicU64>,
}

/// Creates a bounded single-producer/single-consumer queue for location fixes.
#[must_use]
pub fn location_channel(config: SensorConfig) -> (LocationPublisher, ChannelLocationSource) {
    let (tx, rx) = crossbeam_channel::bounded(config.queue_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        LocationPublisher {
            tx,
            evict: rx.clone(),
            dropped: Arc::clone(&dropped),
        },
        ChannelLocationSource {
            rx,
            latest: LatestLocation::new(),
            dropped,
        },
    )
}

impl LocationPublisher {
    /// Queues a new fix. Returns `false` only once the consuming source is gone.
    pub fn publish(&self, fix: GeoPoint) -> bool {
        send_newest(&self.tx, &self.evict, LocationMessage::Fix(fix), &self.dropped, "location")
    }

    /// Queues a "fix lost" notice. Returns `false` only once the consuming source is gone.
    pub fn publish_lost(&self) -> bool {
        send_newest(&self.tx, &self.evict, LocationMessage::Lost, &self.dropped, "location")
    }
}

impl ChannelLocationSource {
    /// Number of samples dropped so far because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl LocationSource for ChannelLocationSource {
    fn latest(&self) -> Option<GeoPoint> {
        self.latest.latest()
    }

    fn poll_update(&mut self) -> bool {
        for message in self.rx.try_iter() {
            match message {
                LocationMessage::Fix(fix) => self.latest.update(fix),
                LocationMessage::Lost => self.latest.clear(),
            }
        }
        self.latest.poll_update()
    }
}

/// Producer half of [`heading_channel`]. Publishing never blocks; a full queue gives up its
/// oldest entry.
#[derive(Debug)]
pub struct HeadingPublisher {
    tx: Sender<HeadingMessage>,
    evict: Receiver<HeadingMessage>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of [`heading_channel`]; smooths samples as it drains them.
#[derive(Debug)]
pub struct ChannelHeadingSource {
    rx: Receiver<HeadingMessage>,
    heading: SmoothedHeading,
    dropped: Arc<AtomicU64>,
}

/// Creates a bounded single-producer/single-consumer queue for compass samples.
#[must_use]
pub fn heading_channel(
    config: SensorConfig,
    smoothing: HeadingConfig,
) -> (HeadingPublisher, ChannelHeadingSource) {
    let (tx, rx) = crossbeam_channel::bounded(config.queue_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        HeadingPublisher {
            tx,
            evict: rx.clone(),
            dropped: Arc::clone(&dropped),
        },
        ChannelHeadingSource {
            rx,
            heading: SmoothedHeading::new(smoothing),
            dropped,
        },
    )
}

impl HeadingPublisher {
    /// Queues a raw compass reading in degrees from north. Returns `false` only once the
    /// consuming source is gone.
    pub fn publish(&self, degrees_from_north: f64) -> bool {
        send_newest(
            &self.tx,
            &self.evict,
            HeadingMessage::Reading(degrees_from_north),
            &self.dropped,
            "heading",
        )
    }

    /// Reports that the compass stopped delivering. Returns `false` only once the consuming
    /// source is gone.
    pub fn publish_unavailable(&self) -> bool {
        send_newest(&self.tx, &self.evict, HeadingMessage::Unavailable, &self.dropped, "heading")
    }
}

impl ChannelHeadingSource {
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl HeadingSource for ChannelHeadingSource {
    fn heading_degrees(&self) -> f64 {
        self.heading.heading_degrees()
    }

    fn is_available(&self) -> bool {
        self.heading.is_available()
    }

    fn poll_update(&mut self) -> bool {
        for message in self.rx.try_iter() {
            match message {
                HeadingMessage::Reading(degrees) => self.heading.push(degrees),
                HeadingMessage::Unavailable => self.heading.mark_unavailable(),
            }
        }
        self.heading.poll_update()
    }
}

/// Queues `message`, evicting the oldest queued message while the queue is full.
fn send_newest<T>(
    tx: &Sender<T>,
    evict: &Receiver<T>,
    mut message: T,
    dropped: &Arc<AtomicU64>,
    feed: &'static str,
) -> bool {
    // the consuming source holds the only other handle on the counter
    if Arc::strong_count(dropped) < 2 {
        tracing::debug!(feed, "sensor consumer gone, dropping sample");
        return false;
    }
    loop {
        match tx.try_send(message) {
            Ok(()) => return true,
            Err(TrySendError::Full(rejected)) => {
                message = rejected;
                if evict.try_recv().is_ok() {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(feed, total_dropped = total, "sensor queue full, dropping oldest sample");
                }
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::from_degrees(lat, lon).expect("latitude is in range")
    }

    #[test]
    fn latest_location_reports_changes_once() {
        let mut source = LatestLocation::new();
        assert!(source.latest().is_none());
        assert!(!source.poll_update());

        source.update(p(1., 2.));
        assert!(source.poll_update());
        assert!(!source.poll_update());
        assert!(source.latest().is_some());

        source.clear();
        assert!(source.poll_update());
        assert!(source.latest().is_none());
        source.clear();
        assert!(!source.poll_update());
    }

    #[test]
    fn heading_starts_unavailable_and_falls_back_to_north() {
        let heading = SmoothedHeading::new(HeadingConfig::default());
        assert!(!heading.is_available());
        assert_eq!(heading.heading_or_north(), 0.);
    }

    #[test]
    fn first_heading_sample_is_taken_verbatim() {
        let mut heading = SmoothedHeading::new(HeadingConfig::default());
        heading.push(-30.);
        assert!(heading.is_available());
        assert_relative_eq!(heading.heading_degrees(), 330.);
        assert!(heading.poll_update());
    }

    #[test]
    fn heading_smoothing_wraps_across_north() {
        let mut heading = SmoothedHeading::new(HeadingConfig { smoothing: 0.5 });
        heading.push(350.);
        heading.push(10.);
        assert_relative_eq!(heading.heading_degrees(), 0., epsilon = 1e-9);
        heading.push(10.);
        assert_relative_eq!(heading.heading_degrees(), 5., epsilon = 1e-9);
    }

    #[test]
    fn heading_ignores_garbage_and_can_be_lost() {
        let mut heading = SmoothedHeading::new(HeadingConfig { smoothing: 1. });
        heading.push(90.);
        heading.push(f64::NAN);
        assert_relative_eq!(heading.heading_degrees(), 90.);
        heading.mark_unavailable();
        assert!(!heading.is_available());
        assert_eq!(heading.heading_or_north(), 0.);
        assert_eq!(
            heading.sample(),
            HeadingSample {
                degrees_from_north: 90.,
                is_available: false
            }
        );
    }

    #[test]
    fn location_channel_delivers_latest_fix() {
        let (publisher, mut source) = location_channel(SensorConfig::default());
        assert!(!source.poll_update());
        assert!(publisher.publish(p(1., 1.)));
        assert!(publisher.publish(p(2., 2.)));
        assert!(source.poll_update());
        let latest = source.latest().expect("a fix was published");
        assert_relative_eq!(latest.latitude().get::<degree>(), 2., epsilon = 1e-9);

        assert!(publisher.publish_lost());
        assert!(source.poll_update());
        assert!(source.latest().is_none());
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn full_queue_keeps_the_newest_fix(#[case] capacity: usize) {
        let (publisher, mut source) = location_channel(SensorConfig {
            queue_capacity: capacity,
        });
        for i in 0..capacity {
            assert!(publisher.publish(p(i as f64, 0.)));
        }
        assert!(publisher.publish(p(45., 0.)));
        assert_eq!(source.dropped(), 1);
        assert!(source.poll_update());
        let latest = source.latest().expect("queued fixes were delivered");
        assert_relative_eq!(latest.latitude().get::<degree>(), 45., epsilon = 1e-9);
    }

    #[test]
    fn full_queue_still_reports_a_lost_fix() {
        let (publisher, mut source) = location_channel(SensorConfig { queue_capacity: 2 });
        assert!(publisher.publish(p(1., 0.)));
        assert!(publisher.publish(p(2., 0.)));
        assert!(publisher.publish(p(3., 0.)));
        assert!(publisher.publish_lost());
        assert_eq!(source.dropped(), 2);

        assert!(source.poll_update());
        assert!(source.latest().is_none());
    }

    #[test]
    fn publishing_without_a_consumer_fails() {
        let (publisher, source) = location_channel(SensorConfig::default());
        drop(source);
        assert!(!publisher.publish(p(1., 0.)));
        assert!(!publisher.publish_lost());
    }

    #[test]
    fn heading_channel_smooths_while_draining() {
        let (publisher, mut source) = heading_channel(
            SensorConfig::default(),
            HeadingConfig { smoothing: 0.5 },
        );
        publisher.publish(100.);
        publisher.publish(120.);
        assert!(source.poll_update());
        assert_relative_eq!(source.heading_degrees(), 110., epsilon = 1e-9);
        publisher.publish_unavailable();
        assert!(source.poll_update());
        assert!(!source.is_available());
    }

    #[test]
    fn publishing_from_another_thread() {
        let (publisher, mut source) = heading_channel(
            SensorConfig::default(),
            HeadingConfig { smoothing: 1. },
        );
        std::thread::spawn(move || {
            publisher.publish(42.);
        })
        .join()
        .expect("publisher thread panicked");
        assert!(source.poll_update());
        assert_relative_eq!(source.heading_degrees(), 42., epsilon = 1e-9);
    }
}
