use geosight::ar::{
    Anchor, AnchorId, AnchorPoll, ArSession, CameraPose, HorizontalPlane, Viewport,
};
use geosight::geo_math::{self, format_distance};
use geosight::sensors::{heading_channel, location_channel};
use geosight::{CoinTier, GeoPoint, TargetObject, Tracker, TrackerConfig};
use nalgebra::{Point3, UnitQuaternion};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

/// A flat floor 1.4 m below the starting camera height that anchors every request one frame
/// later.
#[derive(Debug, Default)]
struct Floor {
    next: u64,
    requested: Option<Anchor>,
}

impl ArSession for Floor {
    fn nearest_horizontal_plane(&self, camera: &CameraPose, _: f64) -> Option<HorizontalPlane> {
        Some(HorizontalPlane {
            center: Point3::new(camera.position.x, -1.4, camera.position.z),
        })
    }

    fn request_anchor(&mut self, position: Point3<f64>, rotation: UnitQuaternion<f64>) -> AnchorId {
        self.next += 1;
        let id = AnchorId(self.next);
        self.requested = Some(Anchor {
            id,
            position,
            rotation,
        });
        id
    }

    fn poll_anchor(&mut self, id: AnchorId) -> AnchorPoll {
        match self.requested.take() {
            Some(anchor) if anchor.id == id => AnchorPoll::Ready(anchor),
            _ => AnchorPoll::Failed,
        }
    }

    fn release_anchor(&mut self, id: AnchorId) {
        tracing::info!(%id, "anchor released");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = TrackerConfig::default();
    let (location_tx, location) = location_channel(config.sensors);
    let (heading_tx, heading) = heading_channel(config.sensors, config.heading);
    let mut tracker = Tracker::new(config, location, heading)
        .expect("default configuration is valid")
        .with_ar_session(Floor::default());

    let _log = tracker.subscribe(|event| tracing::info!(%event, "tracking event"));

    let start = GeoPoint::from_degrees(52.5163, 13.3777).expect("latitude is in [-90º, 90º]");
    let coin = geo_math::destination(
        &start,
        Angle::new::<degree>(30.),
        Length::new::<meter>(60.),
    );
    tracker.set_target(TargetObject::new("brandenburg-gate", coin).with_tier(CoinTier::Rare));

    let viewport = Viewport::new(1170., 2532., Angle::new::<degree>(63.));
    let dt = Duration::from_millis(100);
    let walking_speed = 1.4; // m/s

    let mut player = start;
    for tick in 0..600 {
        // the player walks a little to the left of the coin and sweeps the phone back and forth
        let towards = geo_math::bearing(&player, &coin);
        let heading_deg = towards.get::<degree>() - 15. + 20. * (f64::from(tick) / 25.).sin();
        heading_tx.publish(heading_deg);
        player = geo_math::destination(
            &player,
            towards - Angle::new::<degree>(3.),
            Length::new::<meter>(walking_speed * dt.as_secs_f64()),
        );
        location_tx.publish(player);

        // the tracking frame happens to start out with −Z pointing north
        let (east, north) = geo_math::east_north_offset(&start, &player);
        let camera = CameraPose::level(
            Point3::new(east.get::<meter>(), 0., -north.get::<meter>()),
            Angle::new::<degree>(heading_deg),
        );

        let frame = tracker.frame(dt, Some(&camera), &viewport);
        let Some(target) = frame.target else {
            break;
        };
        if tick % 10 == 0 || !frame.events.is_empty() {
            println!(
                "t={:>4.1}s {:>10} {:<12} scale={:>6.3} radar=({:>6.1}, {:>6.1}) {}",
                f64::from(tick) * dt.as_secs_f64(),
                target.distance.map(format_distance).unwrap_or_default(),
                target.mode.to_string(),
                target.scale,
                target.radar.map(|r| r.x).unwrap_or_default(),
                target.radar.map(|r| r.y).unwrap_or_default(),
                match target.indicator {
                    Some(arrow) if !arrow.on_screen => format!("arrow on {:?} edge", arrow.edge),
                    _ => target.message.clone(),
                },
            );
        }
        if target.in_collection_range && target.distance.is_some_and(|d| d.get::<meter>() < 1.) {
            println!("collected {}", target.target_id);
            tracker.clear_target();
        }
    }
}
