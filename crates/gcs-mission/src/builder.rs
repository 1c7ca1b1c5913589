//! Procedural square survey pattern.

use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint};
use crate::waypoint::{Mission, MissionCommand, Waypoint};

/// Minimum takeoff pitch in degrees (param1 of NAV_TAKEOFF).
pub const TAKEOFF_MIN_PITCH_DEG: f32 = 15.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub leg_m: f64,
    pub alt_m: f32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        // PX4/ArduPilot SITL default home
        Self { center_lat: 47.397742, center_lon: 8.545594, leg_m: 50.0, alt_m: 20.0 }
    }
}

impl PatternConfig {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.center_lat, self.center_lon)
    }

    pub fn build(&self) -> Mission {
        build(self.center(), self.leg_m, self.alt_m)
    }
}

/// Takeoff at `center`, the four corners of a `leg_length_m` square centered
/// on it flown clockwise from north-west, then return to launch.
pub fn build(center: GeoPoint, leg_length_m: f64, altitude_m: f32) -> Mission {
    let h = leg_length_m / 2.0;
    let corners = [(-h, h), (h, h), (h, -h), (-h, -h)];

    let mut items = Vec::with_capacity(corners.len() + 2);
    items.push(
        Waypoint::new(MissionCommand::Takeoff, center.lat, center.lon, altitude_m)
            .with_params([TAKEOFF_MIN_PITCH_DEG, 0.0, 0.0, 0.0]),
    );
    for (east, north) in corners {
        let p = geo::offset(center, east, north);
        items.push(Waypoint::new(MissionCommand::Waypoint, p.lat, p.lon, altitude_m));
    }
    // RTL ignores position; the autopilot flies to its own home.
    items.push(Waypoint::new(MissionCommand::ReturnToLaunch, 0.0, 0.0, 0.0));

    Mission::sequenced(items)
}
