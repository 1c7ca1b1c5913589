pub mod codec;
pub mod dispatch;
pub mod doctor;
pub mod error;
pub mod heartbeat;
pub mod link;
pub mod outbound;
pub mod transport;

pub use dispatch::{Dispatcher, MissionChannel, MissionReply, MissionRoute, TelemetrySink};
pub use error::LinkError;
pub use link::{wait_for_stop, Link};
pub use outbound::Outbound;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// `udpin:host:port` listens and answers whoever sent last,
    /// `udpout:host:port` talks to a fixed peer. `udp:` is `udpin:`.
    pub address: String,

    /// MAVLink ids we use (ground station side).
    pub sys_id: u8,
    pub comp_id: u8,

    /// GCS heartbeat send rate. 0 disables it.
    pub send_heartbeat_hz: f32,

    pub outbound_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "udpin:0.0.0.0:14550".into(),
            sys_id: 255,
            comp_id: 190, // MAV_COMP_ID_MISSIONPLANNER
            send_heartbeat_hz: 1.0,
            outbound_capacity: 32,
        }
    }
}

/// System/component pair of the autopilot on the other end of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VehicleId {
    pub system_id: u8,
    pub component_id: u8,
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.system_id, self.component_id)
    }
}
