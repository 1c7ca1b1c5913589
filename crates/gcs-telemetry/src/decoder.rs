use std::time::Instant;

use gcs_link::heartbeat::is_vehicle;
use gcs_link::VehicleId;
use gcs_proto::telemetry::{LinkEventKind, LinkStatus};
use mavlink::common::{MavMessage, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA};
use mavlink::MavHeader;
use tracing::{debug, info};

use crate::state::{Position, VehicleState};

const LAT_LIMIT_E7: i32 = 90 * 10_000_000;
const LON_LIMIT_E7: i32 = 180 * 10_000_000;

/// Observable change produced by one ingested message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateDelta {
    Link(LinkEventKind),
    Position(Position),
}

/// Turns heartbeat and GLOBAL_POSITION_INT traffic into [`VehicleState`]
/// updates. Arrival order decides what is "latest"; the vehicle's
/// `time_boot_ms` is only used to spot exact duplicates.
#[derive(Debug, Default, Clone)]
pub struct TelemetryDecoder;

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn ingest(
        &self,
        state: &mut VehicleState,
        header: &MavHeader,
        msg: &MavMessage,
        now: Instant,
    ) -> Option<StateDelta> {
        match msg {
            MavMessage::HEARTBEAT(hb) => self.on_heartbeat(state, header, hb, now),
            MavMessage::GLOBAL_POSITION_INT(pos) => self.on_position(state, header, pos),
            _ => None,
        }
    }

    fn on_heartbeat(
        &self,
        state: &mut VehicleState,
        header: &MavHeader,
        hb: &HEARTBEAT_DATA,
        now: Instant,
    ) -> Option<StateDelta> {
        if !is_vehicle(hb) {
            debug!("telemetry: ignoring {:?} heartbeat from {}/{}", hb.mavtype, header.system_id, header.component_id);
            return None;
        }
        let from = VehicleId { system_id: header.system_id, component_id: header.component_id };
        match state.vehicle {
            Some(v) if v != from => {
                debug!("telemetry: ignoring heartbeat from {} (tracking {})", from, v);
                return None;
            }
            Some(_) => {}
            None => {
                info!("telemetry: tracking vehicle {} ({:?})", from, hb.autopilot);
                state.vehicle = Some(from);
            }
        }

        state.last_heartbeat = Some(now);
        let event = match state.link_status {
            LinkStatus::Disconnected => LinkEventKind::Established,
            LinkStatus::Stale => LinkEventKind::Restored,
            LinkStatus::Connected => return None,
        };
        state.link_status = LinkStatus::Connected;
        Some(StateDelta::Link(event))
    }

    fn on_position(
        &self,
        state: &mut VehicleState,
        header: &MavHeader,
        pos: &GLOBAL_POSITION_INT_DATA,
    ) -> Option<StateDelta> {
        if let Some(v) = state.vehicle {
            if v.system_id != header.system_id {
                return None;
            }
        }
        if !(-LAT_LIMIT_E7..=LAT_LIMIT_E7).contains(&pos.lat) || !(-LON_LIMIT_E7..=LON_LIMIT_E7).contains(&pos.lon) {
            debug!("telemetry: dropping position with lat={} lon={} (1e7 deg)", pos.lat, pos.lon);
            state.decode_errors += 1;
            return None;
        }

        let key = (header.sequence, pos.time_boot_ms);
        if state.last_position_key == Some(key) {
            return None;
        }
        state.last_position_key = Some(key);

        let p = Position {
            lat_deg: pos.lat as f64 / 1e7,
            lon_deg: pos.lon as f64 / 1e7,
            alt_m: pos.relative_alt as f64 / 1000.0,
        };
        state.position = Some(p);
        state.positions_applied += 1;
        Some(StateDelta::Position(p))
    }
}
