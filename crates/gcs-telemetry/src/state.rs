use std::time::Instant;

use gcs_link::VehicleId;
use gcs_proto::telemetry::{LinkStatus, VehicleSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat_deg: f64,
    pub lon_deg: f64,
    /// Meters above home.
    pub alt_m: f64,
}

/// Last known vehicle status. Written only by the decoder and the health
/// monitor, always under the session lock.
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    pub position: Option<Position>,
    pub last_heartbeat: Option<Instant>,
    pub link_status: LinkStatus,
    pub vehicle: Option<VehicleId>,
    pub decode_errors: u64,
    pub positions_applied: u64,
    /// (header sequence, time_boot_ms) of the last applied position report.
    pub(crate) last_position_key: Option<(u8, u32)>,
}

impl VehicleState {
    pub fn hb_age(&self, now: Instant) -> Option<std::time::Duration> {
        self.last_heartbeat.map(|t| now.saturating_duration_since(t))
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            ts_unix_ms: unix_ms_now(),
            lat: self.position.map(|p| p.lat_deg),
            lon: self.position.map(|p| p.lon_deg),
            alt: self.position.map(|p| p.alt_m),
            link_status: self.link_status,
            system_id: self.vehicle.map(|v| v.system_id),
            decode_errors: self.decode_errors,
        }
    }
}

pub(crate) fn unix_ms_now() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_position() {
        let st = VehicleState::default();
        assert_eq!(st.link_status, LinkStatus::Disconnected);
        let snap = st.snapshot();
        assert!(snap.lat.is_none() && snap.lon.is_none() && snap.alt.is_none());
        assert!(snap.ts_unix_ms > 0);
    }
}
