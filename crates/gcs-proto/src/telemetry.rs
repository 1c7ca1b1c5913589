use serde::{Deserialize, Serialize};

/// Link health as seen by the presentation layer. `Stale` and `Disconnected`
/// are both "not actionable"; they differ only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connected,
    Stale,
}

impl LinkStatus {
    pub fn is_actionable(self) -> bool {
        matches!(self, LinkStatus::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEventKind {
    Established,
    Lost,
    Restored,
}

/// Pushed to observers on every telemetry update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub ts_unix_ms: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub link_status: LinkStatus,
    // Diagnostics
    pub system_id: Option<u8>,
    pub decode_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEvent {
    pub ts_unix_ms: i64,
    pub kind: LinkEventKind,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_snake_case_status() {
        let snap = VehicleSnapshot {
            ts_unix_ms: 1,
            lat: Some(47.397742),
            lon: Some(8.545594),
            alt: Some(20.0),
            link_status: LinkStatus::Stale,
            system_id: Some(1),
            decode_errors: 0,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["link_status"], "stale");
        assert_eq!(json["lat"], 47.397742);
    }

    #[test]
    fn only_connected_is_actionable() {
        assert!(LinkStatus::Connected.is_actionable());
        assert!(!LinkStatus::Stale.is_actionable());
        assert!(!LinkStatus::Disconnected.is_actionable());
    }
}
