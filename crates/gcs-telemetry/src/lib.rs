pub mod decoder;
pub mod doctor;
pub mod fanout;
pub mod health;
pub mod session;
pub mod state;

pub use gcs_proto::telemetry::{LinkEventKind, LinkStatus, VehicleSnapshot};
pub use session::TelemetrySession;
pub use state::{Position, VehicleState};

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Nominal vehicle heartbeat period (MAVLink default is 1 Hz).
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeats before the link is declared stale.
    pub stale_heartbeats: u32,

    /// Health check period.
    pub health_tick_ms: u64,

    /// Link events buffered per subscriber before a slow one starts
    /// skipping.
    pub event_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            stale_heartbeats: 5,
            health_tick_ms: 500,
            event_capacity: 16,
        }
    }
}

impl TelemetryConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms) * self.stale_heartbeats.max(1)
    }

    pub fn health_tick(&self) -> Duration {
        Duration::from_millis(self.health_tick_ms.max(10))
    }
}
