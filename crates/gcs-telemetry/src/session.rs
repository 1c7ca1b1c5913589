use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use gcs_link::{wait_for_stop, TelemetrySink, VehicleId};
use gcs_proto::telemetry::{LinkEvent, LinkEventKind, LinkStatus, VehicleSnapshot};
use mavlink::common::MavMessage;
use mavlink::MavHeader;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::decoder::{StateDelta, TelemetryDecoder};
use crate::fanout::Fanout;
use crate::health::HealthMonitor;
use crate::state::VehicleState;
use crate::TelemetryConfig;

/// Owns the one [`VehicleState`] for a link. The reader task writes through
/// [`TelemetrySink`], the health task through [`run_health`]; both take the
/// same lock, and snapshots are published while it is held so observers
/// never see an older status overwrite a newer one.
///
/// [`run_health`]: TelemetrySession::run_health
pub struct TelemetrySession {
    state: Mutex<VehicleState>,
    decoder: TelemetryDecoder,
    health: HealthMonitor,
    fanout: Fanout,
    tick: Duration,
}

impl TelemetrySession {
    pub fn new(cfg: &TelemetryConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VehicleState::default()),
            decoder: TelemetryDecoder::new(),
            health: HealthMonitor::new(cfg.stale_after()),
            fanout: Fanout::new(cfg.event_capacity),
            tick: cfg.health_tick(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only copy of the current state.
    pub fn state(&self) -> VehicleState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VehicleSnapshot> {
        self.fanout.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.fanout.events()
    }

    pub fn ingest_at(&self, header: &MavHeader, msg: &MavMessage, now: Instant) -> Option<StateDelta> {
        let mut st = self.lock();
        let delta = self.decoder.ingest(&mut st, header, msg, now)?;
        if let StateDelta::Link(kind) = delta {
            let text = match kind {
                LinkEventKind::Restored => "heartbeat received again, link restored".to_string(),
                _ => format!(
                    "heartbeat received from {}, link established",
                    st.vehicle.map(|v| v.to_string()).unwrap_or_default()
                ),
            };
            info!("telemetry: {}", text);
            self.fanout.announce(kind, text);
        }
        self.fanout.publish(st.snapshot());
        Some(delta)
    }

    pub fn check_health_at(&self, now: Instant) -> Option<LinkEventKind> {
        let mut st = self.lock();
        let kind = self.health.check(&mut st, now)?;
        let text = format!(
            "no heartbeat for {:?} (threshold {:?}), link stale",
            st.hb_age(now).unwrap_or_default(),
            self.health.stale_after()
        );
        warn!("telemetry: {}", text);
        self.fanout.announce(kind, text);
        self.fanout.publish(st.snapshot());
        Some(kind)
    }

    /// Health tick loop; ends when `stop` fires.
    pub async fn run_health(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = wait_for_stop(&mut stop) => break,
                _ = tick.tick() => {
                    self.check_health_at(now());
                }
            }
        }
    }

    /// Waits until a vehicle heartbeat has been seen and the link is
    /// Connected. None on timeout.
    pub async fn wait_for_vehicle(&self, timeout: Duration) -> Option<VehicleId> {
        let mut rx = self.subscribe();
        let wait = async {
            loop {
                {
                    let st = self.lock();
                    if st.link_status == LinkStatus::Connected {
                        if let Some(v) = st.vehicle {
                            return Some(v);
                        }
                    }
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

impl TelemetrySink for TelemetrySession {
    fn on_message(&self, header: &MavHeader, msg: &MavMessage) {
        self.ingest_at(header, msg, now());
    }

    fn on_decode_errors(&self, count: usize) {
        self.lock().decode_errors += count as u64;
    }
}

// tokio's clock, so paused-time tests drive the health tick too
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
