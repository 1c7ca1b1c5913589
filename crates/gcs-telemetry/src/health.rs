use std::time::{Duration, Instant};

use gcs_proto::telemetry::{LinkEventKind, LinkStatus};

use crate::state::VehicleState;

/// Demotes a Connected link to Stale once heartbeats stop. Runs on its own
/// tick; promotion back to Connected is the decoder's job.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    stale_after: Duration,
}

impl HealthMonitor {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn check(&self, state: &mut VehicleState, now: Instant) -> Option<LinkEventKind> {
        if state.link_status != LinkStatus::Connected {
            return None;
        }
        let age = state.hb_age(now)?;
        if age > self.stale_after {
            state.link_status = LinkStatus::Stale;
            return Some(LinkEventKind::Lost);
        }
        None
    }
}
