use gcs_proto::telemetry::{LinkEvent, LinkEventKind, VehicleSnapshot};
use tokio::sync::{broadcast, watch};

use crate::state::unix_ms_now;

/// Pushes state to observers without ever waiting on them.
///
/// Snapshots go through a `watch` channel: a slow reader skips straight to
/// the newest one. Link events go through a bounded `broadcast`; a reader
/// that falls behind gets `Lagged` and loses the oldest events.
#[derive(Debug)]
pub struct Fanout {
    snapshots: watch::Sender<VehicleSnapshot>,
    events: broadcast::Sender<LinkEvent>,
}

impl Fanout {
    pub fn new(event_capacity: usize) -> Self {
        let (snapshots, _) = watch::channel(VehicleSnapshot::default());
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self { snapshots, events }
    }

    pub fn subscribe(&self) -> watch::Receiver<VehicleSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, snap: VehicleSnapshot) {
        self.snapshots.send_replace(snap);
    }

    pub fn announce(&self, kind: LinkEventKind, msg: String) {
        // Err only means nobody is subscribed
        let _ = self.events.send(LinkEvent { ts_unix_ms: unix_ms_now(), kind, msg });
    }
}
