//! Routes decoded messages by kind: telemetry goes to the injected
//! [`TelemetrySink`], mission-protocol replies go to the active mission
//! session if there is one. Everything else is dropped here.

use std::sync::{Arc, Mutex, PoisonError};

use mavlink::common::{MavMessage, MavMissionResult};
use mavlink::MavHeader;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::LinkError;

/// Consumer of heartbeat and position traffic. Called inline from the
/// reader task, so implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn on_message(&self, header: &MavHeader, msg: &MavMessage);

    /// Frames dropped by the codec.
    fn on_decode_errors(&self, count: usize);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MissionReply {
    /// MISSION_REQUEST or MISSION_REQUEST_INT.
    Request { seq: u16 },
    Ack { result: MavMissionResult },
}

/// Slot holding the reply channel of the one mission session allowed per
/// link.
#[derive(Debug, Clone, Default)]
pub struct MissionRoute {
    active: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    tx: Option<mpsc::Sender<MissionReply>>,
    generation: u64,
}

impl Slot {
    fn is_held(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl MissionRoute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the route for a new session. Fails fast with
    /// [`LinkError::Busy`] if another session holds it; the holder is not
    /// disturbed.
    pub fn claim(&self, capacity: usize) -> Result<MissionChannel, LinkError> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_held() {
            return Err(LinkError::Busy);
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        slot.tx = Some(tx);
        slot.generation += 1;
        Ok(MissionChannel { rx, route: self.clone(), generation: slot.generation })
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).is_held()
    }

    /// Non-blocking hand-off. Returns false if nobody is listening or the
    /// session is not keeping up; the autopilot re-requests in that case.
    pub fn deliver(&self, reply: MissionReply) -> bool {
        use mpsc::error::TrySendError;

        let slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.tx.as_ref() else {
            debug!("mission: no active session, dropping {:?}", reply);
            return false;
        };
        match tx.try_send(reply) {
            Ok(()) => true,
            Err(TrySendError::Full(reply)) => {
                warn!("mission: session queue full, dropping {:?}", reply);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn release(&self, generation: u64) {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation == generation {
            slot.tx = None;
        }
    }
}

/// Receiving end of a claimed [`MissionRoute`]. Dropping it frees the
/// route for the next session.
#[derive(Debug)]
pub struct MissionChannel {
    rx: mpsc::Receiver<MissionReply>,
    route: MissionRoute,
    generation: u64,
}

impl MissionChannel {
    pub async fn recv(&mut self) -> Option<MissionReply> {
        self.rx.recv().await
    }

    /// Next reply already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<MissionReply> {
        self.rx.try_recv().ok()
    }
}

impl Drop for MissionChannel {
    fn drop(&mut self) {
        self.rx.close();
        self.route.release(self.generation);
    }
}

pub struct Dispatcher {
    telemetry: Arc<dyn TelemetrySink>,
    missions: MissionRoute,
    local_system: u8,
}

impl Dispatcher {
    pub fn new(telemetry: Arc<dyn TelemetrySink>, missions: MissionRoute, local_system: u8) -> Self {
        Self { telemetry, missions, local_system }
    }

    pub fn dispatch(&self, header: &MavHeader, msg: &MavMessage) {
        match msg {
            MavMessage::HEARTBEAT(_) | MavMessage::GLOBAL_POSITION_INT(_) => {
                self.telemetry.on_message(header, msg);
            }
            MavMessage::MISSION_REQUEST(d) => {
                self.route_mission(d.target_system, MissionReply::Request { seq: d.seq });
            }
            MavMessage::MISSION_REQUEST_INT(d) => {
                self.route_mission(d.target_system, MissionReply::Request { seq: d.seq });
            }
            MavMessage::MISSION_ACK(d) => {
                self.route_mission(d.target_system, MissionReply::Ack { result: d.mavtype.clone() });
            }
            _ => {}
        }
    }

    pub fn decode_errors(&self, count: usize) {
        if count > 0 {
            self.telemetry.on_decode_errors(count);
        }
    }

    fn route_mission(&self, target_system: u8, reply: MissionReply) {
        // 0 is broadcast; anything else not ours belongs to another GCS
        if target_system != 0 && target_system != self.local_system {
            debug!("mission: ignoring {:?} addressed to system {}", reply, target_system);
            return;
        }
        self.missions.deliver(reply);
    }
}
