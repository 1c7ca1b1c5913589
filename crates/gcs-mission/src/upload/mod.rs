//! Async driver for [`machine::UploadSession`] over a running link.

pub mod machine;

use std::collections::BTreeMap;
use std::time::Duration;

use gcs_link::{MissionChannel, MissionReply, MissionRoute, Outbound, VehicleId};
use mavlink::common::{MavMessage, MavMissionResult, MISSION_CLEAR_ALL_DATA, MISSION_COUNT_DATA};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::waypoint::Mission;
use machine::{Outgoing, Stage, Step, UploadError, UploadSession};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub response_timeout_ms: u64,
    pub max_retries: u32,
    /// Send MISSION_CLEAR_ALL and wait for its ACK before MISSION_COUNT.
    pub clear_first: bool,
    /// How long the CLI waits for a vehicle heartbeat before giving up.
    pub heartbeat_wait_ms: u64,
    pub reply_capacity: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            response_timeout_ms: 3000,
            max_retries: 3,
            clear_first: true,
            heartbeat_wait_ms: 10_000,
            reply_capacity: 16,
        }
    }
}

impl UploadPolicy {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn heartbeat_wait(&self) -> Duration {
        Duration::from_millis(self.heartbeat_wait_ms)
    }
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub total: u16,
    pub send_counts: BTreeMap<u16, u32>,
    pub elapsed: Duration,
}

pub struct Uploader {
    outbound: Outbound,
    route: MissionRoute,
    target: VehicleId,
    policy: UploadPolicy,
}

impl Uploader {
    pub fn new(outbound: Outbound, route: MissionRoute, target: VehicleId, policy: UploadPolicy) -> Self {
        Self { outbound, route, target, policy }
    }

    /// Runs one complete upload. Holds the link's mission route for the
    /// whole transfer; a concurrent call fails with [`UploadError::Busy`].
    pub async fn upload(&self, mission: &Mission) -> Result<UploadReport, UploadError> {
        let mut replies = self.route.claim(self.policy.reply_capacity).map_err(|_| UploadError::Busy)?;
        let started = Instant::now();
        info!("mission: uploading {} items to {}", mission.len(), self.target);

        if self.policy.clear_first {
            self.clear_all(&mut replies).await?;
            // duplicate ACKs from resent CLEAR_ALLs must not reach the session
            while let Some(reply) = replies.try_recv() {
                debug!("mission: dropping {:?} left over from clear", reply);
            }
        }

        let mut session = UploadSession::new(mission.count(), self.policy.max_retries);
        let mut step = session.start();
        let mut deadline = started;
        loop {
            match step {
                Step::Send(out) => {
                    self.send(mission, out).await?;
                    deadline = Instant::now() + self.policy.response_timeout();
                }
                Step::Ignore => {}
                Step::Done(Ok(())) => {
                    let report = UploadReport {
                        total: session.total(),
                        send_counts: session.send_counts().clone(),
                        elapsed: started.elapsed(),
                    };
                    info!("mission: upload accepted ({} items, {:?})", report.total, report.elapsed);
                    return Ok(report);
                }
                Step::Done(Err(e)) => {
                    warn!("mission: upload failed: {}", e);
                    return Err(e);
                }
            }
            step = match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(MissionReply::Request { seq })) => {
                    debug!("mission: vehicle requests item {}", seq);
                    session.on_request(seq)
                }
                Ok(Some(MissionReply::Ack { result })) => session.on_ack(&result),
                Ok(None) => return Err(UploadError::LinkClosed),
                Err(_) => session.on_timeout(),
            };
        }
    }

    async fn clear_all(&self, replies: &mut MissionChannel) -> Result<(), UploadError> {
        let msg = MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
            target_system: self.target.system_id,
            target_component: self.target.component_id,
            ..Default::default()
        });
        let mut retries = 0;
        loop {
            self.outbound.send(msg.clone()).await.map_err(|_| UploadError::LinkClosed)?;
            let deadline = Instant::now() + self.policy.response_timeout();
            loop {
                match tokio::time::timeout_at(deadline, replies.recv()).await {
                    Ok(Some(MissionReply::Ack { result: MavMissionResult::MAV_MISSION_ACCEPTED })) => {
                        debug!("mission: vehicle cleared its mission");
                        return Ok(());
                    }
                    Ok(Some(MissionReply::Ack { result })) => return Err(UploadError::rejected(&result)),
                    Ok(Some(MissionReply::Request { seq })) => {
                        debug!("mission: request {} while clearing, ignoring", seq);
                    }
                    Ok(None) => return Err(UploadError::LinkClosed),
                    Err(_) => break,
                }
            }
            if retries >= self.policy.max_retries {
                return Err(UploadError::Timeout { stage: Stage::ClearAll, retries });
            }
            retries += 1;
            debug!("mission: no reply, resending {} (retry {})", Stage::ClearAll, retries);
        }
    }

    async fn send(&self, mission: &Mission, out: Outgoing) -> Result<(), UploadError> {
        let msg = match out {
            Outgoing::Count(count) => MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
                count,
                target_system: self.target.system_id,
                target_component: self.target.component_id,
                ..Default::default()
            }),
            Outgoing::Item(seq) => match mission.get(seq) {
                Some(wp) => MavMessage::MISSION_ITEM_INT(wp.to_mission_item(self.target)),
                None => {
                    warn!("mission: asked to send item {} of {}", seq, mission.len());
                    return Err(UploadError::MissingItem { seq });
                }
            },
        };
        self.outbound.send(msg).await.map_err(|_| UploadError::LinkClosed)
    }
}
