//! Sans-IO mission upload state machine. The caller feeds it replies and
//! timer expiries and performs the sends it asks for.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use mavlink::common::MavMissionResult;
use tracing::{debug, warn};

/// What was on the wire when the vehicle went quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ClearAll,
    Count,
    Item(u16),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ClearAll => f.write_str("MISSION_CLEAR_ALL"),
            Stage::Count => f.write_str("MISSION_COUNT"),
            Stage::Item(seq) => write!(f, "MISSION_ITEM_INT {}", seq),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("vehicle stopped answering after {stage} ({retries} retries)")]
    Timeout { stage: Stage, retries: u32 },
    #[error("vehicle rejected the mission: {name} ({code})")]
    Rejected { code: u32, name: String },
    #[error("vehicle accepted after requesting only {requested} of {total} items")]
    Incomplete { requested: usize, total: u16 },
    #[error("another mission transfer is active on this link")]
    Busy,
    #[error("no vehicle heartbeat seen")]
    NoVehicle,
    #[error("link closed during upload")]
    LinkClosed,
    #[error("mission has no item {seq}")]
    MissingItem { seq: u16 },
}

impl UploadError {
    pub fn rejected(result: &MavMissionResult) -> Self {
        UploadError::Rejected { code: result.clone() as u32, name: format!("{:?}", result) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    CountSent,
    ItemsInFlight,
    Acknowledged,
    Failed(UploadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    Count(u16),
    Item(u16),
}

impl Outgoing {
    fn stage(self) -> Stage {
        match self {
            Outgoing::Count(_) => Stage::Count,
            Outgoing::Item(seq) => Stage::Item(seq),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Put this on the wire and re-arm the response timer.
    Send(Outgoing),
    /// Nothing to do; the timer keeps running.
    Ignore,
    Done(Result<(), UploadError>),
}

/// One upload attempt of `total` items. Failed sessions are not resumed;
/// start a new one.
#[derive(Debug)]
pub struct UploadSession {
    total: u16,
    max_retries: u32,
    state: UploadState,
    requested: BTreeSet<u16>,
    send_counts: BTreeMap<u16, u32>,
    last_sent: Option<Outgoing>,
    silent_retries: u32,
}

impl UploadSession {
    pub fn new(total: u16, max_retries: u32) -> Self {
        Self {
            total,
            max_retries,
            state: UploadState::Idle,
            requested: BTreeSet::new(),
            send_counts: BTreeMap::new(),
            last_sent: None,
            silent_retries: 0,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    /// How often each item went out, including re-requests and retries.
    pub fn send_counts(&self) -> &BTreeMap<u16, u32> {
        &self.send_counts
    }

    pub fn requested(&self) -> &BTreeSet<u16> {
        &self.requested
    }

    pub fn start(&mut self) -> Step {
        if self.state != UploadState::Idle {
            return Step::Ignore;
        }
        self.state = UploadState::CountSent;
        self.emit(Outgoing::Count(self.total))
    }

    pub fn on_request(&mut self, seq: u16) -> Step {
        if !self.in_flight() {
            debug!("mission: request {} outside an upload", seq);
            return Step::Ignore;
        }
        if seq >= self.total {
            warn!("mission: vehicle requested item {} of {}, ignoring", seq, self.total);
            return Step::Ignore;
        }
        self.state = UploadState::ItemsInFlight;
        self.requested.insert(seq);
        self.silent_retries = 0;
        self.emit(Outgoing::Item(seq))
    }

    pub fn on_ack(&mut self, result: &MavMissionResult) -> Step {
        if !self.in_flight() {
            debug!("mission: {:?} outside an upload", result);
            return Step::Ignore;
        }
        let accepted = matches!(result, MavMissionResult::MAV_MISSION_ACCEPTED);
        // an accept before any request answers something older than our COUNT
        if accepted && self.state == UploadState::CountSent && self.total > 0 {
            debug!("mission: stale accept before the first request, ignoring");
            return Step::Ignore;
        }
        let outcome = if !accepted {
            Err(UploadError::rejected(result))
        } else if self.requested.len() < self.total as usize {
            Err(UploadError::Incomplete { requested: self.requested.len(), total: self.total })
        } else {
            Ok(())
        };
        self.finish(outcome)
    }

    pub fn on_timeout(&mut self) -> Step {
        if !self.in_flight() {
            return Step::Ignore;
        }
        let Some(last) = self.last_sent else {
            return Step::Ignore;
        };
        if self.silent_retries >= self.max_retries {
            return self.finish(Err(UploadError::Timeout { stage: last.stage(), retries: self.silent_retries }));
        }
        self.silent_retries += 1;
        debug!("mission: no reply, resending {} (retry {})", last.stage(), self.silent_retries);
        self.emit(last)
    }

    fn in_flight(&self) -> bool {
        matches!(self.state, UploadState::CountSent | UploadState::ItemsInFlight)
    }

    fn emit(&mut self, out: Outgoing) -> Step {
        if let Outgoing::Item(seq) = out {
            *self.send_counts.entry(seq).or_default() += 1;
        }
        self.last_sent = Some(out);
        Step::Send(out)
    }

    fn finish(&mut self, outcome: Result<(), UploadError>) -> Step {
        self.state = match &outcome {
            Ok(()) => UploadState::Acknowledged,
            Err(e) => UploadState::Failed(e.clone()),
        };
        Step::Done(outcome)
    }
}
