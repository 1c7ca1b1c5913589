use mavlink::common::MavMessage;
use mavlink::MavHeader;
use tokio::sync::mpsc;

use crate::{codec, LinkError};

/// Cloneable handle onto the single outbound queue. One writer task drains
/// the queue, so frames leave in the order they were queued and the header
/// sequence counter has exactly one owner.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<MavMessage>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MavMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Waits for queue space.
    pub async fn send(&self, msg: MavMessage) -> Result<(), LinkError> {
        self.tx.send(msg).await.map_err(|_| LinkError::Closed)
    }

    /// Best-effort: a full queue drops the message.
    pub fn try_send(&self, msg: MavMessage) -> Result<(), LinkError> {
        use mpsc::error::TrySendError;
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LinkError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(LinkError::Closed),
        }
    }
}

/// Frames messages with our identity and a wrapping sequence number.
#[derive(Debug)]
pub struct FrameWriter {
    hdr: MavHeader,
}

impl FrameWriter {
    pub fn new(sys_id: u8, comp_id: u8) -> Self {
        Self { hdr: MavHeader { system_id: sys_id, component_id: comp_id, sequence: 0 } }
    }

    pub fn next_frame(&mut self, msg: &MavMessage) -> Result<Vec<u8>, LinkError> {
        let frame = codec::encode(self.hdr, msg)?;
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::gcs_heartbeat;

    #[test]
    fn frame_writer_stamps_identity_and_wraps_sequence() {
        let mut w = FrameWriter::new(255, 190);
        w.hdr.sequence = 255;
        let a = codec::decode_datagram(&w.next_frame(&gcs_heartbeat()).unwrap());
        let b = codec::decode_datagram(&w.next_frame(&gcs_heartbeat()).unwrap());
        assert_eq!(a.frames[0].0.system_id, 255);
        assert_eq!(a.frames[0].0.component_id, 190);
        assert_eq!(a.frames[0].0.sequence, 255);
        assert_eq!(b.frames[0].0.sequence, 0);
    }

    #[tokio::test]
    async fn try_send_reports_full_and_closed() {
        let (out, rx) = Outbound::channel(1);
        out.try_send(gcs_heartbeat()).unwrap();
        assert!(matches!(out.try_send(gcs_heartbeat()), Err(LinkError::QueueFull)));
        drop(rx);
        assert!(matches!(out.send(gcs_heartbeat()).await, Err(LinkError::Closed)));
    }
}
