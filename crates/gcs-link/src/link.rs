use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mavlink::common::MavMessage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::{self, MAX_FRAME_LEN};
use crate::dispatch::{Dispatcher, MissionRoute, TelemetrySink};
use crate::heartbeat::gcs_heartbeat;
use crate::outbound::{FrameWriter, Outbound};
use crate::transport::{LinkAddress, UdpTransport};
use crate::{LinkConfig, LinkError};

const RECV_ERROR_PAUSE: Duration = Duration::from_millis(200);

/// Resolves once `stop` reads true or its sender is gone. Cancel-safe, so
/// it can sit in a `select!` inside a loop.
pub async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// A running vehicle link: one reader task feeding the dispatcher, one
/// writer task draining the outbound queue, and an optional GCS heartbeat.
pub struct Link {
    outbound: Outbound,
    missions: MissionRoute,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    pub async fn open(
        cfg: &LinkConfig,
        telemetry: Arc<dyn TelemetrySink>,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, LinkError> {
        let addr: LinkAddress = cfg.address.parse()?;
        let transport = Arc::new(UdpTransport::bind(&addr).await?);
        let local_addr = transport.local_addr()?;

        let missions = MissionRoute::new();
        let dispatcher = Dispatcher::new(telemetry, missions.clone(), cfg.sys_id);
        let (outbound, rx) = Outbound::channel(cfg.outbound_capacity);
        let writer = FrameWriter::new(cfg.sys_id, cfg.comp_id);

        let mut tasks = vec![
            tokio::spawn(read_loop(transport.clone(), dispatcher, stop.clone())),
            tokio::spawn(write_loop(transport, rx, writer, stop.clone())),
        ];
        if cfg.send_heartbeat_hz > 0.0 {
            let period = Duration::from_secs_f32(1.0 / cfg.send_heartbeat_hz.max(0.2));
            tasks.push(tokio::spawn(heartbeat_loop(outbound.clone(), period, stop)));
        }

        Ok(Self { outbound, missions, local_addr, tasks })
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    pub fn missions(&self) -> MissionRoute {
        self.missions.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the link tasks to observe the stop signal.
    pub async fn join(self) {
        for t in self.tasks {
            if let Err(e) = t.await {
                warn!("link: task ended abnormally: {}", e);
            }
        }
    }
}

async fn read_loop(transport: Arc<UdpTransport>, dispatcher: Dispatcher, mut stop: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_FRAME_LEN * 8];
    loop {
        tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            res = transport.recv(&mut buf) => match res {
                Ok(n) => {
                    let decoded = codec::decode_datagram(&buf[..n]);
                    for (hdr, msg) in &decoded.frames {
                        dispatcher.dispatch(hdr, msg);
                    }
                    dispatcher.decode_errors(decoded.errors);
                }
                Err(e) => {
                    // ICMP port-unreachable on a udpout link surfaces here; keep reading.
                    warn!("link: recv failed: {}", e);
                    tokio::time::sleep(RECV_ERROR_PAUSE).await;
                }
            }
        }
    }
    info!("link: reader stopped");
}

async fn write_loop(
    transport: Arc<UdpTransport>,
    mut rx: mpsc::Receiver<MavMessage>,
    mut writer: FrameWriter,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let msg = tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            msg = rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };
        let frame = match writer.next_frame(&msg) {
            Ok(f) => f,
            Err(e) => {
                warn!("link: dropping outbound message: {}", e);
                continue;
            }
        };
        match transport.send(&frame).await {
            Ok(()) => {}
            Err(LinkError::NoPeer) => debug!("link: no peer yet, dropped outbound frame"),
            Err(e) => warn!("link: send failed: {}", e),
        }
    }
    info!("link: writer stopped");
}

async fn heartbeat_loop(outbound: Outbound, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            _ = tick.tick() => {
                if let Err(e) = outbound.try_send(gcs_heartbeat()) {
                    debug!("link: heartbeat not queued: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{GLOBAL_POSITION_INT_DATA, MISSION_COUNT_DATA};
    use mavlink::MavHeader;
    use std::sync::Mutex;
    use tokio::net::UdpSocket;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(MavHeader, MavMessage)>>,
        errors: Mutex<usize>,
    }

    impl TelemetrySink for Recorder {
        fn on_message(&self, header: &MavHeader, msg: &MavMessage) {
            self.seen.lock().unwrap().push((*header, msg.clone()));
        }

        fn on_decode_errors(&self, count: usize) {
            *self.errors.lock().unwrap() += count;
        }
    }

    #[tokio::test]
    async fn wait_for_stop_resolves_on_signal_and_on_drop() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        wait_for_stop(&mut rx).await;

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        wait_for_stop(&mut rx).await;
    }

    #[tokio::test]
    async fn loopback_dispatches_inbound_and_sends_outbound() {
        let rec = Arc::new(Recorder::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let cfg = LinkConfig {
            address: "udpin:127.0.0.1:0".into(),
            send_heartbeat_hz: 0.0,
            ..LinkConfig::default()
        };
        let link = Link::open(&cfg, rec.clone(), stop_rx).await.unwrap();

        // play the vehicle
        let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let hdr = MavHeader { system_id: 1, component_id: 1, sequence: 9 };
        let pos = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA { lat: 473977420, ..Default::default() });
        vehicle.send_to(&codec::encode(hdr, &pos).unwrap(), link.local_addr()).await.unwrap();
        vehicle.send_to(b"junk", link.local_addr()).await.unwrap();

        // the peer is learned from the first datagram, so replies reach the vehicle
        let mut buf = [0u8; 512];
        let out = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA { count: 6, ..Default::default() });
        let got = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                link.outbound().send(out.clone()).await.unwrap();
                if let Ok(Ok((n, _))) =
                    tokio::time::timeout(Duration::from_millis(100), vehicle.recv_from(&mut buf)).await
                {
                    return codec::decode_datagram(&buf[..n]);
                }
            }
        })
        .await
        .unwrap();
        assert!(matches!(got.frames[0].1, MavMessage::MISSION_COUNT(ref d) if d.count == 6));
        assert_eq!(got.frames[0].0.system_id, 255);

        tokio::time::timeout(Duration::from_secs(2), async {
            while *rec.errors.lock().unwrap() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.sequence, 9);
        drop(seen);

        stop_tx.send(true).unwrap();
        link.join().await;
    }

    #[tokio::test]
    async fn reader_survives_an_unreachable_peer() {
        // nothing listens here until the vehicle comes up below
        let port = UdpSocket::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
        let rec = Arc::new(Recorder::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let cfg = LinkConfig {
            address: format!("udpout:127.0.0.1:{}", port),
            send_heartbeat_hz: 0.0,
            ..LinkConfig::default()
        };
        let link = Link::open(&cfg, rec.clone(), stop_rx).await.unwrap();

        // the ICMP reply to this fails the reader's next recv
        let out = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA { count: 1, ..Default::default() });
        link.outbound().send(out).await.unwrap();
        tokio::time::sleep(RECV_ERROR_PAUSE + Duration::from_millis(100)).await;

        let vehicle = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();
        let hdr = MavHeader { system_id: 1, component_id: 1, sequence: 3 };
        let pos = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA::default());
        let to = SocketAddr::from(([127, 0, 0, 1], link.local_addr().port()));
        vehicle.send_to(&codec::encode(hdr, &pos).unwrap(), to).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while rec.seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reader stopped after the recv error");
        assert_eq!(rec.seen.lock().unwrap()[0].0.sequence, 3);
        assert_eq!(*rec.errors.lock().unwrap(), 0);

        stop_tx.send(true).unwrap();
        link.join().await;
    }
}
