use anyhow::Result;
use heartbeat_monitor::{
    ChannelListener, HeartbeatMonitor, MonitorConfig, MonitorEvent, MonitorEventKind, SessionId,
};
use log::*;
use rand::Rng;
use std::env;
use std::time::Duration;
use tokio::sync::mpsc;

/// What travels over the simulated link between the two endpoints.
#[derive(Debug, Clone, Copy)]
enum LinkFrame {
    Heartbeat,
    HeartbeatAck,
    Data { seq: u32 },
}

type LinkTx = mpsc::UnboundedSender<LinkFrame>;
type LinkRx = mpsc::UnboundedReceiver<LinkFrame>;

struct Endpoint {
    name: &'static str,
    monitor: HeartbeatMonitor,
    link_tx: LinkTx,
    link_rx: LinkRx,
    drop_rate: f64,
}

impl Endpoint {
    /// Put a frame on the link. Lost frames never count as output activity.
    fn transmit(&self, frame: LinkFrame) {
        if self.drop_rate > 0.0 && rand::rng().random_bool(self.drop_rate) {
            warn!("{}: link dropped {frame:?}", self.name);
            return;
        }
        if self.link_tx.send(frame).is_err() {
            warn!("{}: peer is gone, {frame:?} not sent", self.name);
            return;
        }
        self.monitor.notify_transport_output_activity();
    }

    fn receive(&self, frame: LinkFrame) {
        self.monitor.notify_transport_input_activity();
        match frame {
            LinkFrame::Heartbeat => self.monitor.heartbeat_received(),
            LinkFrame::HeartbeatAck => self.monitor.heartbeat_ack_received(),
            LinkFrame::Data { seq } => debug!("{}: data frame {seq}", self.name),
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<MonitorEvent>) -> Result<()> {
        let mut data_tick = tokio::time::interval(self.monitor.interval() * 3);
        let mut seq = 0;
        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    println!("{} {}", self.name, serde_json::to_string(&event)?);
                    match event.kind {
                        MonitorEventKind::SendHeartbeat => self.transmit(LinkFrame::Heartbeat),
                        MonitorEventKind::SendHeartbeatAck => self.transmit(LinkFrame::HeartbeatAck),
                        MonitorEventKind::HeartbeatTimedOut => {
                            // A missed ack stops the monitor before it is reported;
                            // a missed peer heartbeat leaves it running.
                            if !self.monitor.is_running() {
                                info!("{}: link declared dead", self.name);
                                break;
                            }
                        }
                    }
                }
                frame = self.link_rx.recv() => match frame {
                    Some(frame) => self.receive(frame),
                    None => {
                        info!("{}: link closed by peer", self.name);
                        break;
                    }
                },
                _ = data_tick.tick() => {
                    seq += 1;
                    self.transmit(LinkFrame::Data { seq });
                }
            }
        }
        Ok(())
    }
}

fn endpoint(
    name: &'static str,
    session_id: SessionId,
    config: &MonitorConfig,
    link_tx: LinkTx,
    link_rx: LinkRx,
    drop_rate: f64,
) -> (Endpoint, mpsc::UnboundedReceiver<MonitorEvent>) {
    let monitor = HeartbeatMonitor::with_config(session_id, config);
    let (listener, events) = ChannelListener::channel();
    monitor.set_listener(listener);
    (
        Endpoint {
            name,
            monitor,
            link_tx,
            link_rx,
            drop_rate,
        },
        events,
    )
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {key}={raw:?}");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = MonitorConfig::from_env()?;
    let drop_rate = env_or("LINK_DROP_RATE", 0.0_f64).clamp(0.0, 1.0);
    let run_for = Duration::from_secs(env_or("DEMO_DURATION_SECS", 30_u64));
    info!("Starting heartbeat demo: {config:?}, drop rate {drop_rate}, running for {run_for:?}");

    let (local_tx, peer_rx) = mpsc::unbounded_channel();
    let (peer_tx, local_rx) = mpsc::unbounded_channel();
    let session_id = SessionId(1);
    let (local, local_events) = endpoint("local", session_id, &config, local_tx, local_rx, drop_rate);
    let (peer, peer_events) = endpoint("peer", session_id, &config, peer_tx, peer_rx, drop_rate);

    let monitors = [local.monitor.clone(), peer.monitor.clone()];
    for monitor in &monitors {
        monitor.start();
    }

    tokio::select! {
        _ = tokio::time::sleep(run_for) => info!("Demo finished"),
        result = local.run(local_events) => result?,
        result = peer.run(peer_events) => result?,
    }

    for monitor in monitors {
        tokio::task::spawn_blocking(move || monitor.stop()).await?;
    }
    Ok(())
}
