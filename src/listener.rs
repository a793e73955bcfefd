use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::heartbeat::HeartbeatMonitor;
use crate::session::SessionId;

/// Observer of a [`HeartbeatMonitor`]. Every method runs on the monitor's
/// worker thread and must return quickly. Calling back into the monitor is
/// allowed; by the time `heartbeat_timed_out` runs for a missed ack the
/// monitor is already stopped.
pub trait HeartbeatMonitorListener: Send + Sync {
    /// The peer acknowledged our last heartbeat; transmit the next one.
    fn send_heartbeat(&self, monitor: &HeartbeatMonitor);

    /// The peer sent us a heartbeat; transmit its acknowledgment.
    fn send_heartbeat_ack(&self, monitor: &HeartbeatMonitor);

    fn heartbeat_timed_out(&self, monitor: &HeartbeatMonitor);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorEventKind {
    SendHeartbeat,
    SendHeartbeatAck,
    HeartbeatTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    pub session_id: SessionId,
    pub kind: MonitorEventKind,
}

pub type EventTx = mpsc::UnboundedSender<MonitorEvent>;
pub type EventRx = mpsc::UnboundedReceiver<MonitorEvent>;

/// Listener that hands every notification to an async consumer, typically
/// the transport task that owns the socket.
pub struct ChannelListener {
    tx: EventTx,
}

impl ChannelListener {
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Arc<Self>, EventRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }

    fn forward(&self, monitor: &HeartbeatMonitor, kind: MonitorEventKind) {
        let event = MonitorEvent {
            session_id: monitor.session_id(),
            kind,
        };
        debug!("Forwarding monitor event: {event:?}");
        self.tx.send(event).unwrap_or_else(|e| {
            error!("Sending monitor event through channel failed: {e}");
        })
    }
}

impl HeartbeatMonitorListener for ChannelListener {
    fn send_heartbeat(&self, monitor: &HeartbeatMonitor) {
        self.forward(monitor, MonitorEventKind::SendHeartbeat);
    }

    fn send_heartbeat_ack(&self, monitor: &HeartbeatMonitor) {
        self.forward(monitor, MonitorEventKind::SendHeartbeatAck);
    }

    fn heartbeat_timed_out(&self, monitor: &HeartbeatMonitor) {
        self.forward(monitor, MonitorEventKind::HeartbeatTimedOut);
    }
}
