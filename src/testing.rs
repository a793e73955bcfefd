use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::heartbeat::HeartbeatMonitor;
use crate::listener::{HeartbeatMonitorListener, MonitorEventKind};

/// Listener that records every notification with the time it arrived.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(MonitorEventKind, Instant)>>,
    changed: Notify,
    stop_on_timeout: bool,
    restart_on_timeout: bool,
    panic_on_heartbeat: bool,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `stop` on the monitor from inside `heartbeat_timed_out`.
    pub fn stopping_on_timeout() -> Self {
        Self {
            stop_on_timeout: true,
            ..Self::default()
        }
    }

    /// Calls `start` on the monitor from inside `heartbeat_timed_out`.
    pub fn restarting_on_timeout() -> Self {
        Self {
            restart_on_timeout: true,
            ..Self::default()
        }
    }

    /// Panics inside `send_heartbeat`, taking the monitor's worker down with it.
    pub fn panicking_on_heartbeat() -> Self {
        Self {
            panic_on_heartbeat: true,
            ..Self::default()
        }
    }

    pub fn count(&self, kind: MonitorEventKind) -> usize {
        count_of(&self.lock(), kind)
    }

    pub fn kinds(&self) -> Vec<MonitorEventKind> {
        self.lock().iter().map(|(kind, _)| *kind).collect()
    }

    /// When the first `kind` notification arrived.
    pub fn first(&self, kind: MonitorEventKind) -> Option<Instant> {
        self.lock()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, at)| *at)
    }

    /// Wait until `kind` has been seen `count` times or `timeout` expires.
    pub async fn wait_for(&self, kind: MonitorEventKind, count: usize, timeout: Duration) -> bool {
        let seen = async {
            loop {
                let notified = self.changed.notified();
                if self.count(kind) >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, seen).await.is_ok()
    }

    fn record(&self, kind: MonitorEventKind) {
        self.lock().push((kind, Instant::now()));
        self.changed.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(MonitorEventKind, Instant)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn count_of(events: &[(MonitorEventKind, Instant)], kind: MonitorEventKind) -> usize {
    events.iter().filter(|(k, _)| *k == kind).count()
}

impl HeartbeatMonitorListener for RecordingListener {
    fn send_heartbeat(&self, _monitor: &HeartbeatMonitor) {
        self.record(MonitorEventKind::SendHeartbeat);
        if self.panic_on_heartbeat {
            panic!("listener failed while sending a heartbeat");
        }
    }

    fn send_heartbeat_ack(&self, _monitor: &HeartbeatMonitor) {
        self.record(MonitorEventKind::SendHeartbeatAck);
    }

    fn heartbeat_timed_out(&self, monitor: &HeartbeatMonitor) {
        self.record(MonitorEventKind::HeartbeatTimedOut);
        if self.stop_on_timeout {
            monitor.stop();
        }
        if self.restart_on_timeout {
            monitor.start();
        }
    }
}
