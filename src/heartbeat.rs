use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{DEFAULT_INTERVAL, MonitorConfig};
use crate::listener::HeartbeatMonitorListener;
use crate::session::SessionId;
use crate::timer::{Scheduler, TimerHandler, TimerKind};

/// Keepalive watchdog for one session.
///
/// While running, the monitor expects the peer to acknowledge each heartbeat
/// within `interval`. Every elapsed interval with an ack asks the listener to
/// send the next heartbeat; an interval without one reports a timeout and
/// stops the monitor. Heartbeats arriving from the peer are answered through
/// the listener when `ack_required` is set.
///
/// Handles are cheap to clone and share one monitor. Dropping the last
/// handle stops the worker without waiting for it.
#[derive(Clone)]
pub struct HeartbeatMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: SessionId,
    interval_nanos: AtomicU64,
    ack_required: AtomicBool,
    // Lock order: `proofs` before `scheduler`.
    proofs: Mutex<ProofState>,
    scheduler: Mutex<Option<Scheduler>>,
}

#[derive(Default)]
struct ProofState {
    ack_received: bool,
    heartbeat_received: bool,
    // A posted receive check that has not run yet; later heartbeats share it.
    receive_check_pending: bool,
    listener: Option<Arc<dyn HeartbeatMonitorListener>>,
}

impl Inner {
    fn proofs(&self) -> MutexGuard<'_, ProofState> {
        self.proofs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheduler(&self) -> MutexGuard<'_, Option<Scheduler>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HeartbeatMonitor {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id,
                interval_nanos: AtomicU64::new(duration_to_nanos(DEFAULT_INTERVAL)),
                ack_required: AtomicBool::new(true),
                proofs: Mutex::new(ProofState::default()),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn with_config(session_id: SessionId, config: &MonitorConfig) -> Self {
        let monitor = Self::new(session_id);
        monitor.apply_config(config);
        monitor
    }

    pub fn apply_config(&self, config: &MonitorConfig) {
        self.set_interval(config.interval);
        self.set_ack_required(config.ack_required);
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.inner.interval_nanos.load(Ordering::Acquire))
    }

    /// Applies from the next time a timer is armed; a pending timer keeps its
    /// deadline.
    pub fn set_interval(&self, interval: Duration) {
        if interval.is_zero() {
            warn!(
                "[session {}] Ignoring zero heartbeat interval",
                self.session_id()
            );
            return;
        }
        self.inner
            .interval_nanos
            .store(duration_to_nanos(interval), Ordering::Release);
    }

    pub fn ack_required(&self) -> bool {
        self.inner.ack_required.load(Ordering::Acquire)
    }

    /// Whether heartbeats from the peer must be answered with an ack.
    pub fn set_ack_required(&self, ack_required: bool) {
        self.inner
            .ack_required
            .store(ack_required, Ordering::Release);
    }

    pub fn listener(&self) -> Option<Arc<dyn HeartbeatMonitorListener>> {
        self.inner.proofs().listener.clone()
    }

    pub fn set_listener(&self, listener: Arc<dyn HeartbeatMonitorListener>) {
        self.inner.proofs().listener = Some(listener);
    }

    pub fn clear_listener(&self) {
        self.inner.proofs().listener = None;
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler().is_some()
    }

    /// Start watching the session. Does nothing if already running.
    pub fn start(&self) {
        let session_id = self.session_id();
        let mut proofs = self.inner.proofs();
        let mut slot = self.inner.scheduler();
        if slot.is_some() {
            debug!("[session {session_id}] Heartbeat monitor already started; doing nothing");
            return;
        }

        proofs.ack_received = true;
        proofs.heartbeat_received = true;
        proofs.receive_check_pending = false;

        let timers = MonitorTimers {
            inner: Arc::downgrade(&self.inner),
        };
        let scheduler = match Scheduler::spawn(format!("heartbeat-{session_id}"), timers) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!("[session {session_id}] Couldn't start heartbeat worker: {e}");
                return;
            }
        };

        let interval = self.interval();
        if let Err(e) = scheduler.schedule(TimerKind::AckTimeout, interval) {
            // Dropping the scheduler cancels whatever is left of it.
            error!("[session {session_id}] {e}");
            return;
        }

        info!("[session {session_id}] Heartbeat monitor started, interval {interval:?}");
        *slot = Some(scheduler);
    }

    /// Stop watching and cancel both timers. Safe to call when idle, more than
    /// once, or from a listener callback. When called from any other thread,
    /// no callback runs after this returns.
    pub fn stop(&self) {
        let scheduler = self.inner.scheduler().take();
        match scheduler {
            Some(scheduler) => {
                info!("[session {}] Stopping heartbeat monitor", self.session_id());
                scheduler.shutdown();
            }
            None => debug!("[session {}] Heartbeat monitor is not started", self.session_id()),
        }
    }

    /// The transport sent bytes: push the ack check a full interval out.
    pub fn notify_transport_output_activity(&self) {
        let result = {
            let slot = self.inner.scheduler();
            let Some(scheduler) = slot.as_ref() else {
                return;
            };
            scheduler.schedule(TimerKind::AckTimeout, self.interval())
        };
        if let Err(e) = result {
            error!("[session {}] {e}", self.session_id());
            self.stop();
        }
    }

    /// Inbound traffic does not reset any timer; only acknowledgments and
    /// heartbeats from the peer count as proof of life.
    pub fn notify_transport_input_activity(&self) {}

    /// The peer acknowledged our heartbeat. Valid at any time; while idle the
    /// flag is simply overwritten by the next `start`.
    pub fn heartbeat_ack_received(&self) {
        self.inner.proofs().ack_received = true;
        debug!("[session {}] Heartbeat ACK received", self.session_id());
    }

    /// The peer sent us a heartbeat. When acks are required, the receive check
    /// runs on the worker right away.
    pub fn heartbeat_received(&self) {
        if !self.ack_required() {
            return;
        }
        let result = {
            let mut proofs = self.inner.proofs();
            let slot = self.inner.scheduler();
            let Some(scheduler) = slot.as_ref() else {
                return;
            };
            proofs.heartbeat_received = true;
            if proofs.receive_check_pending {
                return;
            }
            proofs.receive_check_pending = true;
            scheduler.post(TimerKind::ReceiveTimeout)
        };
        if let Err(e) = result {
            error!("[session {}] {e}", self.session_id());
            self.stop();
        }
    }

    // Flags are checked and reset under the lock; the listener runs after the
    // guard is dropped so it may call back into the monitor.
    fn ack_timeout_elapsed(&self) -> Option<Duration> {
        let session_id = self.session_id();
        let (acked, listener) = {
            let mut proofs = self.inner.proofs();
            let acked = std::mem::take(&mut proofs.ack_received);
            (acked, proofs.listener.clone())
        };

        if acked {
            debug!("[session {session_id}] ACK has been received, sending heartbeat");
            match listener {
                Some(listener) => listener.send_heartbeat(self),
                None => warn!("[session {session_id}] Listener is not set, rescheduling anyway"),
            }
            Some(self.interval())
        } else {
            info!("[session {session_id}] ACK has not been received in time");
            // Stopped before the listener hears of it, so it sees an idle
            // monitor and may restart it.
            self.stop_from_worker();
            if let Some(listener) = listener {
                listener.heartbeat_timed_out(self);
            }
            None
        }
    }

    fn receive_timeout_elapsed(&self) {
        let session_id = self.session_id();
        let (received, listener) = {
            let mut proofs = self.inner.proofs();
            proofs.receive_check_pending = false;
            let received = std::mem::take(&mut proofs.heartbeat_received);
            (received, proofs.listener.clone())
        };

        if received {
            debug!("[session {session_id}] Heartbeat has been received, sending ACK");
            match listener {
                Some(listener) => listener.send_heartbeat_ack(self),
                None => warn!("[session {session_id}] Listener is not set, dropping ACK"),
            }
        } else {
            info!("[session {session_id}] Heartbeat has not been received");
            if let Some(listener) = listener {
                listener.heartbeat_timed_out(self);
            }
        }
    }

    // Only tears down the context this worker belongs to; a concurrent
    // stop/start may already have installed a new one.
    fn stop_from_worker(&self) {
        let scheduler = {
            let mut slot = self.inner.scheduler();
            if slot.as_ref().is_some_and(Scheduler::is_worker_thread) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(scheduler) = scheduler {
            info!(
                "[session {}] Stopping heartbeat monitor after timeout",
                self.session_id()
            );
            scheduler.shutdown();
        }
    }
}

impl fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("session_id", &self.session_id())
            .field("interval", &self.interval())
            .field("ack_required", &self.ack_required())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Timer callbacks as seen from the worker. Holds the monitor weakly so an
/// abandoned monitor does not keep its worker alive.
struct MonitorTimers {
    inner: Weak<Inner>,
}

impl TimerHandler for MonitorTimers {
    fn on_timer(&mut self, timer: TimerKind) -> Option<Duration> {
        let monitor = HeartbeatMonitor {
            inner: self.inner.upgrade()?,
        };
        match timer {
            TimerKind::AckTimeout => monitor.ack_timeout_elapsed(),
            TimerKind::ReceiveTimeout => {
                monitor.receive_timeout_elapsed();
                None
            }
        }
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
