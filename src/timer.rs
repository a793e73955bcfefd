use std::collections::HashMap;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, error, info};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// The timers a monitor's scheduling context can hold. Each kind has at most
/// one pending deadline; scheduling it again replaces the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    AckTimeout,
    ReceiveTimeout,
}

/// Callbacks executed on the scheduler's worker thread.
pub trait TimerHandler: Send + 'static {
    /// Called when `timer` fires. Returning a delay re-arms the same timer,
    /// unless the scheduler was cancelled while the callback ran.
    fn on_timer(&mut self, timer: TimerKind) -> Option<Duration>;
}

#[derive(Debug)]
enum Command {
    Schedule { timer: TimerKind, deadline: Instant },
    Cancel(TimerKind),
}

/// A single-threaded scheduling context: one dedicated thread running a
/// current-thread tokio runtime, serializing every timer callback.
pub struct Scheduler {
    name: String,
    cancel_tx: watch::Sender<bool>,
    command_tx: mpsc::UnboundedSender<Command>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl Scheduler {
    pub fn spawn<H: TimerHandler>(name: impl Into<String>, handler: H) -> Result<Self> {
        let name = name.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let thread_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("{thread_name}: failed to build timer runtime: {e}");
                        return;
                    }
                };
                debug!("{thread_name}: event loop starting");
                runtime.block_on(run_loop(handler, cancel_rx, command_rx));
                debug!("{thread_name}: event loop stopped, exiting thread");
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            name,
            cancel_tx,
            command_tx,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Arm `timer` to fire after `delay`, replacing any pending deadline.
    pub fn schedule(&self, timer: TimerKind, delay: Duration) -> Result<()> {
        let deadline = Instant::now() + delay;
        self.command_tx
            .send(Command::Schedule { timer, deadline })
            .map_err(|_| anyhow!("{}: couldn't schedule {timer:?}, event loop is gone", self.name))
    }

    /// Run `timer` as soon as the worker gets to it.
    pub fn post(&self, timer: TimerKind) -> Result<()> {
        self.schedule(timer, Duration::ZERO)
    }

    pub fn cancel(&self, timer: TimerKind) -> Result<()> {
        self.command_tx
            .send(Command::Cancel(timer))
            .map_err(|_| anyhow!("{}: couldn't cancel {timer:?}, event loop is gone", self.name))
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Cancel every pending timer and end the event loop. Blocks until the
    /// worker has exited, except when called from the worker itself: the loop
    /// then exits as soon as the running callback returns.
    pub fn shutdown(mut self) {
        self.signal_cancel();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.is_worker_thread() {
            debug!("{}: shutdown requested from inside a callback", self.name);
            return;
        }
        if worker.join().is_err() {
            error!("{}: worker thread panicked", self.name);
        }
    }

    fn signal_cancel(&self) {
        if !self.cancel_tx.is_closed() {
            info!("{}: cancelling pending timers", self.name);
            self.cancel_tx.send_replace(true);
        }
    }
}

impl Drop for Scheduler {
    // Dropping without `shutdown` detaches the worker after cancelling it.
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.signal_cancel();
        }
    }
}

async fn run_loop<H: TimerHandler>(
    mut handler: H,
    mut cancel_rx: watch::Receiver<bool>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut deadlines: HashMap<TimerKind, Instant> = HashMap::new();

    loop {
        let next = deadlines
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(timer, deadline)| (*timer, *deadline));

        tokio::select! {
            biased;

            _ = wait_for_cancellation(&mut cancel_rx) => break,

            command = command_rx.recv() => match command {
                Some(Command::Schedule { timer, deadline }) => {
                    deadlines.insert(timer, deadline);
                }
                Some(Command::Cancel(timer)) => {
                    deadlines.remove(&timer);
                }
                None => break,
            },

            timer = sleep_until_next(next) => {
                deadlines.remove(&timer);
                if is_cancelled(&cancel_rx) {
                    break;
                }
                let rearm = handler.on_timer(timer);
                if is_cancelled(&cancel_rx) {
                    break;
                }
                if let Some(delay) = rearm {
                    deadlines.insert(timer, Instant::now() + delay);
                }
            }
        }
    }
}

async fn sleep_until_next(next: Option<(TimerKind, Instant)>) -> TimerKind {
    match next {
        Some((timer, deadline)) => {
            tokio::time::sleep_until(deadline).await;
            timer
        }
        None => std::future::pending().await,
    }
}

async fn wait_for_cancellation(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow_and_update() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow_and_update() {
            return;
        }
    }
}

fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}
