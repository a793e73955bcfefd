use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::common::{TestMonitor, WAIT};

use heartbeat_monitor::MonitorEventKind::{HeartbeatTimedOut, SendHeartbeat, SendHeartbeatAck};
use tokio::task::spawn_blocking;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_millis(30);

#[tokio::test]
async fn concurrent_acks_keep_the_link_alive() {
    let t = TestMonitor::with_interval(INTERVAL);
    t.monitor.start();

    let done = Arc::new(AtomicBool::new(false));
    let ackers: Vec<_> = (0..8)
        .map(|_| {
            let monitor = t.monitor.clone();
            let done = done.clone();
            spawn_blocking(move || {
                while !done.load(Ordering::Relaxed) {
                    monitor.heartbeat_ack_received();
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();

    assert!(t.listener.wait_for(SendHeartbeat, 6, WAIT).await);
    done.store(true, Ordering::Relaxed);
    for acker in ackers {
        acker.await.unwrap();
    }
    assert_eq!(t.listener.count(HeartbeatTimedOut), 0);
}

#[tokio::test]
async fn concurrent_peer_heartbeats_are_never_reported_as_missing() {
    let t = TestMonitor::with_interval(Duration::from_secs(5));
    t.monitor.start();

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let monitor = t.monitor.clone();
            spawn_blocking(move || {
                for _ in 0..25 {
                    monitor.heartbeat_received();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }

    assert!(t.listener.wait_for(SendHeartbeatAck, 1, WAIT).await);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(t.listener.count(HeartbeatTimedOut), 0);
}

#[tokio::test]
async fn racing_start_and_stop_leave_a_consistent_monitor() {
    let t = TestMonitor::with_interval(INTERVAL);

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let monitor = t.monitor.clone();
            spawn_blocking(move || {
                for _ in 0..20 {
                    if i % 2 == 0 {
                        monitor.start();
                    } else {
                        monitor.stop();
                    }
                    monitor.notify_transport_output_activity();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.unwrap();
    }

    t.monitor.stop();
    assert!(!t.monitor.is_running());
    let seen = t.listener.kinds().len();
    sleep(INTERVAL * 4).await;
    assert_eq!(t.listener.kinds().len(), seen);

    t.monitor.start();
    assert!(t.monitor.is_running());
}

#[tokio::test]
async fn external_stop_races_with_a_timing_out_callback() {
    for _ in 0..10 {
        let t = TestMonitor::with_interval(Duration::from_millis(5));
        t.monitor.start();
        sleep(Duration::from_millis(10)).await;
        t.monitor.stop();
        assert!(!t.monitor.is_running());
        let seen = t.listener.kinds().len();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(t.listener.kinds().len(), seen);
    }
}
