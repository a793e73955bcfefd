use std::time::{Duration, Instant};

use crate::common::{TestMonitor, WAIT};

use heartbeat_monitor::MonitorEventKind::{HeartbeatTimedOut, SendHeartbeat};
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_millis(200);

#[tokio::test]
async fn output_activity_defers_the_ack_timeout() {
    let t = TestMonitor::with_interval(INTERVAL);
    let started = Instant::now();
    t.monitor.start();

    sleep(INTERVAL / 2).await;
    let active_at = Instant::now();
    t.monitor.notify_transport_output_activity();

    assert!(t.listener.wait_for(SendHeartbeat, 1, WAIT).await);
    let fired_at = t.listener.first(SendHeartbeat).unwrap();
    assert!(
        fired_at >= active_at + INTERVAL,
        "fired {:?} after start, expected at least {:?}",
        fired_at - started,
        (active_at + INTERVAL) - started
    );
}

#[tokio::test]
async fn steady_output_activity_keeps_the_check_from_firing() {
    let t = TestMonitor::with_interval(INTERVAL);
    t.monitor.start();

    for _ in 0..8 {
        sleep(INTERVAL / 4).await;
        t.monitor.notify_transport_output_activity();
    }
    assert!(t.listener.kinds().is_empty());
    assert!(t.monitor.is_running());
}

#[tokio::test]
async fn input_activity_does_not_reset_any_timer() {
    let t = TestMonitor::with_interval(INTERVAL);
    let started = Instant::now();
    t.monitor.start();

    sleep(INTERVAL / 2).await;
    t.monitor.notify_transport_input_activity();

    assert!(t.listener.wait_for(SendHeartbeat, 1, WAIT).await);
    let fired_at = t.listener.first(SendHeartbeat).unwrap();
    // A reset would have pushed the firing to 1.5 intervals.
    assert!(
        fired_at < started + INTERVAL + INTERVAL / 3,
        "fired {:?} after start",
        fired_at - started
    );
}

#[tokio::test]
async fn interval_change_waits_for_the_next_reschedule() {
    let t = TestMonitor::with_interval(INTERVAL);
    let started = Instant::now();
    t.monitor.start();
    t.monitor.set_interval(Duration::from_secs(2));
    assert_eq!(t.monitor.interval(), Duration::from_secs(2));

    // Already armed under the old interval.
    assert!(t.listener.wait_for(SendHeartbeat, 1, WAIT).await);
    let fired_at = t.listener.first(SendHeartbeat).unwrap();
    assert!(fired_at - started < Duration::from_secs(1));

    // Re-armed under the new one: nothing else for a while.
    sleep(INTERVAL * 3).await;
    assert_eq!(t.listener.count(SendHeartbeat), 1);
    assert_eq!(t.listener.count(HeartbeatTimedOut), 0);
    assert!(t.monitor.is_running());
}

#[tokio::test]
async fn output_activity_uses_the_current_interval() {
    let t = TestMonitor::with_interval(Duration::from_secs(5));
    let started = Instant::now();
    t.monitor.start();
    t.monitor.set_interval(INTERVAL);
    t.monitor.notify_transport_output_activity();

    assert!(t.listener.wait_for(SendHeartbeat, 1, WAIT).await);
    let fired_at = t.listener.first(SendHeartbeat).unwrap();
    assert!(fired_at - started < Duration::from_secs(1));
}
