use std::time::Duration;

use crate::common::TestChannel;

use heartbeat_monitor::{MonitorEventKind, SessionId};

#[tokio::test]
async fn events_arrive_on_the_channel_in_order() {
    let mut channel = TestChannel::new(Duration::from_millis(100));
    channel.monitor.start();

    let event = channel.recv_event().await;
    assert_eq!(event.session_id, SessionId(2));
    assert_eq!(event.kind, MonitorEventKind::SendHeartbeat);

    let event = channel.recv_event().await;
    assert_eq!(event.kind, MonitorEventKind::HeartbeatTimedOut);
}

#[tokio::test]
async fn monitor_is_idle_by_the_time_a_missed_ack_is_reported() {
    for _ in 0..5 {
        let mut channel = TestChannel::new(Duration::from_millis(20));
        channel.monitor.start();
        assert_eq!(
            channel.recv_event().await.kind,
            MonitorEventKind::SendHeartbeat
        );
        assert_eq!(
            channel.recv_event().await.kind,
            MonitorEventKind::HeartbeatTimedOut
        );
        // No settling delay: a consumer acting on the event sees it stopped.
        assert!(!channel.monitor.is_running());
    }
}

#[tokio::test]
async fn simulated_transport_keeps_the_link_up() {
    let mut channel = TestChannel::new(Duration::from_millis(50));
    channel.monitor.start();

    // Play the transport: answer every heartbeat as if the peer acked it.
    for _ in 0..4 {
        let event = channel.recv_event().await;
        assert_eq!(event.kind, MonitorEventKind::SendHeartbeat);
        channel.monitor.notify_transport_output_activity();
        channel.monitor.heartbeat_ack_received();
    }
    assert!(channel.monitor.is_running());
}

#[tokio::test]
async fn peer_heartbeat_produces_an_ack_event() {
    let mut channel = TestChannel::new(Duration::from_secs(5));
    channel.monitor.start();
    channel.monitor.heartbeat_received();

    let event = channel.recv_event().await;
    assert_eq!(event.kind, MonitorEventKind::SendHeartbeatAck);
    channel.expect_silence(Duration::from_millis(100)).await;
}
