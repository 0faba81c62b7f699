mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pulsefeed::domain::types::UserId;
use pulsefeed::realtime::{ConnectionId, ConnectionState, Hub, HubConfig, OutboundFrame};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use support::{BrokenTransport, json, recording, stalled, stalled_ping};

const WAIT: Duration = Duration::from_secs(2);

fn hub_with_capacity(queue_capacity: usize) -> Hub {
    Hub::new(HubConfig {
        queue_capacity,
        ping_interval: None,
    })
}

fn frame(seq: u32) -> OutboundFrame {
    Arc::from(format!(r#"{{"type":"tick","data":{seq}}}"#).as_str())
}

async fn wait_until_unregistered(hub: &Hub, id: ConnectionId) {
    timeout(WAIT, async {
        while hub.is_registered(id) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("connection removed in time");
}

async fn expect_seq(rx: &mut UnboundedReceiver<String>, seq: u32) {
    let got = timeout(WAIT, rx.recv())
        .await
        .expect("frame arrives in time")
        .expect("frame");
    assert_eq!(json(&got)["data"], seq);
}

#[tokio::test]
async fn slow_consumer_is_evicted_without_stalling_others() {
    let hub = hub_with_capacity(1);

    let (stuck, started, closed) = stalled();
    let slow_id = ConnectionId::new();
    let slow = hub.register(slow_id, UserId(1), stuck);

    let (healthy, mut received) = recording();
    hub.register(ConnectionId::new(), UserId(2), healthy);

    // First frame is picked up by the slow writer and never finishes.
    assert_eq!(hub.broadcast(&frame(1)), 2);
    timeout(WAIT, started.notified())
        .await
        .expect("slow writer started sending");
    expect_seq(&mut received, 1).await;

    // Second frame fills the slow queue, third overflows it.
    assert_eq!(hub.broadcast(&frame(2)), 2);
    expect_seq(&mut received, 2).await;
    assert_eq!(hub.broadcast(&frame(3)), 1);
    expect_seq(&mut received, 3).await;

    assert!(!hub.is_registered(slow_id));
    assert_eq!(hub.connection_count(), 1);
    assert_eq!(hub.user_connection_count(UserId(1)), 0);

    timeout(WAIT, slow.closed()).await.expect("slow connection closed");
    timeout(WAIT, async {
        while slow.state() != ConnectionState::Closed {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("slow writer finished");
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn deregister_interrupts_a_stalled_keepalive_ping() {
    let hub = Hub::new(HubConfig {
        queue_capacity: 4,
        ping_interval: Some(Duration::from_millis(20)),
    });

    let (transport, ping_started, closed) = stalled_ping();
    let id = ConnectionId::new();
    let handle = hub.register(id, UserId(6), transport);

    timeout(WAIT, ping_started.notified())
        .await
        .expect("keep-alive ping started");
    assert!(hub.deregister(id));

    timeout(WAIT, async {
        while handle.state() != ConnectionState::Closed {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("writer finished after deregister");
    assert!(closed.load(Ordering::SeqCst));

    assert_eq!(
        timeout(WAIT, hub.shutdown()).await.expect("shutdown completes"),
        0
    );
}

#[tokio::test]
async fn failed_write_removes_only_that_connection() {
    let hub = hub_with_capacity(8);

    let broken_id = ConnectionId::new();
    hub.register(broken_id, UserId(5), BrokenTransport);
    let (healthy, mut received) = recording();
    let healthy_id = ConnectionId::new();
    hub.register(healthy_id, UserId(5), healthy);

    assert_eq!(hub.send_to_user(UserId(5), &frame(1)), 2);
    wait_until_unregistered(&hub, broken_id).await;

    assert!(hub.is_registered(healthy_id));
    assert_eq!(hub.user_connection_count(UserId(5)), 1);
    let got = timeout(WAIT, received.recv()).await.expect("delivered").expect("frame");
    assert_eq!(json(&got)["data"], 1);

    assert_eq!(hub.send_to_user(UserId(5), &frame(2)), 1);
}

#[tokio::test]
async fn targeted_send_reaches_every_session_of_one_user() {
    let hub = hub_with_capacity(8);

    let (phone, mut phone_rx) = recording();
    let (laptop, mut laptop_rx) = recording();
    let (other, mut other_rx) = recording();
    hub.register(ConnectionId::new(), UserId(7), phone);
    hub.register(ConnectionId::new(), UserId(7), laptop);
    hub.register(ConnectionId::new(), UserId(8), other);

    assert_eq!(hub.send_to_user(UserId(7), &frame(42)), 2);

    for rx in [&mut phone_rx, &mut laptop_rx] {
        let got = timeout(WAIT, rx.recv()).await.expect("delivered").expect("frame");
        assert_eq!(json(&got)["data"], 42);
    }
    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn late_connection_does_not_receive_earlier_events() {
    let hub = hub_with_capacity(8);
    assert_eq!(hub.broadcast(&frame(1)), 0);

    let (late, mut rx) = recording();
    hub.register(ConnectionId::new(), UserId(3), late);
    assert_eq!(hub.broadcast(&frame(2)), 1);

    let got = timeout(WAIT, rx.recv()).await.expect("delivered").expect("frame");
    assert_eq!(json(&got)["data"], 2);
}

#[tokio::test]
async fn closing_a_handle_twice_is_a_no_op() {
    let hub = hub_with_capacity(8);
    let (transport, _rx) = recording();
    let handle = hub.register(ConnectionId::new(), UserId(9), transport);

    assert!(handle.close());
    assert!(!handle.close());
    assert!(!hub.deregister(handle.id()));
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn replaced_handle_cannot_remove_its_successor() {
    let hub = hub_with_capacity(8);
    let id = ConnectionId::new();

    let (first, _first_rx) = recording();
    let stale = hub.register(id, UserId(4), first);
    let (second, mut second_rx) = recording();
    hub.register(id, UserId(4), second);

    assert!(!stale.close());
    assert!(hub.is_registered(id));

    assert_eq!(hub.send_to_user(UserId(4), &frame(5)), 1);
    let got = timeout(WAIT, second_rx.recv()).await.expect("delivered").expect("frame");
    assert_eq!(json(&got)["data"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_and_broadcast_stay_consistent() {
    let hub = hub_with_capacity(256);

    let mut tasks = Vec::new();
    for user in 0..16_i64 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let (transport, rx) = recording();
            let handle = hub.register(ConnectionId::new(), UserId(user), transport);
            for seq in 0..8 {
                hub.broadcast(&frame(seq));
            }
            (handle, rx)
        }));
    }

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.expect("task completed"));
    }
    assert_eq!(hub.connection_count(), 16);

    for (handle, _rx) in &sessions {
        assert!(handle.close());
    }
    assert_eq!(hub.connection_count(), 0);
    assert_eq!(hub.shutdown().await, 0);
}
