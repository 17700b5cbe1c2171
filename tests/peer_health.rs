//! Peer health monitoring over real TCP.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use ledger_relay::config::{HealthCheckConfig, PeerConfig};
use ledger_relay::health::{
    ConnectionHealthMonitor, ConnectivityState, HealthError, PeerConnection, TcpPeerConnection,
};
use ledger_relay::lifecycle::Shutdown;

mod common;
use common::closed_addr;

fn peer(endpoint: String) -> Arc<TcpPeerConnection> {
    Arc::new(TcpPeerConnection::new(&PeerConfig {
        endpoint,
        probe_timeout_ms: 500,
    }))
}

fn fast_checks() -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: true,
        interval_secs: 1,
        timeout_secs: 1,
        wait_interval_ms: 25,
        startup_wait_secs: 1,
    }
}

#[tokio::test]
async fn test_reachable_peer_is_healthy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let conn = peer(listener.local_addr().unwrap().to_string());
    let monitor = ConnectionHealthMonitor::new(conn.clone(), &fast_checks());

    let status = monitor.check_health().await;
    assert!(status.healthy);
    assert_eq!(status.state, ConnectivityState::Ready);
    assert!(status.error.is_none());
    assert_eq!(monitor.last_status().unwrap().state, ConnectivityState::Ready);
}

#[tokio::test]
async fn test_wait_for_healthy_gives_up_on_dead_peer() {
    let conn = peer(closed_addr().await.to_string());
    let monitor = ConnectionHealthMonitor::new(conn, &fast_checks());
    let shutdown = Shutdown::new();

    let err = monitor
        .wait_for_healthy(&shutdown.subscribe(), Duration::from_millis(200))
        .await
        .unwrap_err();
    match err {
        HealthError::Timeout { last_error, .. } => assert!(last_error.is_some()),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(
        monitor.last_status().unwrap().state,
        ConnectivityState::TransientFailure
    );
}

#[tokio::test]
async fn test_wait_for_healthy_sees_peer_come_up() {
    let addr = closed_addr().await;
    let conn = peer(addr.to_string());
    let monitor = ConnectionHealthMonitor::new(conn, &fast_checks());
    let shutdown = Shutdown::new();

    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        loop {
            let _ = listener.accept().await;
        }
    });

    let status = monitor
        .wait_for_healthy(&shutdown.subscribe(), Duration::from_secs(3))
        .await
        .unwrap();
    assert!(status.healthy);
    server.abort();
}

#[tokio::test]
async fn test_wait_for_healthy_stops_on_shutdown() {
    let conn = peer(closed_addr().await.to_string());
    let monitor = ConnectionHealthMonitor::new(conn, &fast_checks());
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.trigger();
    });

    let err = monitor
        .wait_for_healthy(&signal, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, HealthError::Cancelled { .. }));
    trigger.await.unwrap();
}

#[tokio::test]
async fn test_continuous_checks_report_closed_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let conn = peer(listener.local_addr().unwrap().to_string());
    let monitor = Arc::new(ConnectionHealthMonitor::new(conn.clone(), &fast_checks()));
    let shutdown = Shutdown::new();

    let healthy = Arc::new(AtomicU32::new(0));
    let unhealthy = Arc::new(AtomicU32::new(0));
    let (h, u) = (healthy.clone(), unhealthy.clone());
    let handle = monitor.start_continuous_health_check(
        shutdown.subscribe(),
        Duration::from_millis(20),
        move |status| {
            if status.healthy {
                h.fetch_add(1, Ordering::SeqCst);
            } else {
                u.fetch_add(1, Ordering::SeqCst);
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(healthy.load(Ordering::SeqCst) > 0);

    conn.close();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(unhealthy.load(Ordering::SeqCst) > 0);
    assert_eq!(conn.state(), ConnectivityState::Shutdown);

    let last = monitor.last_status().unwrap();
    assert!(!last.healthy);
    assert_eq!(last.state, ConnectivityState::Shutdown);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
