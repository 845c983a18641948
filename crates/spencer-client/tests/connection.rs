//! Integration tests for the connection lifecycle against a real TCP peer.
//!
//! Each test binds a listener on an ephemeral port and plays the robot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use spencer_client::constants::MAX_LINE_LENGTH;
use spencer_client::{
    ChannelObserver, Connection, ConnectionConfig, ConnectionEvent, ConnectionState, Dashboard,
    DashboardUpdate, Endpoint, RobotCommand, SendError,
};

const WAIT: Duration = Duration::from_secs(5);

/// Bind a robot stand-in on an ephemeral port.
async fn robot() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn config_for(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig::new(Endpoint::new(addr.ip().to_string(), addr.port()).unwrap())
}

/// Address with nothing listening on it.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a connection in the background, returning it with its event stream.
fn start(
    config: ConnectionConfig,
) -> (
    Arc<Connection>,
    Arc<ChannelObserver>,
    mpsc::UnboundedReceiver<ConnectionEvent>,
    tokio::task::JoinHandle<()>,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (observer, rx) = ChannelObserver::new();
    let observer = Arc::new(observer);
    let conn = Arc::new(Connection::new(config, &observer));
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.start().await }
    });
    (conn, observer, rx, task)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn expect_state(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>, state: ConnectionState) {
    assert_eq!(next_event(rx).await, ConnectionEvent::StateChanged(state));
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    let n = tokio::time::timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for command")
        .unwrap();
    if n == 0 {
        return None;
    }
    Some(line.trim_end_matches('\n').to_string())
}

/// Assert the state subsequence is well-formed: forward-only, CLOSED exactly once, last.
fn assert_lifecycle(events: &[ConnectionEvent]) {
    let states: Vec<ConnectionState> = events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert!(states.windows(2).all(|w| w[0] < w[1]), "states out of order: {states:?}");
    assert_eq!(states.first(), Some(&ConnectionState::Connecting));
    assert_eq!(states.last(), Some(&ConnectionState::Closed));
    assert_eq!(states.iter().filter(|s| **s == ConnectionState::Closed).count(), 1);
}

#[tokio::test]
async fn test_connect_to_closed_port_goes_straight_to_closed() {
    let addr = closed_port().await;
    let (conn, _observer, mut rx, task) = start(config_for(addr));

    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Closed).await;
    assert!(rx.try_recv().is_err());
    assert!(!conn.was_connected());
    assert!(!conn.is_running());
}

#[tokio::test]
async fn test_sensor_line_then_peer_close() {
    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, task) = start(config_for(addr));

    let (mut peer, _) = listener.accept().await.unwrap();
    peer.write_all(b"sensor Front distance = 13cm\n").await.unwrap();
    drop(peer);

    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            ConnectionEvent::StateChanged(ConnectionState::Connecting),
            ConnectionEvent::StateChanged(ConnectionState::Connected),
            ConnectionEvent::Message("sensor Front distance = 13cm".into()),
            ConnectionEvent::StateChanged(ConnectionState::Closed),
        ]
    );
    assert_lifecycle(&events);
    assert!(conn.was_connected());
    assert_eq!(conn.state(), Some(ConnectionState::Closed));
}

#[tokio::test]
async fn test_lines_delivered_in_arrival_order() {
    let (listener, addr) = robot().await;
    let (_conn, _observer, mut rx, task) = start(config_for(addr));

    let (mut peer, _) = listener.accept().await.unwrap();
    let lines: Vec<String> = (0..50).map(|i| format!("status {i}")).collect();
    // One write with CRLF endings exercises framing across chunk boundaries.
    let blob: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
    peer.write_all(blob.as_bytes()).await.unwrap();
    peer.shutdown().await.unwrap();

    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            ConnectionEvent::Message(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(received, lines);
}

#[tokio::test]
async fn test_commands_arrive_as_whole_lines() {
    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, _task) = start(config_for(addr));

    let (peer, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(peer);

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Connected).await;

    conn.send(RobotCommand::Forward);
    conn.send("stop all");
    conn.try_send(RobotCommand::LiftFront).unwrap();

    assert_eq!(read_line(&mut reader).await.as_deref(), Some("forward"));
    assert_eq!(read_line(&mut reader).await.as_deref(), Some("stop all"));
    assert_eq!(read_line(&mut reader).await.as_deref(), Some("lift front"));

    conn.stop();
    expect_state(&mut rx, ConnectionState::Closed).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_never_interleave() {
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 100;

    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, _task) = start(config_for(addr));
    let (peer, _) = listener.accept().await.unwrap();

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Connected).await;

    let senders: Vec<_> = (0..SENDERS)
        .map(|s| {
            let conn = conn.clone();
            std::thread::spawn(move || {
                for i in 0..PER_SENDER {
                    conn.try_send(format!("sender {s} command {i} with some padding text"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in senders {
        handle.join().unwrap();
    }

    let mut reader = BufReader::new(peer);
    let mut last_seen = vec![None::<usize>; SENDERS];
    for _ in 0..SENDERS * PER_SENDER {
        let line = read_line(&mut reader).await.expect("peer saw EOF early");
        let parts: Vec<&str> = line.split(' ').collect();
        assert_eq!(parts.len(), 8, "mangled line: {line:?}");
        let s: usize = parts[1].parse().unwrap();
        let i: usize = parts[3].parse().unwrap();
        // Per-sender order is preserved by the single writer queue.
        assert_eq!(last_seen[s].map_or(0, |p| p + 1), i);
        last_seen[s] = Some(i);
    }
    assert!(last_seen.iter().all(|l| *l == Some(PER_SENDER - 1)));

    conn.stop();
}

#[tokio::test]
async fn test_stop_ends_a_blocked_read() {
    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, task) = start(config_for(addr));
    let (peer, _) = listener.accept().await.unwrap();

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Connected).await;
    assert!(conn.is_running());

    // The peer stays silent; only stop() can end the session.
    conn.stop();
    conn.stop();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    expect_state(&mut rx, ConnectionState::Closed).await;
    assert!(rx.try_recv().is_err());
    assert!(!conn.is_running());

    // The client closed its side.
    let mut reader = BufReader::new(peer);
    assert_eq!(read_line(&mut reader).await, None);
}

#[tokio::test]
async fn test_peer_that_stops_reading_does_not_block_reads_or_stop() {
    const COMMANDS: usize = 512;

    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, task) = start(config_for(addr));
    let (mut peer, _) = listener.accept().await.unwrap();

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Connected).await;

    // 32 MiB queued against a peer that never reads: far past what the
    // socket buffers hold, so the writer ends up parked mid-write.
    let payload = "x".repeat(64 * 1024);
    for _ in 0..COMMANDS {
        conn.try_send(&payload).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    peer.write_all(b"sensor Front distance = 13cm\n").await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        ConnectionEvent::Message("sensor Front distance = 13cm".into())
    );

    conn.stop();
    expect_state(&mut rx, ConnectionState::Closed).await;
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(!conn.is_running());
}

#[tokio::test]
async fn test_line_without_newline_past_the_cap_closes() {
    let (listener, addr) = robot().await;
    let (conn, _observer, mut rx, task) = start(config_for(addr));
    let (mut peer, _) = listener.accept().await.unwrap();

    expect_state(&mut rx, ConnectionState::Connecting).await;
    expect_state(&mut rx, ConnectionState::Connected).await;

    // The peer keeps the socket open; only the length cap can end this.
    peer.write_all(&vec![b'x'; MAX_LINE_LENGTH + 1]).await.unwrap();

    expect_state(&mut rx, ConnectionState::Closed).await;
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(rx.try_recv().is_err());
    assert!(conn.was_connected());
    drop(peer);
}

#[tokio::test]
async fn test_send_after_close_is_dropped() {
    let (listener, addr) = robot().await;
    let (conn, _observer, _rx, task) = start(config_for(addr));

    let (peer, _) = listener.accept().await.unwrap();
    drop(peer);
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    assert_eq!(conn.try_send("forward"), Err(SendError::NotConnected("CLOSED")));
    conn.send("forward");
}

#[tokio::test]
async fn test_dashboard_fed_through_channel() {
    let (listener, addr) = robot().await;
    let (_conn, _observer, mut rx, task) = start(config_for(addr));

    let (mut peer, _) = listener.accept().await.unwrap();
    for line in [
        "Doing nothing",
        "sensor Front distance = 13cm",
        "sensor Front touch = 1",
        "sensor Front touch = 0",
        "Received 1 messages",
        "sensor Front distance = 10cm",
    ] {
        peer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }
    drop(peer);
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    let mut dash = Dashboard::new(3);
    let mut telemetry_updates = 0;
    while let Ok(event) = rx.try_recv() {
        if dash.apply(event) == DashboardUpdate::Telemetry {
            telemetry_updates += 1;
        }
    }

    assert_eq!(telemetry_updates, 4);
    assert_eq!(dash.status(), Some("Received 1 messages"));
    assert_eq!(dash.state(), Some(ConnectionState::Closed));
    assert_eq!(
        dash.telemetry().snapshot(),
        vec!["sensor Front touch = 1", "sensor Front touch = 0", "sensor Front distance = 10cm"]
    );
}

#[test]
fn test_spawn_runs_on_dedicated_thread() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let addr = rt.block_on(closed_port());

    let (observer, mut rx) = ChannelObserver::new();
    let observer = Arc::new(observer);
    let conn = Arc::new(Connection::new(config_for(addr), &observer));

    let handle = conn.clone().spawn().unwrap();
    handle.join().unwrap();

    assert_eq!(rx.try_recv().unwrap(), ConnectionEvent::StateChanged(ConnectionState::Connecting));
    assert_eq!(rx.try_recv().unwrap(), ConnectionEvent::StateChanged(ConnectionState::Closed));
    assert!(!conn.is_running());
}
