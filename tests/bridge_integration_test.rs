//! End-to-end tests over a real WebSocket: an in-process server accepts
//! the connection and the real `Connection` + `Bridge` relay against it.
//!
//! The crate enforces one live connection per process, so tests that open
//! connections serialize on a local mutex, and each test tears its
//! connection down deterministically (`Connection::shutdown`) before
//! returning so the next test never inherits a held guard.

use std::sync::Mutex;
use std::time::Duration;

use boidlink::{socket_url, ui_channels, Bridge, BridgeError, Connection, UiCommand};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite;

static CONNECTION_LOCK: Mutex<()> = Mutex::new(());

/// Bind a listener on an ephemeral port and return it with its ws:// URL.
async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, socket_url(&addr.ip().to_string(), addr.port()))
}

/// Open a connection, retrying while a previous connection's claim drains.
async fn open_retrying(url: &str) -> Connection {
    for _ in 0..100 {
        match Connection::open(url).await {
            Ok(connection) => {
                assert_eq!(connection.url(), url);
                return connection;
            }
            Err(BridgeError::AlreadyConnected) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("open failed: {e}"),
        }
    }
    panic!("connection guard never released");
}

/// Stop a spawned bridge and wait for the connection's I/O task to exit.
///
/// The bridge holds a sender clone, so it must be gone before
/// `Connection::shutdown` can drain.
async fn teardown(bridge_task: tokio::task::JoinHandle<Result<(), BridgeError>>, connection: Connection) {
    bridge_task.abort();
    let _ = bridge_task.await;
    connection.shutdown().await;
}

#[tokio::test]
async fn test_inbound_relay_preserves_payload_and_order() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        ws.send(tungstenite::Message::Text("team-state-v1".to_string()))
            .await
            .expect("send");
        for i in 0..5 {
            ws.send(tungstenite::Message::Text(format!("update-{i}")))
                .await
                .expect("send");
        }

        // Hold the connection open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut connection = open_retrying(&url).await;
    let (mut ui, channels) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels).expect("bridge");
    let bridge_task = tokio::spawn(bridge.run());

    let first = ui.update_rx.recv().await.expect("payload");
    assert_eq!(first, "team-state-v1");
    for i in 0..5 {
        let payload = ui.update_rx.recv().await.expect("payload");
        assert_eq!(payload, format!("update-{i}"));
    }

    teardown(bridge_task, connection).await;
    let _ = server.await;
}

#[tokio::test]
async fn test_outbound_frames_exact_and_ordered() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        while let Some(Ok(msg)) = ws.next().await {
            if let tungstenite::Message::Text(text) = msg {
                if frame_tx.send(text.to_string()).is_err() {
                    break;
                }
            }
        }
    });

    let mut connection = open_retrying(&url).await;
    let (ui, channels) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels).expect("bridge");
    let bridge_task = tokio::spawn(bridge.run());

    ui.command_tx
        .send(UiCommand::Spawn {
            team: serde_json::json!("Red"),
        })
        .await
        .expect("command accepted");
    ui.command_tx
        .send(UiCommand::Spawn {
            team: serde_json::json!(7),
        })
        .await
        .expect("command accepted");

    let first = frame_rx.recv().await.expect("frame on the wire");
    let second = frame_rx.recv().await.expect("frame on the wire");
    assert_eq!(first, r#"{"Spawn":{"team":"Red"}}"#);
    assert_eq!(second, r#"{"Spawn":{"team":7}}"#);

    teardown(bridge_task, connection).await;
    let _ = server.await;
}

#[tokio::test]
async fn test_second_open_rejected_while_live() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;

    let _server = tokio::spawn(async move {
        // Two sequential connections: the first test half, then the reopen.
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    let connection = open_retrying(&url).await;
    assert!(connection.is_open());

    let second = Connection::open(&url).await;
    assert!(matches!(second, Err(BridgeError::AlreadyConnected)));

    // Tearing the connection down releases the claim, after which open
    // succeeds again.
    connection.shutdown().await;
    let reopened = open_retrying(&url).await;
    assert!(reopened.is_open());
    reopened.shutdown().await;
}

#[tokio::test]
async fn test_connection_loss_surfaces_close_code() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        ws.send(tungstenite::Message::Close(Some(
            tungstenite::protocol::CloseFrame {
                code: tungstenite::protocol::frame::coding::CloseCode::from(4000),
                reason: "bye".into(),
            },
        )))
        .await
        .expect("close frame");
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut connection = open_retrying(&url).await;
    let (_ui, channels) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels).expect("bridge");

    let result = bridge.run().await;
    match result {
        Err(BridgeError::ConnectionLost { code, reason }) => {
            assert_eq!(code, 4000);
            assert_eq!(reason, "bye");
        }
        other => panic!("expected ConnectionLost, got {other:?}"),
    }

    connection.shutdown().await;
    let _ = server.await;
}

#[tokio::test]
async fn test_send_after_close_fails_loudly() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        // Drop the socket abruptly.
        drop(ws);
    });

    let mut connection = open_retrying(&url).await;
    let mut events = connection.take_events().expect("events");

    // Drain until the terminal Closed event, then wait for the I/O task
    // to finish so the outbound queue is gone.
    loop {
        match events.recv().await {
            Some(boidlink::SocketEvent::Closed { .. }) | None => break,
            Some(_) => {}
        }
    }
    while connection.is_open() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let result = connection.send(r#"{"Spawn":{"team":"Red"}}"#);
    assert!(matches!(result, Err(BridgeError::ConnectionClosed)));

    connection.shutdown().await;
    let _ = server.await;
}

#[tokio::test]
async fn test_event_stream_claimed_once() {
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (listener, url) = bind_server().await;

    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let mut connection = open_retrying(&url).await;

    let (_ui_a, channels_a) = ui_channels();
    let bridge = Bridge::new(&mut connection, channels_a).expect("first bridge");

    let (_ui_b, channels_b) = ui_channels();
    let second = Bridge::new(&mut connection, channels_b);
    assert!(matches!(second, Err(BridgeError::EventsTaken)));

    // The unspawned bridge holds a sender clone; drop it before teardown.
    drop(bridge);
    connection.shutdown().await;
}

#[test]
fn test_claim_released_when_runtime_cancels_io_task() {
    // Cancelling the I/O task's future must release the per-process
    // connection claim, or every later open would report AlreadyConnected.
    let _guard = CONNECTION_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let connection = runtime.block_on(async {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                while let Some(Ok(_)) = ws.next().await {}
            }
        });
        Connection::open(&url).await.expect("open")
    });
    assert!(connection.is_open());

    // Dropping the runtime cancels every spawned task, including the
    // connection's I/O task, while `connection` still holds its handles.
    drop(runtime);

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        let reopened = Connection::open(&url).await.expect("claim was released");
        assert!(reopened.is_open());
        reopened.shutdown().await;
    });

    drop(connection);
}
