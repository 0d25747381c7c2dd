//! End-to-end tests using a real websocket client against a bound server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use switchboard_core::MessageRouter;
use switchboard_mux::SessionEvent;
use switchboard_server::{RunningServer, ServerConfig, SwitchboardServer};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server() -> (String, RunningServer) {
    let config = ServerConfig {
        port: 0,
        static_dir: std::env::temp_dir(),
        ..ServerConfig::default()
    };
    let running = SwitchboardServer::new(config, MessageRouter::default())
        .listen()
        .await
        .unwrap();
    let url = format!("ws://{}/", running.local_addr());
    (url, running)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("timeout connecting")
        .unwrap();
    ws
}

/// Next text frame, skipping control frames.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn send(ws: &mut WsStream, text: &str) {
    ws.send(Message::text(text)).await.unwrap();
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn ping_gets_pong() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "PING").await;
    assert_eq!(read_text(&mut ws).await, "PONG");

    running.stop().await;
}

#[tokio::test]
async fn hello_gets_json_greeting() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "Hello?").await;
    let reply: Value = serde_json::from_str(&read_text(&mut ws).await).unwrap();
    assert_eq!(reply, serde_json::json!({"message": "Hi!"}));

    running.stop().await;
}

#[tokio::test]
async fn unrecognized_message_gets_no_reply() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "what is this").await;
    send(&mut ws, "PING").await;
    // Replies are ordered, so the first one must answer the PING.
    assert_eq!(read_text(&mut ws).await, "PONG");
    wait_for(|| running.mux().stats().replies_written() == 1).await;
    assert_eq!(running.mux().stats().messages_received(), 2);

    running.stop().await;
}

#[tokio::test]
async fn binary_frame_is_ignored_and_session_stays_open() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::binary(b"PING".to_vec())).await.unwrap();
    send(&mut ws, "Hello?").await;
    // The binary PING gets no reply, so the first reply answers the text frame.
    assert!(read_text(&mut ws).await.contains("Hi!"));
    wait_for(|| running.mux().stats().replies_written() == 1).await;
    assert_eq!(running.mux().stats().live(), 1);

    running.stop().await;
}

#[tokio::test]
async fn sessions_are_independent() {
    let (url, running) = boot_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    send(&mut a, "Hello?").await;
    send(&mut b, "PING").await;
    assert_eq!(read_text(&mut b).await, "PONG");
    assert!(read_text(&mut a).await.contains("Hi!"));

    wait_for(|| running.mux().stats().live() == 2).await;

    // Dropping one peer mid-session leaves the other served.
    drop(a);
    send(&mut b, "PING").await;
    assert_eq!(read_text(&mut b).await, "PONG");

    running.stop().await;
}

#[tokio::test]
async fn client_close_releases_session() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;
    send(&mut ws, "PING").await;
    assert_eq!(read_text(&mut ws).await, "PONG");
    assert_eq!(running.mux().stats().live(), 1);

    ws.close(None).await.unwrap();
    wait_for(|| running.mux().stats().live() == 0).await;
    assert_eq!(running.mux().stats().closed(), 1);
    assert_eq!(running.mux().stats().admitted(), 1);

    running.stop().await;
}

#[tokio::test]
async fn events_report_admission_and_replies() {
    let (url, running) = boot_server().await;
    let mut events = running.mux().subscribe();
    let mut ws = connect(&url).await;

    send(&mut ws, "PING").await;
    assert_eq!(read_text(&mut ws).await, "PONG");

    let mut kinds = Vec::new();
    timeout(TIMEOUT, async {
        while let Ok(event) = events.recv().await {
            let written = matches!(event, SessionEvent::ReplyWritten { .. });
            kinds.push(event.kind());
            if written {
                break;
            }
        }
    })
    .await
    .expect("no reply_written event");
    assert_eq!(kinds.first(), Some(&"admitted"));
    assert!(kinds.contains(&"message_received"));

    running.stop().await;
}

#[tokio::test]
async fn stop_closes_open_sessions() {
    let (url, running) = boot_server().await;
    let mut ws = connect(&url).await;
    send(&mut ws, "PING").await;
    assert_eq!(read_text(&mut ws).await, "PONG");

    running.stop().await;

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("peer never saw the close");
    assert!(closed);
}
