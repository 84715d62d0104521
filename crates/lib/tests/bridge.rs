//! Integration test for the sidecar bridge: a fake sidecar (axum WebSocket) answers requests and
//! emits lifecycle events; the bridge client must correlate responses and deliver events in order.

mod common;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use relay::client::{
    BridgeClient, BridgeEvent, BridgeRequest, BridgeResponse, ChatClient, ClientError,
    ClientEvent, BRIDGE_CLOSED_REASON,
};
use relay::config::BridgeConfig;
use relay::filter::StartupFilter;
use relay::reconnect::{ReconnectPolicy, Reconnector};
use relay::relay::{Relay, RelayOptions};
use relay::session::SessionTracker;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn send_json(socket: &mut WebSocket, value: &impl serde::Serialize) {
    let text = serde_json::to_string(value).unwrap();
    socket.send(Message::Text(text)).await.unwrap();
}

async fn sidecar(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(req) = serde_json::from_str::<BridgeRequest>(&text) else {
            continue;
        };
        match req.method.as_str() {
            "initialize" => {
                assert_eq!(req.params["clientId"], "main");
                send_json(&mut socket, &BridgeResponse::ok(&req.id, json!({}))).await;
                for ev in [
                    BridgeEvent::new("qr", json!({ "qr": "2@abc" })),
                    BridgeEvent::new("loading_screen", json!({ "percent": 100 })),
                    BridgeEvent::new("authenticated", Value::Null),
                    BridgeEvent::new("ready", Value::Null),
                    BridgeEvent::new(
                        "message",
                        json!({
                            "id": { "_serialized": "false_1555@c.us_A1" },
                            "body": "hello",
                            "from": "1555@c.us",
                            "timestamp": 1700000000
                        }),
                    ),
                ] {
                    send_json(&mut socket, &ev).await;
                }
            }
            "sendMessage" if req.params["chatId"] == "close@c.us" => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            "sendMessage" => {
                let payload = json!({ "to": req.params["chatId"], "body": req.params["body"] });
                send_json(&mut socket, &BridgeResponse::ok(&req.id, payload)).await;
            }
            "getChat" if req.params["messageId"] == "bad" => {
                send_json(&mut socket, &BridgeResponse::err(&req.id, "chat not found")).await;
            }
            "getChat" => {
                let payload = json!({ "id": { "_serialized": "1555@c.us" }, "name": "Ann", "isGroup": false });
                send_json(&mut socket, &BridgeResponse::ok(&req.id, payload)).await;
            }
            "getContact" => {
                let payload = json!({ "id": "1555@c.us", "pushname": "Ann", "number": "1555" });
                send_json(&mut socket, &BridgeResponse::ok(&req.id, payload)).await;
            }
            "destroy" => {
                send_json(&mut socket, &BridgeResponse::ok(&req.id, Value::Null)).await;
            }
            _ => {
                send_json(&mut socket, &BridgeResponse::err(&req.id, "unknown method")).await;
            }
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(sidecar)
}

async fn spawn_sidecar() -> String {
    let addr = common::serve(Router::new().route("/ws", get(ws_handler))).await;
    format!("ws://{}/ws", addr)
}

fn bridge_config(url: String) -> BridgeConfig {
    BridgeConfig {
        url,
        request_timeout_ms: 2000,
        client_id: "main".to_string(),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within 2s")
        .expect("event channel open")
}

/// Initialize and consume the scripted qr/authenticated/ready/message events.
async fn initialized(url: String) -> (BridgeClient, mpsc::Receiver<ClientEvent>) {
    let (tx, mut rx) = mpsc::channel(16);
    let client = BridgeClient::new(&bridge_config(url), tx);
    client.initialize().await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ClientEvent::Qr(ref q) if q == "2@abc"));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::Authenticated));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::Ready));
    match next_event(&mut rx).await {
        ClientEvent::Message(m) => {
            assert_eq!(m.id, "false_1555@c.us_A1");
            assert_eq!(m.body, "hello");
            assert_eq!(m.timestamp, Some(1_700_000_000));
        }
        other => panic!("expected message, got {:?}", other),
    }
    (client, rx)
}

#[tokio::test]
async fn initialize_delivers_events_in_order() {
    let url = spawn_sidecar().await;
    let (client, _rx) = initialized(url).await;
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn requests_are_correlated() {
    let url = spawn_sidecar().await;
    let (client, _rx) = initialized(url).await;

    let (a, b) = tokio::join!(
        client.send_message("1@c.us", "first"),
        client.send_message("2@c.us", "second"),
    );
    assert_eq!(a.unwrap()["to"], "1@c.us");
    assert_eq!(b.unwrap()["body"], "second");

    let chat = client.get_chat("false_1555@c.us_A1").await.unwrap();
    assert_eq!(chat.id, "1555@c.us");
    assert_eq!(chat.name.as_deref(), Some("Ann"));
    let contact = client.get_contact("false_1555@c.us_A1").await.unwrap();
    assert_eq!(contact.number.as_deref(), Some("1555"));

    client.destroy().await.unwrap();
}

#[tokio::test]
async fn remote_errors_are_surfaced() {
    let url = spawn_sidecar().await;
    let (client, _rx) = initialized(url).await;
    match client.get_chat("bad").await {
        Err(ClientError::Remote(msg)) => assert_eq!(msg, "chat not found"),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn commands_before_initialize_are_not_connected() {
    let url = spawn_sidecar().await;
    let (tx, _rx) = mpsc::channel(16);
    let client = BridgeClient::new(&bridge_config(url), tx);
    assert!(matches!(
        client.send_message("1@c.us", "x").await,
        Err(ClientError::NotConnected)
    ));
    client.destroy().await.expect("destroy without a session is a no-op");
}

#[tokio::test]
async fn sidecar_close_reports_disconnect() {
    let url = spawn_sidecar().await;
    let (client, mut rx) = initialized(url).await;

    assert!(matches!(
        client.send_message("close@c.us", "bye").await,
        Err(ClientError::Closed)
    ));
    match next_event(&mut rx).await {
        ClientEvent::Disconnected(reason) => assert_eq!(reason, BRIDGE_CLOSED_REASON),
        other => panic!("expected disconnect, got {:?}", other),
    }
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn initialize_reconnects_after_close() {
    let url = spawn_sidecar().await;
    let (client, mut rx) = initialized(url).await;
    let _ = client.send_message("close@c.us", "bye").await;
    assert!(matches!(next_event(&mut rx).await, ClientEvent::Disconnected(_)));

    client.initialize().await.unwrap();
    assert!(client.is_connected().await);
    assert!(matches!(next_event(&mut rx).await, ClientEvent::Qr(_)));
}

#[tokio::test]
async fn deliberate_close_is_silent() {
    let url = spawn_sidecar().await;
    let (client, mut rx) = initialized(url).await;
    client.close().await;
    assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .map(|ev| ev.is_none())
        .unwrap_or(true));
}

#[tokio::test]
async fn initialize_fails_when_sidecar_is_down() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let (tx, _rx) = mpsc::channel(16);
    let client = BridgeClient::new(&bridge_config(format!("ws://127.0.0.1:{}/ws", port)), tx);
    assert!(matches!(client.initialize().await, Err(ClientError::Connect(_))));
}

/// History replay: after `initialize` the sidecar sends a `!ping`, then more stale messages than
/// the event channel holds, then `ready`. Reply bodies are reported on `sent`.
async fn replaying_sidecar(mut socket: WebSocket, sent: mpsc::UnboundedSender<String>) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(req) = serde_json::from_str::<BridgeRequest>(&text) else {
            continue;
        };
        match req.method.as_str() {
            "initialize" => {
                send_json(&mut socket, &BridgeResponse::ok(&req.id, json!({}))).await;
                let ping = json!({ "id": "ping-1", "body": "!ping", "from": "1555@c.us", "timestamp": 2000 });
                send_json(&mut socket, &BridgeEvent::new("message", ping)).await;
                for i in 0..300 {
                    let old = json!({ "id": format!("old-{}", i), "body": "history", "from": "1555@c.us", "timestamp": 1 });
                    send_json(&mut socket, &BridgeEvent::new("message", old)).await;
                }
                send_json(&mut socket, &BridgeEvent::new("ready", Value::Null)).await;
            }
            "sendMessage" => {
                let _ = sent.send(req.params["body"].as_str().unwrap_or_default().to_string());
                send_json(&mut socket, &BridgeResponse::ok(&req.id, json!({}))).await;
            }
            _ => {
                send_json(&mut socket, &BridgeResponse::ok(&req.id, Value::Null)).await;
            }
        }
    }
}

#[tokio::test]
async fn ping_reply_survives_event_flood() {
    let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| async move {
            ws.on_upgrade(move |socket| replaying_sidecar(socket, sent_tx))
        }),
    );
    let url = format!("ws://{}/ws", common::serve(app).await);

    let (tx, rx) = mpsc::channel(256);
    let config = BridgeConfig {
        request_timeout_ms: 10_000,
        ..bridge_config(url)
    };
    let client: Arc<dyn ChatClient> = Arc::new(BridgeClient::new(&config, tx));
    let tracker = SessionTracker::new();
    let reconnector = Reconnector::new(
        client.clone(),
        tracker.clone(),
        ReconnectPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(5),
        },
    );
    let relay = Relay::new(
        client.clone(),
        tracker.clone(),
        StartupFilter::new(1000),
        None,
        reconnector,
        RelayOptions::default(),
    );
    tokio::spawn(relay.run(rx));

    client.initialize().await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), sent_rx.recv())
        .await
        .expect("pong requested within 2s")
        .expect("sidecar alive");
    assert_eq!(reply, "pong");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !tracker.is_ready().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "ready event behind the flood was not processed"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(sent_rx.try_recv().is_err(), "exactly one pong");
}
