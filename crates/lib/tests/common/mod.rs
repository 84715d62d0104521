//! Shared test helpers: an in-memory chat client, a webhook receiver, and app spawning.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use relay::client::{ChatClient, ChatInfo, ClientError, ContactInfo, InboundMessage};
use relay::server::{router, AppState};
use relay::session::SessionTracker;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Chat client that records sends and can be told to fail.
#[derive(Default)]
pub struct FakeClient {
    pub sends: Mutex<Vec<(String, String)>>,
    pub initialize_calls: AtomicU32,
    pub destroy_calls: AtomicU32,
    pub fail_send: AtomicBool,
    pub fail_initialize: AtomicBool,
    /// While set, `send_message` waits before completing.
    pub hold_sends: AtomicBool,
    /// Message ids whose chat lookup fails.
    pub fail_chat_for: Mutex<HashSet<String>>,
    pub sent: Notify,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn release_sends(&self) {
        self.hold_sends.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(ClientError::Remote("browser failed to launch".to_string()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<Value, ClientError> {
        while self.hold_sends.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ClientError::Remote("chat not found".to_string()));
        }
        self.sends
            .lock()
            .unwrap()
            .push((chat_id.to_string(), body.to_string()));
        self.sent.notify_waiters();
        Ok(json!({ "id": { "_serialized": "true_sent_1" }, "to": chat_id, "body": body }))
    }

    async fn get_chat(&self, message_id: &str) -> Result<ChatInfo, ClientError> {
        if self.fail_chat_for.lock().unwrap().contains(message_id) {
            return Err(ClientError::Timeout("getChat".to_string()));
        }
        ChatInfo::from_payload(json!({
            "id": { "_serialized": format!("chat-{}", message_id) },
            "name": "Test chat",
            "isGroup": false
        }))
    }

    async fn get_contact(&self, message_id: &str) -> Result<ContactInfo, ClientError> {
        ContactInfo::from_payload(json!({
            "id": { "_serialized": format!("contact-{}", message_id) },
            "pushname": "Ann",
            "number": "15551234567"
        }))
    }
}

pub fn inbound(id: &str, body: &str, timestamp: i64) -> InboundMessage {
    InboundMessage::from_payload(json!({
        "id": { "_serialized": id },
        "body": body,
        "from": "15551234567@c.us",
        "timestamp": timestamp
    }))
    .expect("valid message payload")
}

/// One request seen by the webhook receiver.
#[derive(Debug)]
pub struct Received {
    pub secret: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct ReceiverState {
    tx: mpsc::UnboundedSender<Received>,
    status: StatusCode,
    delay: Duration,
    /// Message id answered with 500 regardless of `status`.
    fail_for: Option<String>,
}

async fn receive(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let fails = state
        .fail_for
        .as_deref()
        .is_some_and(|id| body["messageId"] == id);
    let _ = state.tx.send(Received {
        secret: header("x-webhook-secret"),
        content_type: header("content-type"),
        body,
    });
    tokio::time::sleep(state.delay).await;
    if fails {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        state.status
    }
}

/// Start a webhook endpoint answering with `status` after `delay`. Returns its URL.
pub async fn spawn_webhook_receiver(
    status: StatusCode,
    delay: Duration,
) -> (String, mpsc::UnboundedReceiver<Received>) {
    start_receiver(status, delay, None).await
}

/// Webhook endpoint that answers 500 for `message_id` and 200 for everything else.
pub async fn spawn_webhook_receiver_failing_for(
    message_id: &str,
) -> (String, mpsc::UnboundedReceiver<Received>) {
    start_receiver(StatusCode::OK, Duration::ZERO, Some(message_id.to_string())).await
}

async fn start_receiver(
    status: StatusCode,
    delay: Duration,
    fail_for: Option<String>,
) -> (String, mpsc::UnboundedReceiver<Received>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route("/hook", post(receive)).with_state(ReceiverState {
        tx,
        status,
        delay,
        fail_for,
    });
    let addr = serve(app).await;
    (format!("http://{}/hook", addr), rx)
}

/// Serve a router on an ephemeral loopback port; the task runs until the test ends.
pub async fn serve(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Serve the relay's HTTP surface over a fake client. Returns the base URL.
pub async fn spawn_app(client: Arc<FakeClient>, tracker: SessionTracker) -> String {
    let state = AppState {
        client,
        tracker,
        started_at: 1000,
    };
    let addr = serve(router(state)).await;
    format!("http://{}", addr)
}

/// Poll `cond` until it holds or the timeout passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
