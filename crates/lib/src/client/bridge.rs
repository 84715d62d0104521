//! WebSocket bridge to the automation sidecar.
//!
//! One socket carries both directions: requests are correlated to responses by id, and
//! event frames are forwarded to the relay's event channel in arrival order.

use super::protocol::{BridgeRequest, BridgeResponse, IncomingFrame};
use super::{ChatClient, ChatInfo, ClientError, ClientEvent, ContactInfo};
use crate::config::BridgeConfig;
use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<BridgeResponse>>>>;

/// Reason reported when the sidecar socket drops.
pub const BRIDGE_CLOSED_REASON: &str = "bridge connection closed";

struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
    /// Set on deliberate close so the reader does not report a disconnect.
    closing: Arc<AtomicBool>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Chat client backed by the automation sidecar.
pub struct BridgeClient {
    url: String,
    client_id: String,
    request_timeout: Duration,
    events: mpsc::Sender<ClientEvent>,
    pending: PendingMap,
    conn: Mutex<Option<Connection>>,
}

impl BridgeClient {
    /// Create a client; no connection is made until [`ChatClient::initialize`].
    pub fn new(config: &BridgeConfig, events: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            url: config.url.clone(),
            client_id: config.client_id.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            events,
            pending: Arc::new(Mutex::new(HashMap::new())),
            conn: Mutex::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .await
            .as_ref()
            .map(Connection::is_alive)
            .unwrap_or(false)
    }

    /// Close the socket without reporting a disconnect (process shutdown).
    pub async fn close(&self) {
        if let Some(c) = self.conn.lock().await.take() {
            c.closing.store(true, Ordering::SeqCst);
            let _ = c.outgoing.send(Message::Close(None));
            log::info!("bridge: closed sidecar connection");
        }
    }

    async fn connect(&self) -> Result<Connection, ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        log::info!("bridge: connected to sidecar at {}", self.url);
        let (mut sink, stream) = ws.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let alive = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));
        tokio::spawn(read_loop(
            stream,
            self.pending.clone(),
            self.events.clone(),
            alive.clone(),
            closing.clone(),
        ));
        Ok(Connection {
            outgoing,
            alive,
            closing,
        })
    }

    async fn ensure_connected(&self) -> Result<(), ClientError> {
        let mut g = self.conn.lock().await;
        if g.as_ref().map(Connection::is_alive).unwrap_or(false) {
            return Ok(());
        }
        *g = Some(self.connect().await?);
        Ok(())
    }

    async fn outgoing(&self) -> Result<mpsc::UnboundedSender<Message>, ClientError> {
        match self.conn.lock().await.as_ref() {
            Some(c) if c.is_alive() => Ok(c.outgoing.clone()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Send one request and wait for its response (bounded by the request timeout).
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let outgoing = self.outgoing().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let text = serde_json::to_string(&BridgeRequest::new(id.clone(), method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        if outgoing.send(Message::Text(text)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::NotConnected);
        }

        let res = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(res)) => res,
            Ok(Err(_)) => return Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ClientError::Timeout(method.to_string()));
            }
        };
        if res.ok {
            Ok(res.payload.unwrap_or(Value::Null))
        } else {
            Err(ClientError::Remote(
                res.error.unwrap_or_else(|| format!("{} failed", method)),
            ))
        }
    }
}

async fn read_loop<S>(
    mut stream: S,
    pending: PendingMap,
    events: mpsc::Sender<ClientEvent>,
    alive: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("bridge: read error: {}", e);
                break;
            }
        };
        match IncomingFrame::parse(&text) {
            Ok(Some(IncomingFrame::Response(res))) => {
                match pending.lock().await.remove(&res.id) {
                    Some(tx) => {
                        let _ = tx.send(res);
                    }
                    None => log::debug!("bridge: response for unknown request {}", res.id),
                }
            }
            Ok(Some(IncomingFrame::Event(ev))) => {
                let name = ev.event.clone();
                match ClientEvent::from_bridge(ev) {
                    Ok(Some(event)) => {
                        if events.send(event).await.is_err() {
                            log::debug!("bridge: event channel closed, stopping reader");
                            break;
                        }
                    }
                    Ok(None) => log::debug!("bridge: ignoring event {}", name),
                    Err(e) => log::warn!("bridge: bad {} event: {}", name, e),
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("bridge: malformed frame: {}", e),
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders fails every in-flight request with `Closed`.
    pending.lock().await.clear();
    if !closing.load(Ordering::SeqCst) {
        log::warn!("bridge: sidecar connection closed");
        let _ = events
            .send(ClientEvent::Disconnected(BRIDGE_CLOSED_REASON.to_string()))
            .await;
    }
}

#[async_trait]
impl ChatClient for BridgeClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.ensure_connected().await?;
        self.request("initialize", json!({ "clientId": self.client_id }))
            .await
            .map(|_| ())
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        match self.request("destroy", Value::Null).await {
            // Nothing to tear down; the next initialize reconnects.
            Err(ClientError::NotConnected) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<Value, ClientError> {
        self.request("sendMessage", json!({ "chatId": chat_id, "body": body }))
            .await
    }

    async fn get_chat(&self, message_id: &str) -> Result<ChatInfo, ClientError> {
        let payload = self
            .request("getChat", json!({ "messageId": message_id }))
            .await?;
        ChatInfo::from_payload(payload)
    }

    async fn get_contact(&self, message_id: &str) -> Result<ContactInfo, ClientError> {
        let payload = self
            .request("getContact", json!({ "messageId": message_id }))
            .await?;
        ContactInfo::from_payload(payload)
    }
}
