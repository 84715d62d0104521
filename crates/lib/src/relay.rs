//! Event processing: apply client lifecycle events to the session tracker and relay inbound
//! messages (startup filter, `!ping` echo, webhook forward).
//!
//! Events are consumed in emission order on one task. Per-message work (the `!ping` reply,
//! then the webhook forward) runs in its own task, so the loop never waits on the client
//! and forwards for overlapping messages may complete in any order.

use crate::client::{ChatClient, ClientEvent, InboundMessage};
use crate::config::RelayConfig;
use crate::filter::StartupFilter;
use crate::qr;
use crate::reconnect::Reconnector;
use crate::session::SessionTracker;
use crate::webhook::WebhookForwarder;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message body that triggers an immediate reply.
pub const PING_COMMAND: &str = "!ping";
pub const PING_REPLY: &str = "pong";

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub enable_webhook_forward: bool,
    pub catch_reply_errors: bool,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(c: &RelayConfig) -> Self {
        Self {
            enable_webhook_forward: c.enable_webhook_forward,
            catch_reply_errors: c.catch_reply_errors,
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn ChatClient>,
    tracker: SessionTracker,
    filter: StartupFilter,
    forwarder: Option<WebhookForwarder>,
    reconnector: Reconnector,
    options: RelayOptions,
}

impl Relay {
    pub fn new(
        client: Arc<dyn ChatClient>,
        tracker: SessionTracker,
        filter: StartupFilter,
        forwarder: Option<WebhookForwarder>,
        reconnector: Reconnector,
        options: RelayOptions,
    ) -> Self {
        Self {
            client,
            tracker,
            filter,
            forwarder,
            reconnector,
            options,
        }
    }

    /// Consume events until the client side of the channel is dropped.
    pub async fn run(self, mut events: mpsc::Receiver<ClientEvent>) {
        log::info!("relay: processing client events");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        log::info!("relay: event stream ended");
    }

    pub async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Ready => {
                log::info!("client is ready");
                self.tracker.on_ready().await;
            }
            ClientEvent::Qr(code) => {
                log::info!("QR code received");
                match qr::render_data_uri(&code) {
                    Ok(image) => self.tracker.on_qr(image).await,
                    Err(e) => log::error!("error generating QR code: {}", e),
                }
            }
            ClientEvent::Authenticated => {
                log::info!("authenticated");
                self.tracker.on_authenticated().await;
            }
            ClientEvent::Disconnected(reason) => {
                log::warn!("client was disconnected: {}", reason);
                self.tracker.on_disconnected(&reason).await;
                self.reconnector.spawn();
            }
            ClientEvent::Message(msg) => {
                self.handle_message(msg).await;
            }
        }
    }

    /// Returns the task running the message's reply and forward, if there is work to do.
    pub async fn handle_message(&self, msg: InboundMessage) -> Option<JoinHandle<()>> {
        if !self.filter.should_process(&msg) {
            log::debug!(
                "skipping message {} from before startup (ts {:?} < {})",
                msg.id,
                msg.timestamp,
                self.filter.started_at()
            );
            return None;
        }
        log::info!("message from {}: {}", msg.from, msg.body);

        let is_ping = msg.body == PING_COMMAND;
        let forwarder = if self.options.enable_webhook_forward && WebhookForwarder::accepts(&msg) {
            self.forwarder.clone()
        } else {
            None
        };
        if !is_ping && forwarder.is_none() {
            return None;
        }

        let client = self.client.clone();
        let catch_reply_errors = self.options.catch_reply_errors;
        Some(tokio::spawn(async move {
            if is_ping {
                reply_pong(&client, &msg.from, catch_reply_errors).await;
            }
            let Some(forwarder) = forwarder else { return };
            match forwarder.forward(&msg, client.as_ref()).await {
                Ok(()) => log::info!("webhook sent for message {} from {}", msg.id, msg.from),
                Err(e) => log::error!("failed to send webhook for message {}: {}", msg.id, e),
            }
        }))
    }
}

/// With `catch_errors` the reply completes (or fails, logged) before the caller continues;
/// otherwise it is detached and its outcome dropped.
async fn reply_pong(client: &Arc<dyn ChatClient>, to: &str, catch_errors: bool) {
    if catch_errors {
        if let Err(e) = client.send_message(to, PING_REPLY).await {
            log::warn!("ping reply to {} failed: {}", to, e);
        }
    } else {
        let client = client.clone();
        let to = to.to_string();
        tokio::spawn(async move {
            let _ = client.send_message(&to, PING_REPLY).await;
        });
    }
}
