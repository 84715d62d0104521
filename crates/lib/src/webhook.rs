//! Webhook forwarder: POST inbound messages (with resolved chat and contact) to a configured URL.
//!
//! Best effort and at most once: a failed attempt is reported to the caller and never retried.

use crate::client::{ChatClient, ClientError, InboundMessage};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the shared secret, when one is configured.
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("resolving {what} failed: {source}")]
    Lookup {
        what: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(reqwest::StatusCode),
}

/// JSON body sent to the webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload<'a> {
    pub direction: &'static str,
    pub message_id: &'a str,
    pub body: &'a str,
    pub from: &'a str,
    pub chat: &'a serde_json::Value,
    pub contact: &'a serde_json::Value,
    pub raw_message: &'a serde_json::Value,
}

/// Sends message copies to the webhook URL.
#[derive(Clone)]
pub struct WebhookForwarder {
    url: String,
    secret: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookForwarder {
    pub fn new(url: impl Into<String>, secret: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            secret,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a message carries enough to be forwarded (non-empty body and sender).
    pub fn accepts(msg: &InboundMessage) -> bool {
        !msg.body.is_empty() && !msg.from.is_empty()
    }

    /// Resolve chat and contact, then POST the payload. Either lookup failing aborts the send.
    pub async fn forward(
        &self,
        msg: &InboundMessage,
        client: &dyn ChatClient,
    ) -> Result<(), WebhookError> {
        let chat = client
            .get_chat(&msg.id)
            .await
            .map_err(|source| WebhookError::Lookup { what: "chat", source })?;
        let contact = client
            .get_contact(&msg.id)
            .await
            .map_err(|source| WebhookError::Lookup {
                what: "contact",
                source,
            })?;

        let payload = WebhookPayload {
            direction: "inbound",
            message_id: &msg.id,
            body: &msg.body,
            from: &msg.from,
            chat: &chat.raw,
            contact: &contact.raw,
            raw_message: &msg.raw,
        };
        let mut req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload);
        if let Some(ref secret) = self.secret {
            req = req.header(SECRET_HEADER, secret);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(WebhookError::Status(res.status()));
        }
        Ok(())
    }
}
