//! HTTP server: routes, handlers, and the process entry point that wires the relay together.

use crate::client::{BridgeClient, ChatClient, ClientError, ClientEvent};
use crate::config::Config;
use crate::filter::StartupFilter;
use crate::reconnect::{ReconnectPolicy, Reconnector};
use crate::relay::{Relay, RelayOptions};
use crate::server::pages::render_status_page;
use crate::session::{ReconnectStatus, SessionTracker};
use crate::webhook::WebhookForwarder;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Domain appended to bare numbers to form a chat address.
const CHAT_ADDRESS_SUFFIX: &str = "@c.us";

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn ChatClient>,
    pub tracker: SessionTracker,
    /// Process start, Unix seconds (reported by `/status`).
    pub started_at: i64,
}

/// Build the route table. Exposed so tests can serve it on an ephemeral listener.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/status", get(status_json))
        .route("/restart", post(restart))
        .route("/send-message", post(send_message))
        .with_state(state)
}

/// Run the relay: connect the sidecar bridge, process its events, and serve HTTP until
/// SIGINT/SIGTERM. The client is destroyed on the way out.
pub async fn run_server(config: Config) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(256);
    let bridge = Arc::new(BridgeClient::new(&config.bridge, event_tx));
    let client: Arc<dyn ChatClient> = bridge.clone();
    let tracker = SessionTracker::new();
    let filter = StartupFilter::now();
    let reconnector = Reconnector::new(
        client.clone(),
        tracker.clone(),
        ReconnectPolicy::from(&config.reconnect),
    );

    let forwarder = config.webhook.url.as_ref().map(|url| {
        log::info!("forwarding inbound messages to {}", url);
        WebhookForwarder::new(
            url.clone(),
            config.webhook.secret.clone(),
            config.webhook.timeout(),
        )
    });
    if forwarder.is_none() {
        log::warn!("no webhook URL configured (set WEBHOOK_URL); inbound messages will not be forwarded");
    }

    let relay = Relay::new(
        client.clone(),
        tracker.clone(),
        filter,
        forwarder,
        reconnector.clone(),
        RelayOptions::from(&config.relay),
    );
    tokio::spawn(relay.run(event_rx));

    // First initialize goes through the supervisor so a sidecar that is still starting is retried.
    reconnector.spawn();

    let app = router(AppState {
        client: client.clone(),
        tracker,
        started_at: filter.started_at(),
    });

    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("server running on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited")?;

    if let Err(e) = client.destroy().await {
        log::debug!("destroy on shutdown: {}", e);
    }
    bridge.close().await;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// GET / — HTML status page.
async fn status_page(State(state): State<AppState>) -> Html<String> {
    Html(render_status_page(&state.tracker.current_state().await))
}

/// GET /status — JSON snapshot of the session.
async fn status_json(State(state): State<AppState>) -> Json<Value> {
    let s = state.tracker.current_state().await;
    Json(json!({
        "ready": s.ready,
        "qr": s.qr_image.is_some(),
        "reconnect": s.reconnect,
        "lastDisconnectReason": s.last_disconnect_reason,
        "startedAt": state.started_at,
    }))
}

async fn restart_client(state: &AppState) -> Result<(), ClientError> {
    state.client.destroy().await?;
    state.tracker.reset().await;
    state.client.initialize().await?;
    state.tracker.set_reconnect(ReconnectStatus::Idle).await;
    Ok(())
}

/// POST /restart — destroy and re-initialize the client.
async fn restart(State(state): State<AppState>) -> Response {
    log::info!("restart requested");
    match restart_client(&state).await {
        Ok(()) => Html(r#"Client restarting... <a href="/">Go back</a>"#).into_response(),
        Err(e) => {
            log::error!("error restarting client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error restarting client: {}", e),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendMessageBody {
    #[serde(default)]
    number: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl SendMessageBody {
    /// Number may arrive as a string or a bare JSON number; empty counts as missing.
    fn number(&self) -> Option<String> {
        match self.number.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn message(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("Client not ready")]
    NotReady,
    #[error("Missing number or message")]
    MissingFields,
    #[error("Failed to send message")]
    Client(#[source] ClientError),
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            SendError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            SendError::MissingFields => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string() }),
            ),
            SendError::Client(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string(), "details": e.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Turn a bare number into a chat address; anything containing `@` is used as-is.
pub fn normalize_chat_id(number: &str) -> String {
    if number.contains('@') {
        number.to_string()
    } else {
        format!("{}{}", number, CHAT_ADDRESS_SUFFIX)
    }
}

/// POST /send-message — `{ number, message }`. Readiness is checked before the body is looked at.
async fn send_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, SendError> {
    if !state.tracker.is_ready().await {
        return Err(SendError::NotReady);
    }
    let req: SendMessageBody = serde_json::from_slice(&body).unwrap_or_default();
    let (Some(number), Some(message)) = (req.number(), req.message()) else {
        return Err(SendError::MissingFields);
    };

    let chat_id = normalize_chat_id(&number);
    match state.client.send_message(&chat_id, message).await {
        Ok(response) => Ok(Json(json!({ "success": true, "response": response }))),
        Err(e) => {
            log::error!("error sending message to {}: {}", chat_id, e);
            Err(SendError::Client(e))
        }
    }
}
