//! Client session state: readiness, current QR image, and reconnection progress.
//!
//! Written by the relay's event loop and the reconnect supervisor, read by the HTTP surface.
//! Every transition is applied under a single write lock, so readers never see half of one.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Progress of automatic re-initialization after a disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ReconnectStatus {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Retrying { attempt: u32, max_attempts: u32 },
    Failed { attempts: u32, error: String },
}

/// Snapshot of the session as seen by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub ready: bool,
    /// QR code as a `data:` URI while waiting for a scan.
    pub qr_image: Option<String>,
    pub reconnect: ReconnectStatus,
    pub last_disconnect_reason: Option<String>,
}

/// Shared handle to the session state.
#[derive(Clone, Default)]
pub struct SessionTracker {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_ready(&self) {
        let mut s = self.inner.write().await;
        s.ready = true;
        s.qr_image = None;
        s.reconnect = ReconnectStatus::Idle;
    }

    /// Replace the QR image; the previous one is discarded.
    pub async fn on_qr(&self, image: String) {
        let mut s = self.inner.write().await;
        s.qr_image = Some(image);
        s.ready = false;
    }

    /// Optimistically ready; the following `ready` event confirms.
    pub async fn on_authenticated(&self) {
        let mut s = self.inner.write().await;
        s.ready = true;
        s.qr_image = None;
    }

    pub async fn on_disconnected(&self, reason: &str) {
        let mut s = self.inner.write().await;
        s.ready = false;
        s.qr_image = None;
        s.last_disconnect_reason = Some(reason.to_string());
    }

    /// Back to `{ready: false, qr: none}` before a manual re-initialization.
    pub async fn reset(&self) {
        let mut s = self.inner.write().await;
        s.ready = false;
        s.qr_image = None;
    }

    pub async fn set_reconnect(&self, status: ReconnectStatus) {
        self.inner.write().await.reconnect = status;
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.ready
    }

    pub async fn current_state(&self) -> SessionState {
        self.inner.read().await.clone()
    }
}
