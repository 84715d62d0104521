//! Drops messages timestamped before the relay started.
//!
//! On reconnect the client may replay chat history; anything older than process start is stale.

use crate::client::InboundMessage;

/// Compares message timestamps against the process start time (Unix seconds).
#[derive(Debug, Clone, Copy)]
pub struct StartupFilter {
    started_at: i64,
}

impl StartupFilter {
    pub fn new(started_at: i64) -> Self {
        Self { started_at }
    }

    /// Capture the current time as the start bound.
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().timestamp())
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    /// False only for a numeric timestamp strictly before start; missing timestamps pass.
    pub fn should_process(&self, msg: &InboundMessage) -> bool {
        match msg.timestamp {
            Some(ts) => ts >= self.started_at,
            None => true,
        }
    }
}
