//! Supervised re-initialization of the chat client after a disconnect.
//!
//! Bounded attempts with exponential backoff; progress is published on the session tracker
//! so the status page and `/status` can show it.

use crate::client::{ChatClient, ClientError};
use crate::config::ReconnectConfig;
use crate::session::{ReconnectStatus, SessionTracker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(c: &ReconnectConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            initial_backoff: Duration::from_millis(c.initial_backoff_ms),
            max_backoff: Duration::from_millis(c.max_backoff_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt `attempt` (1-based): doubles from the initial backoff, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Runs at most one re-initialization loop at a time.
#[derive(Clone)]
pub struct Reconnector {
    client: Arc<dyn ChatClient>,
    tracker: SessionTracker,
    policy: ReconnectPolicy,
    running: Arc<AtomicBool>,
}

impl Reconnector {
    pub fn new(client: Arc<dyn ChatClient>, tracker: SessionTracker, policy: ReconnectPolicy) -> Self {
        Self {
            client,
            tracker,
            policy,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the retry loop in the background. Returns `None` if one is already running.
    pub fn spawn(&self) -> Option<JoinHandle<Result<(), ClientError>>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("reconnect: already in progress");
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            let res = this.supervise().await;
            this.running.store(false, Ordering::SeqCst);
            res
        }))
    }

    /// Call `initialize` until it succeeds or attempts run out.
    pub async fn supervise(&self) -> Result<(), ClientError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.tracker
                .set_reconnect(ReconnectStatus::Retrying {
                    attempt,
                    max_attempts: max,
                })
                .await;
            match self.client.initialize().await {
                Ok(()) => {
                    log::info!("reconnect: client re-initialized (attempt {}/{})", attempt, max);
                    self.tracker.set_reconnect(ReconnectStatus::Idle).await;
                    return Ok(());
                }
                Err(e) if attempt >= max => {
                    log::error!("reconnect: giving up after {} attempt(s): {}", attempt, e);
                    self.tracker
                        .set_reconnect(ReconnectStatus::Failed {
                            attempts: attempt,
                            error: e.to_string(),
                        })
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.backoff(attempt);
                    log::warn!(
                        "reconnect: attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
