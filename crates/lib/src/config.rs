//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.wa-relay/config.json`) and then
//! overridden from the environment (`PORT`, `WEBHOOK_URL`, `WEBHOOK_SECRET`, `RELAY_BRIDGE_URL`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level relay config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP status/control surface.
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound webhook destination.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Connection to the automation sidecar.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Message handling toggles.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Re-initialization after the client disconnects.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// HTTP bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen port (default 3000). Overridden by PORT env.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Webhook URL, optional shared secret and POST timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Destination for forwarded messages. Overridden by WEBHOOK_URL env. Unset disables forwarding.
    pub url: Option<String>,
    /// Sent as X-Webhook-Secret when set. Overridden by WEBHOOK_SECRET env.
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Automation sidecar WebSocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// WebSocket URL of the sidecar (default ws://127.0.0.1:3100/ws). Overridden by RELAY_BRIDGE_URL env.
    #[serde(default = "default_bridge_url")]
    pub url: String,
    /// Per-request timeout for bridge calls (default 30s).
    #[serde(default = "default_bridge_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Session slot the sidecar stores credentials under (default "main").
    #[serde(default = "default_bridge_client_id")]
    pub client_id: String,
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3100/ws".to_string()
}

fn default_bridge_request_timeout_ms() -> u64 {
    30_000
}

fn default_bridge_client_id() -> String {
    "main".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            request_timeout_ms: default_bridge_request_timeout_ms(),
            client_id: default_bridge_client_id(),
        }
    }
}

/// Message handling toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Forward surviving inbound messages to the webhook (default true).
    #[serde(default = "default_true")]
    pub enable_webhook_forward: bool,
    /// Await the `!ping` reply and log its failure (default true). When false the reply is
    /// spawned and its result discarded.
    #[serde(default = "default_true")]
    pub catch_reply_errors: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enable_webhook_forward: true,
            catch_reply_errors: true,
        }
    }
}

/// Bounded retry with exponential backoff for re-initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Read an env var, trimmed; empty counts as unset.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the webhook URL: env WEBHOOK_URL overrides config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    env_non_empty("WEBHOOK_URL").or_else(|| trimmed(config.webhook.url.as_ref()))
}

/// Resolve the webhook secret: env WEBHOOK_SECRET overrides config.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    env_non_empty("WEBHOOK_SECRET").or_else(|| trimmed(config.webhook.secret.as_ref()))
}

/// Apply environment overrides in place. Fails only when PORT is set but not a valid port.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(port) = env_non_empty("PORT") {
        config.server.port = port
            .parse()
            .with_context(|| format!("invalid PORT value {:?}", port))?;
    }
    config.webhook.url = resolve_webhook_url(config);
    config.webhook.secret = resolve_webhook_secret(config);
    if let Some(url) = env_non_empty("RELAY_BRIDGE_URL") {
        config.bridge.url = url;
    }
    Ok(())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".wa-relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Environment overrides are applied on top. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config)?;
    Ok((config, path))
}
