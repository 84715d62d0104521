//! wa-relay core library: chat client facade, session tracking, startup filter, webhook
//! forwarding, and the HTTP status/control surface used by the CLI.

pub mod client;
pub mod config;
pub mod filter;
pub mod qr;
pub mod reconnect;
pub mod relay;
pub mod server;
pub mod session;
pub mod webhook;
