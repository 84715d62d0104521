//! Status/control HTTP surface: status page, restart, send-message.

mod http;
mod pages;

pub use http::{normalize_chat_id, router, run_server, AppState};
pub use pages::{render_status_page, StatusView};
