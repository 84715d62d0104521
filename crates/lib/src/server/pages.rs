//! HTML views for `GET /`, picked purely from the session state.

use crate::session::{ReconnectStatus, SessionState};

/// Which of the three mutually exclusive views to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusView {
    Ready,
    ScanQr,
    Loading,
}

impl StatusView {
    pub fn from_state(state: &SessionState) -> Self {
        if state.ready {
            StatusView::Ready
        } else if state.qr_image.is_some() {
            StatusView::ScanQr
        } else {
            StatusView::Loading
        }
    }

    /// Meta refresh interval in seconds.
    fn refresh_secs(self) -> u32 {
        match self {
            StatusView::Ready => 60,
            StatusView::ScanQr => 5,
            StatusView::Loading => 2,
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(refresh_secs: u32, body: &str) -> String {
    format!(
        r#"<html>
    <head>
        <title>WhatsApp Client</title>
        <meta http-equiv="refresh" content="{}">
        <style>body {{ font-family: sans-serif; text-align: center; padding: 50px; }}</style>
    </head>
    <body>
{}
    </body>
</html>
"#,
        refresh_secs, body
    )
}

pub fn render_status_page(state: &SessionState) -> String {
    let view = StatusView::from_state(state);
    let body = match view {
        StatusView::Ready => r#"        <h1>Client is Ready!</h1>
        <p>WhatsApp is connected.</p>
        <form action="/restart" method="POST">
            <button type="submit">Restart Client</button>
        </form>"#
            .to_string(),
        StatusView::ScanQr => format!(
            r#"        <h1>Scan QR Code</h1>
        <img src="{}" alt="QR Code" />
        <p>Scan this with your WhatsApp app.</p>"#,
            escape_html(state.qr_image.as_deref().unwrap_or_default())
        ),
        StatusView::Loading => {
            let mut body = String::from(
                r#"        <h1>Loading...</h1>
        <p>Waiting for QR code or client initialization...</p>"#,
            );
            match &state.reconnect {
                ReconnectStatus::Retrying {
                    attempt,
                    max_attempts,
                } if *attempt > 1 => {
                    body.push_str(&format!(
                        "\n        <p>Reconnecting (attempt {} of {})...</p>",
                        attempt, max_attempts
                    ));
                }
                ReconnectStatus::Failed { attempts, error } => {
                    body.push_str(&format!(
                        r#"
        <p>Reconnect failed after {} attempt(s): {}</p>
        <form action="/restart" method="POST">
            <button type="submit">Restart Client</button>
        </form>"#,
                        attempts,
                        escape_html(error)
                    ));
                }
                _ => {}
            }
            body
        }
    };
    page(view.refresh_secs(), &body)
}
