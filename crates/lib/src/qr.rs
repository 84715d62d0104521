//! Render a pairing string as a QR code image for the status page.

use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

/// QR encoding failed (e.g. the pairing string is too long for any QR version).
#[derive(Debug, thiserror::Error)]
#[error("qr encoding failed: {0}")]
pub struct QrError(#[from] qrcode::types::QrError);

/// Encode `code` as an SVG QR image and return it as a `data:` URI usable in `<img src>`.
pub fn render_data_uri(code: &str) -> Result<String, QrError> {
    let qr = QrCode::new(code.as_bytes())?;
    let image = qr
        .render::<svg::Color>()
        .min_dimensions(264, 264)
        .quiet_zone(true)
        .build();
    let encoded = base64::engine::general_purpose::STANDARD.encode(image.as_bytes());
    Ok(format!("data:image/svg+xml;base64,{}", encoded))
}
