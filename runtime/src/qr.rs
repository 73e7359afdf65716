//! SVG QR rendering.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;
use turnstile_core::qr::{QrError, QrRenderer};
use turnstile_core::types::ScanCode;

/// Renders scan codes as base64 SVG data URLs.
#[derive(Debug, Clone, Copy)]
pub struct SvgQrRenderer {
    min_size: u32,
}

impl SvgQrRenderer {
    /// Renderer producing images at least `min_size` pixels square.
    #[must_use]
    pub const fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for SvgQrRenderer {
    fn default() -> Self {
        Self::new(240)
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render(&self, code: &ScanCode) -> Result<String, QrError> {
        let qr = QrCode::new(code.as_str().as_bytes())
            .map_err(|e| QrError::Encoding(e.to_string()))?;
        let image = qr
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .quiet_zone(true)
            .build();
        Ok(format!(
            "data:image/svg+xml;base64,{}",
            STANDARD.encode(image.as_bytes())
        ))
    }
}
