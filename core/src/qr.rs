//! QR rendering collaborator.
//!
//! The QR payload is the ticket's opaque scan code and nothing else.
//! Rendering runs after commit and its failures are tolerated: a ticket with
//! no rendered image still scans, because the code and `qr_expires_at` are
//! written at issuance.

use crate::types::ScanCode;
use thiserror::Error;

/// Rendering failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// The payload could not be encoded.
    #[error("QR encoding failed: {0}")]
    Encoding(String),
}

/// Renders a scan code into an image data URL.
pub trait QrRenderer: Send + Sync {
    /// Render `code` as a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns [`QrError`] when the code cannot be encoded.
    fn render(&self, code: &ScanCode) -> Result<String, QrError>;
}
