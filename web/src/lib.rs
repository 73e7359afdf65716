//! Axum integration for Turnstile.
//!
//! The HTTP shell around the registration engine and scan validator:
//!
//! ```text
//! request ──▶ correlation_id_layer ──▶ BearerToken ──▶ handler ──▶ engine / validator
//!                                                         │
//! response ◀── AppError (JSON {code, message, details}) ◀─┘
//! ```
//!
//! Handlers return [`WebResult`]; every domain error converts into
//! [`AppError`] with the status code the API documents.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
