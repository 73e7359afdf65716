//! HTTP API endpoints.
//!
//! - [`registrations`]: register, waitlist, cancel, delete, read models
//! - [`tickets`]: scan at the gate, ticket administration

pub mod registrations;
pub mod tickets;
