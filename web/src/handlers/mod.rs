//! Handlers shared by every Turnstile deployment.

pub mod health;

pub use health::{health_check, readiness_check};
