//! # Turnstile Server
//!
//! HTTP surface of the registration and ticket lifecycle engine.
//!
//! - [`config`]: environment configuration
//! - [`auth`]: bearer-token extractors ([`auth::Authenticated`],
//!   [`auth::RequireStaff`], [`auth::RequireAdmin`])
//! - [`api`]: registration and ticket endpoints
//! - [`routes`]: router assembly
//! - [`state`]: shared application state
//!
//! ## Example
//!
//! ```rust,ignore
//! use turnstile_server::{AppState, Collaborators, Config, build_router};
//!
//! let config = Config::from_env();
//! let state = AppState::new(Collaborators::new(store, sessions, notifier), &config);
//! let app = build_router(state);
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError, NotificationSink};
pub use routes::{build_router, metrics_router};
pub use state::{AppState, Collaborators};
