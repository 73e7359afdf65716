//! `PostgreSQL` persistence for Turnstile.
//!
//! - [`PostgresRegistrationStore`]: events, registrations, tickets and the
//!   capacity ledger, with every multi-row change in one transaction
//! - [`PostgresSessionDirectory`]: bearer tokens to principals
//! - [`PostgresNotificationLog`]: notifications appended to a table
//!
//! All three share one connection pool.
//!
//! # Example
//!
//! ```no_run
//! use turnstile_postgres::{PoolConfig, PostgresRegistrationStore, PostgresSessionDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresRegistrationStore::connect("postgres://localhost/turnstile", &PoolConfig::default()).await?;
//! store.migrate().await?;
//! let sessions = PostgresSessionDirectory::new(store.pool().clone());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod notifications;
mod rows;
mod sessions;
mod store;

pub use notifications::{LoggedNotification, PostgresNotificationLog};
pub use sessions::PostgresSessionDirectory;
pub use store::{PoolConfig, PostgresRegistrationStore};
