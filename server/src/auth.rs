//! Authentication extractors.
//!
//! Bearer tokens are resolved to a [`Principal`] through the
//! [`SessionDirectory`] found in the router state.
//!
//! # Usage
//!
//! ```rust,ignore
//! use turnstile_server::auth::{Authenticated, RequireStaff};
//!
//! async fn my_registrations(Authenticated(caller): Authenticated) -> ... {}
//! async fn scan(RequireStaff(staff): RequireStaff) -> ... {}
//! ```

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;
use turnstile_core::directory::{Principal, SessionDirectory};
use turnstile_web::{AppError, BearerToken};

/// Any authenticated caller.
///
/// Rejects with 401 when the token is missing, unknown or expired.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    Arc<dyn SessionDirectory>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let sessions = Arc::<dyn SessionDirectory>::from_ref(state);

        let principal = sessions
            .resolve(&token)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::unauthorized("Invalid or expired session"))?;

        Ok(Self(principal))
    }
}

/// Organizer or administrator.
///
/// Rejects with 401 when unauthenticated and 403 for students.
#[derive(Debug, Clone)]
pub struct RequireStaff(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequireStaff
where
    Arc<dyn SessionDirectory>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        if !principal.role.is_staff() {
            tracing::warn!(user_id = %principal.user_id, role = %principal.role, "Staff access denied");
            return Err(AppError::forbidden("Organizer or admin role required"));
        }
        Ok(Self(principal))
    }
}

/// Administrator only.
///
/// Rejects with 401 when unauthenticated and 403 for other roles.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    Arc<dyn SessionDirectory>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            tracing::warn!(user_id = %principal.user_id, role = %principal.role, "Admin access denied");
            return Err(AppError::forbidden("Admin role required"));
        }
        Ok(Self(principal))
    }
}
