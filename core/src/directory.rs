//! Authentication collaborator: bearer tokens to principals.

use crate::store::StoreFuture;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Registers for events
    Student,
    /// Publishes events and scans tickets
    Organizer,
    /// Full access
    Admin,
}

impl Role {
    /// Organizers and admins may scan and view waitlists.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Organizer | Self::Admin)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "student" => Some(Self::Student),
            "organizer" => Some(Self::Organizer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User ID
    pub user_id: UserId,
    /// Role
    pub role: Role,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
}

impl Principal {
    /// Whether this caller is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner-or-admin check.
    #[must_use]
    pub fn acts_for(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

/// Resolves bearer tokens issued by the external authentication service.
pub trait SessionDirectory: Send + Sync {
    /// Resolve a token; `None` for unknown or expired tokens.
    fn resolve<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<Principal>>;
}
