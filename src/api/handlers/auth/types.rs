//! Role enumeration and request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::UserRecord;

/// Closed set of user roles. Exactly one role per user; `system_admin`
/// implicitly satisfies every role check (see the access-control gate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemAdmin,
    Administrator,
    Standard,
    Audit,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SystemAdmin => "system_admin",
            Self::Administrator => "administrator",
            Self::Standard => "standard",
            Self::Audit => "audit",
        }
    }

    /// Parse the stored text representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system_admin" => Some(Self::SystemAdmin),
            "administrator" => Some(Self::Administrator),
            "standard" => Some(Self::Standard),
            "audit" => Some(Self::Audit),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_system_admin(self) -> bool {
        matches!(self, Self::SystemAdmin)
    }
}

impl Default for Role {
    // Lowest-privilege general role; assigned when creation omits a role.
    fn default() -> Self {
        Self::Standard
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

/// Sanitized user projection: never carries the password hash or the
/// reset-token fields.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub is_active: bool,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.user_id.to_string(),
            is_active: user.is_active,
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}
