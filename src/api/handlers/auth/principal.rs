//! Authenticated principal extraction and the access-control gate.
//!
//! Flow Overview: verify the signed session cookie, verify the token inside
//! it, then re-fetch the user by id. The resulting [`Principal`] carries
//! current persisted state, never the token's claims — role and active-flag
//! changes (or a deleted account) take effect on the very next request.
//!
//! Identity failures are 401 ("who are you"); privilege failures are 403
//! ("I know who you are and you may not"). Gate checks take a materialized
//! principal, so a request without identity can never reach them.

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiError;

use super::cookie::extract_session_cookie;
use super::state::AuthState;
use super::storage::{fetch_user, UserRecord};
use super::types::Role;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
}

/// Resolve the session cookie into a principal, or fail with a uniform 401.
///
/// # Errors
///
/// `Unauthorized` for a missing cookie, a bad cookie signature, a bad or
/// expired token, or a token whose user no longer exists or is inactive;
/// `Internal` when the store itself fails.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, ApiError> {
    let Some(signed) = extract_session_cookie(headers) else {
        return Err(unauthorized());
    };
    // Cookie signature is the outer layer; tampering fails before token
    // verification runs.
    let Some(token) = auth_state.cookies().verify(&signed) else {
        return Err(unauthorized());
    };
    let Ok(claims) = auth_state.tokens().verify(&token) else {
        return Err(unauthorized());
    };
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return Err(unauthorized());
    };
    match fetch_user(pool, user_id).await {
        Ok(Some(user)) if user.is_active => Ok(Principal { user }),
        Ok(_) => Err(unauthorized()),
        Err(err) => Err(ApiError::Internal(err)),
    }
}

fn unauthorized() -> ApiError {
    // One message for every identity failure.
    ApiError::Unauthorized("Authorization failed".to_string())
}

fn forbidden() -> ApiError {
    ApiError::Forbidden("Forbidden: insufficient privileges.".to_string())
}

impl Principal {
    /// Role check: passes when the caller's role is allowed, or when the
    /// caller holds the top-level administrative role (superuser bypass).
    ///
    /// # Errors
    ///
    /// `Forbidden` when the role is not in the list and not `system_admin`.
    pub(crate) fn authorize(&self, allowed_roles: &[Role]) -> Result<(), ApiError> {
        if self.user.role.is_system_admin() || allowed_roles.contains(&self.user.role) {
            Ok(())
        } else {
            Err(forbidden())
        }
    }

    /// Ownership check: passes only when the requested resource id is the
    /// caller's own id.
    ///
    /// # Errors
    ///
    /// `Forbidden` for every other id, including other valid users.
    pub(crate) fn require_self(&self, resource_id: Uuid) -> Result<(), ApiError> {
        if self.user.user_id == resource_id {
            Ok(())
        } else {
            Err(forbidden())
        }
    }

    /// Combined gate for profile routes: privileged roles or the owner.
    ///
    /// # Errors
    ///
    /// `Forbidden` when both checks fail.
    pub(crate) fn authorize_or_self(
        &self,
        allowed_roles: &[Role],
        resource_id: Uuid,
    ) -> Result<(), ApiError> {
        if self.authorize(allowed_roles).is_ok() {
            return Ok(());
        }
        self.require_self(resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn principal(role: Role) -> Principal {
        Principal {
            user: UserRecord {
                user_id: Uuid::new_v4(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Smith".to_string(),
                role,
                is_active: true,
                is_password_change_required: false,
            },
        }
    }

    #[test]
    fn authorize_allows_listed_role() {
        let caller = principal(Role::Administrator);
        assert!(caller.authorize(&[Role::Administrator]).is_ok());
    }

    #[test]
    fn authorize_rejects_unlisted_role() {
        let caller = principal(Role::Standard);
        let err = caller
            .authorize(&[Role::Administrator])
            .expect_err("standard may not pass");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let caller = principal(Role::Audit);
        assert!(caller.authorize(&[Role::Administrator]).is_err());
    }

    #[test]
    fn system_admin_bypasses_every_role_list() {
        let caller = principal(Role::SystemAdmin);
        assert!(caller.authorize(&[Role::Administrator]).is_ok());
        assert!(caller.authorize(&[Role::Audit]).is_ok());
        assert!(caller.authorize(&[]).is_ok());
    }

    #[test]
    fn require_self_matches_only_own_id() {
        let caller = principal(Role::Standard);
        assert!(caller.require_self(caller.user.user_id).is_ok());

        let other = Uuid::new_v4();
        let err = caller.require_self(other).expect_err("not the owner");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn authorize_or_self_accepts_either_gate() {
        let admin = principal(Role::Administrator);
        assert!(admin
            .authorize_or_self(&[Role::Administrator], Uuid::new_v4())
            .is_ok());

        let owner = principal(Role::Standard);
        assert!(owner
            .authorize_or_self(&[Role::Administrator], owner.user.user_id)
            .is_ok());

        let stranger = principal(Role::Standard);
        assert!(stranger
            .authorize_or_self(&[Role::Administrator], Uuid::new_v4())
            .is_err());
    }
}
