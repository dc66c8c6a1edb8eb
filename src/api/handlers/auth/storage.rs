//! Database helpers for user records and password-reset state.
//!
//! The store is the sole arbiter for concurrent writes: reset-token updates
//! are last-writer-wins, and a second reset request simply overwrites (and
//! thereby revokes) the earlier token.

use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::Role;
use super::utils::is_unique_violation;

/// Projection of a user row without credential material.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_password_change_required: bool,
}

/// Login lookup: the projection plus the stored digest.
pub(super) struct CredentialRecord {
    pub(super) user: UserRecord,
    pub(super) password_hash: String,
}

/// A user row with its timestamps, for detail responses.
pub(crate) struct UserDetailRecord {
    pub(crate) user: UserRecord,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

/// Recipient data for the reset email, captured by the same UPDATE that
/// persists the token digest.
pub(crate) struct ResetRecipient {
    pub(crate) email: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) expires_at: String,
}

/// Outcome when inserting a new user.
#[derive(Debug)]
pub(crate) enum InsertOutcome {
    Created(UserRecord),
    Conflict,
}

/// Outcome when updating an existing user.
#[derive(Debug)]
pub(crate) enum UpdateOutcome {
    Updated(UserRecord),
    Conflict,
    Missing,
}

/// Fields for a new user row; `is_password_change_required` is always set.
pub(crate) struct NewUser {
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) password_hash: String,
    pub(crate) role: Role,
    pub(crate) is_active: bool,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub(crate) struct UserChanges {
    pub(crate) is_active: Option<bool>,
    pub(crate) role: Option<Role>,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) is_password_change_required: Option<bool>,
}

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, role, is_active, is_password_change_required";

fn record_from_row(row: &PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in store: {role}"))?;
    Ok(UserRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role,
        is_active: row.get("is_active"),
        is_password_change_required: row.get("is_password_change_required"),
    })
}

/// Look up credential data by username (login path).
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CredentialRecord>> {
    let query = "SELECT id, username, email, first_name, last_name, role, is_active, \
                 is_password_change_required, password_hash FROM users WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    row.map(|row| {
        Ok(CredentialRecord {
            user: record_from_row(&row)?,
            password_hash: row.get("password_hash"),
        })
    })
    .transpose()
}

/// Fetch the current state of a user by id.
///
/// Protected requests call this on every hit: session claims are a login
/// time snapshot and are never trusted for role or active checks.
pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    row.as_ref().map(record_from_row).transpose()
}

pub(crate) async fn fetch_user_detail(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserDetailRecord>> {
    let query = &format!(
        r#"SELECT {USER_COLUMNS},
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users WHERE id = $1"#
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user detail")?;

    row.map(|row| {
        Ok(UserDetailRecord {
            user: record_from_row(&row)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    })
    .transpose()
}

pub(crate) async fn list_users(pool: &PgPool) -> Result<Vec<UserRecord>> {
    let query = &format!("SELECT {USER_COLUMNS} FROM users ORDER BY username ASC");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;

    rows.iter().map(record_from_row).collect()
}

/// Case-insensitive contains-search over the name and address fields.
pub(crate) async fn search_users(
    pool: &PgPool,
    username: Option<&str>,
    email: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<Vec<UserRecord>> {
    let query = &format!(
        "SELECT {USER_COLUMNS} FROM users
        WHERE ($1::text IS NULL OR username ILIKE '%' || $1 || '%')
          AND ($2::text IS NULL OR email ILIKE '%' || $2 || '%')
          AND ($3::text IS NULL OR first_name ILIKE '%' || $3 || '%')
          AND ($4::text IS NULL OR last_name ILIKE '%' || $4 || '%')
        ORDER BY username ASC"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to search users")?;

    rows.iter().map(record_from_row).collect()
}

pub(crate) async fn username_exists(pool: &PgPool, username: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE username = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check username")?;
    Ok(row.is_some())
}

pub(crate) async fn email_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE email = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check email")?;
    Ok(row.is_some())
}

/// Insert a new user. The forced-change flag is set in SQL so an
/// administratively created account cannot log in before its first reset.
pub(crate) async fn insert_user(pool: &PgPool, new_user: &NewUser) -> Result<InsertOutcome> {
    let query = &format!(
        "INSERT INTO users
            (username, email, first_name, last_name, password_hash, role, is_active,
             is_password_change_required)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
        RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.is_active)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertOutcome::Created(record_from_row(&row)?)),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Apply a partial update; absent fields keep their stored values.
/// This path never touches the password hash.
pub(crate) async fn update_user(
    pool: &PgPool,
    user_id: Uuid,
    changes: &UserChanges,
) -> Result<UpdateOutcome> {
    let query = &format!(
        "UPDATE users
        SET is_active = COALESCE($2, is_active),
            role = COALESCE($3, role),
            first_name = COALESCE($4, first_name),
            last_name = COALESCE($5, last_name),
            username = COALESCE($6, username),
            email = COALESCE($7, email),
            is_password_change_required = COALESCE($8, is_password_change_required),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(changes.is_active)
        .bind(changes.role.map(|role| role.as_str().to_string()))
        .bind(changes.first_name.as_deref())
        .bind(changes.last_name.as_deref())
        .bind(changes.username.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.is_password_change_required)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(UpdateOutcome::Updated(record_from_row(&row)?)),
        Ok(None) => Ok(UpdateOutcome::Missing),
        Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::Conflict),
        Err(err) => Err(err).context("failed to update user"),
    }
}

pub(crate) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = &format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;

    row.as_ref().map(record_from_row).transpose()
}

/// Persist a reset token digest and expiry for the account with this email.
///
/// Overwrites any pending token (last writer wins, earlier reset links die).
/// Returns the recipient data for the mail, or `None` when no account
/// matches.
pub(crate) async fn begin_password_reset(
    pool: &PgPool,
    email: &str,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<Option<ResetRecipient>> {
    let query = r#"
        UPDATE users
        SET reset_token_hash = $2,
            reset_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE email = $1
        RETURNING email, first_name, last_name,
            to_char(reset_expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
                AS reset_expires_at
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(token_hash)
        .bind(ttl_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to begin password reset")?;

    Ok(row.map(|row| ResetRecipient {
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        expires_at: row.get("reset_expires_at"),
    }))
}

/// Consume a reset token: set the new hash and clear the reset fields in one
/// statement, so the token is single-use and both fields vanish together.
///
/// Returns `false` when no row matches (wrong token or already expired) —
/// the caller answers with one uniform message for both.
pub(super) async fn complete_password_reset(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            is_password_change_required = FALSE,
            reset_token_hash = NULL,
            reset_expires_at = NULL,
            updated_at = NOW()
        WHERE reset_token_hash = $1
          AND reset_expires_at > NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to complete password reset")?;

    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::{InsertOutcome, UpdateOutcome, UserChanges, UserRecord};
    use crate::api::handlers::auth::types::Role;
    use uuid::Uuid;

    #[test]
    fn insert_outcome_debug_names() {
        assert_eq!(format!("{:?}", InsertOutcome::Conflict), "Conflict");
    }

    #[test]
    fn update_outcome_debug_names() {
        assert_eq!(format!("{:?}", UpdateOutcome::Conflict), "Conflict");
        assert_eq!(format!("{:?}", UpdateOutcome::Missing), "Missing");
    }

    #[test]
    fn user_changes_default_is_noop() {
        let changes = UserChanges::default();
        assert!(changes.is_active.is_none());
        assert!(changes.role.is_none());
        assert!(changes.first_name.is_none());
        assert!(changes.last_name.is_none());
        assert!(changes.username.is_none());
        assert!(changes.email.is_none());
        assert!(changes.is_password_change_required.is_none());
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            user_id: Uuid::nil(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            role: Role::Audit,
            is_active: false,
            is_password_change_required: true,
        };
        assert_eq!(record.user_id, Uuid::nil());
        assert_eq!(record.role, Role::Audit);
        assert!(record.is_password_change_required);
    }
}
