//! Administrative user management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via the signed session cookie.
//! 2) Enforce role-based access (administrators; profile routes also accept
//!    the account owner).
//! 3) Perform the requested read or allow-listed write.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::email::{send_best_effort, EmailMessage, Mailer};
use crate::api::error::ApiError;

use super::auth::password::hash_password;
use super::auth::principal::require_auth;
use super::auth::storage::{
    delete_user as delete_user_record, email_exists, fetch_user, fetch_user_detail, insert_user,
    list_users as list_user_records, search_users as search_user_records,
    update_user as update_user_record, username_exists, InsertOutcome, NewUser, UpdateOutcome,
    UserChanges,
};
use super::auth::types::{Role, UserResponse};
use super::auth::utils::{valid_password, PASSWORD_POLICY_MESSAGE};
use super::auth::AuthState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_password_change_required: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchQuery {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendEmailRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Sanitized projection plus timestamps, for detail responses.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub id: String,
    pub is_active: bool,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing fields or weak password"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Username or email already in use")
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<CreateUserRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }

    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Please fill in all fields.".to_string()).into_response();
    };

    if request.first_name.trim().is_empty()
        || request.last_name.trim().is_empty()
        || request.username.trim().is_empty()
        || request.email.trim().is_empty()
        || request.password.is_empty()
    {
        return ApiError::BadRequest("Please fill in all fields.".to_string()).into_response();
    }

    if !valid_password(&request.password) {
        return ApiError::BadRequest(PASSWORD_POLICY_MESSAGE.to_string()).into_response();
    }

    let username = request.username.trim().to_string();
    let email = request.email.trim().to_string();

    match username_exists(&pool, &username).await {
        Ok(true) => {
            return ApiError::Conflict(format!("The username {username} is already in use."))
                .into_response()
        }
        Ok(false) => {}
        Err(err) => return ApiError::Internal(err).into_response(),
    }
    match email_exists(&pool, &email).await {
        Ok(true) => {
            return ApiError::Conflict(format!("The email {email} is already in use."))
                .into_response()
        }
        Ok(false) => {}
        Err(err) => return ApiError::Internal(err).into_response(),
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let new_user = NewUser {
        username,
        email,
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        password_hash,
        role: request.role.unwrap_or_default(),
        is_active: request.is_active.unwrap_or(true),
    };

    let created = match insert_user(&pool, &new_user).await {
        Ok(InsertOutcome::Created(record)) => record,
        // Lost the race with a concurrent insert.
        Ok(InsertOutcome::Conflict) => {
            return ApiError::Conflict("Username or email already in use.".to_string())
                .into_response()
        }
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    // Active accounts get a welcome mail with a ready-to-use reset link; the
    // account stays locked behind the forced password change until it is
    // used.
    if created.is_active {
        send_welcome_email(&pool, &auth_state, mailer.0.as_ref(), &created).await;
    }

    (
        StatusCode::CREATED,
        Json(UserResponse::from(&created)),
    )
        .into_response()
}

async fn send_welcome_email(
    pool: &PgPool,
    auth_state: &AuthState,
    mailer: &dyn Mailer,
    created: &super::auth::storage::UserRecord,
) {
    use super::auth::storage::begin_password_reset;
    use super::auth::utils::{build_reset_url, generate_reset_token, hash_reset_token};

    let Ok(token) = generate_reset_token() else {
        tracing::error!("Failed to generate welcome reset token");
        return;
    };
    let token_hash = hash_reset_token(&token);
    let recipient = match begin_password_reset(
        pool,
        &created.email,
        &token_hash,
        auth_state.config().reset_token_ttl_seconds(),
    )
    .await
    {
        Ok(Some(recipient)) => recipient,
        Ok(None) => return,
        Err(err) => {
            tracing::error!("Failed to persist welcome reset token: {err}");
            return;
        }
    };

    let reset_link = build_reset_url(auth_state.config().frontend_base_url(), &token);
    let message = EmailMessage {
        to: recipient.email.clone(),
        subject: "Welcome to the Insight CRM!".to_string(),
        template: "welcome".to_string(),
        payload_json: json!({
            "resetLink": reset_link,
            "firstName": created.first_name,
            "lastName": created.last_name,
            "username": created.username,
            "email": created.email,
        })
        .to_string(),
    };
    send_best_effort(mailer, &message);
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users, sanitized", body = [UserResponse]),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden")
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }

    match list_user_records(&pool).await {
        Ok(records) => {
            let users: Vec<UserResponse> = records.iter().map(UserResponse::from).collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/users/search",
    params(
        ("username" = Option<String>, Query, description = "Username contains"),
        ("email" = Option<String>, Query, description = "Email contains"),
        ("firstName" = Option<String>, Query, description = "First name contains"),
        ("lastName" = Option<String>, Query, description = "Last name contains")
    ),
    responses(
        (status = 200, description = "Matching users", body = [UserResponse]),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No users found")
    ),
    tag = "users"
)]
pub async fn search_users(
    Query(query): Query<UserSearchQuery>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }

    let records = match search_user_records(
        &pool,
        query.username.as_deref(),
        query.email.as_deref(),
        query.first_name.as_deref(),
        query.last_name.as_deref(),
    )
    .await
    {
        Ok(records) => records,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    if records.is_empty() {
        return ApiError::NotFound("No users found.".to_string()).into_response();
    }

    let users: Vec<UserResponse> = records.iter().map(UserResponse::from).collect();
    (StatusCode::OK, Json(users)).into_response()
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail, sanitized", body = UserDetail),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid user id.".to_string()).into_response();
    };
    // Administrators may read anyone; everyone may read themself.
    if let Err(err) = principal.authorize_or_self(&[Role::Administrator], user_id) {
        return err.into_response();
    }

    match fetch_user_detail(&pool, user_id).await {
        Ok(Some(detail)) => {
            let response = UserDetail {
                id: detail.user.user_id.to_string(),
                is_active: detail.user.is_active,
                role: detail.user.role,
                first_name: detail.user.first_name.clone(),
                last_name: detail.user.last_name.clone(),
                username: detail.user.username.clone(),
                email: detail.user.email.clone(),
                created_at: detail.created_at,
                updated_at: detail.updated_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => {
            ApiError::NotFound(format!("No user found with the ID: {user_id}")).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username or email already in use")
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateUserRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid user id.".to_string()).into_response();
    };
    if let Err(err) = principal.authorize_or_self(&[Role::Administrator], user_id) {
        return err.into_response();
    }

    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("No updates provided.".to_string()).into_response();
    };

    // Owners may edit their profile, but privilege-bearing fields stay
    // admin-only.
    let is_admin = principal.authorize(&[Role::Administrator]).is_ok();
    if !is_admin
        && (request.role.is_some()
            || request.is_active.is_some()
            || request.is_password_change_required.is_some())
    {
        return ApiError::Forbidden("Forbidden: insufficient privileges.".to_string())
            .into_response();
    }

    let changes = UserChanges {
        is_active: request.is_active,
        role: request.role,
        first_name: normalize_optional(request.first_name),
        last_name: normalize_optional(request.last_name),
        username: normalize_optional(request.username),
        email: normalize_optional(request.email),
        is_password_change_required: request.is_password_change_required,
    };

    match update_user_record(&pool, user_id, &changes).await {
        Ok(UpdateOutcome::Updated(record)) => {
            (StatusCode::OK, Json(UserResponse::from(&record))).into_response()
        }
        Ok(UpdateOutcome::Conflict) => {
            ApiError::Conflict("Username or email already in use.".to_string()).into_response()
        }
        Ok(UpdateOutcome::Missing) => {
            ApiError::NotFound(format!("No user found with the ID: {user_id}")).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid user id.".to_string()).into_response();
    };

    match delete_user_record(&pool, user_id).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(json!({
                "message":
                    format!("User {} {} has been deleted.", record.first_name, record.last_name)
            })),
        )
            .into_response(),
        Ok(None) => {
            ApiError::NotFound(format!("No user found with the ID: {user_id}")).into_response()
        }
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/users/{id}/send-email",
    params(("id" = String, Path, description = "User id")),
    request_body = SendEmailRequest,
    responses(
        (status = 200, description = "Email sent"),
        (status = 400, description = "Invalid user id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn send_email(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<SendEmailRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid user id.".to_string()).into_response();
    };
    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Please provide a subject and body.".to_string())
            .into_response();
    };

    match fetch_user(&pool, user_id).await {
        Ok(Some(user)) => {
            let message = EmailMessage {
                to: user.email,
                subject: request.subject,
                template: "blank".to_string(),
                payload_json: json!({ "body": request.body }).to_string(),
            };
            send_best_effort(mailer.0.as_ref(), &message);
            (
                StatusCode::OK,
                Json(json!({ "message": "Email sent." })),
            )
                .into_response()
        }
        Ok(None) => ApiError::NotFound("User not found.".to_string()).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
