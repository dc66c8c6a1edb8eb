//! Password reset endpoints.
//!
//! The reset token is a stored nonce, not a signed structure: it can be
//! revoked early by overwriting the field, and a successful confirm clears
//! it so it is usable at most once.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::email::{send_best_effort, EmailMessage, Mailer};
use crate::api::error::ApiError;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{begin_password_reset, complete_password_reset};
use super::types::{PasswordResetConfirm, PasswordResetRequest};
use super::utils::{
    build_reset_url, generate_reset_token, hash_reset_token, valid_password,
    PASSWORD_POLICY_MESSAGE,
};

#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset email sent"),
        (status = 400, description = "Missing email"),
        (status = 404, description = "No account with this email")
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> Response {
    let email = match payload {
        Some(Json(payload)) => payload.email.trim().to_string(),
        None => String::new(),
    };
    if email.is_empty() {
        return ApiError::BadRequest("Please provide an email address.".to_string())
            .into_response();
    }

    let token = match generate_reset_token() {
        Ok(token) => token,
        Err(err) => return ApiError::Internal(err).into_response(),
    };
    let token_hash = hash_reset_token(&token);

    // One UPDATE both persists the digest and returns the recipient; a
    // pending token for the same account is overwritten and thereby revoked.
    let recipient = match begin_password_reset(
        &pool,
        &email,
        &token_hash,
        auth_state.config().reset_token_ttl_seconds(),
    )
    .await
    {
        Ok(recipient) => recipient,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let Some(recipient) = recipient else {
        return ApiError::NotFound("No user found with this email address.".to_string())
            .into_response();
    };

    // The token stays valid even if the mail never leaves; a retried request
    // generates a fresh token and invalidates this one.
    let reset_link = build_reset_url(auth_state.config().frontend_base_url(), &token);
    let message = EmailMessage {
        to: recipient.email.clone(),
        subject: "Password Reset Request".to_string(),
        template: "passwordReset".to_string(),
        payload_json: json!({
            "resetLink": reset_link,
            "firstName": recipient.first_name,
            "lastName": recipient.last_name,
            "email": recipient.email,
            "expiresIn": recipient.expires_at,
        })
        .to_string(),
    };
    send_best_effort(mailer.0.as_ref(), &message);

    (
        StatusCode::OK,
        Json(json!({ "message": "Password reset email sent." })),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password has been reset"),
        (status = 400, description = "Invalid or expired password reset token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<PasswordResetConfirm>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError::InvalidOrExpiredToken.into_response();
    };

    let token = request.token.trim();
    if token.is_empty() {
        return ApiError::InvalidOrExpiredToken.into_response();
    }

    if !valid_password(&request.new_password) {
        return ApiError::BadRequest(PASSWORD_POLICY_MESSAGE.to_string()).into_response();
    }

    // Hash first: a hashing failure must not consume the token.
    let password_hash = match hash_password(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let token_hash = hash_reset_token(token);
    match complete_password_reset(&pool, &token_hash, &password_hash).await {
        // Wrong and expired tokens answer identically.
        Ok(false) => ApiError::InvalidOrExpiredToken.into_response(),
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "message": "Password has been reset." })),
        )
            .into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}
