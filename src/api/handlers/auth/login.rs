//! Login endpoint.
//!
//! The attempt walks a fixed ladder: input shape, lookup, forced password
//! change, active flag, credential check. A missing username and a wrong
//! password answer with the same status and body, so the response never
//! reveals whether an account exists. Login mutates nothing.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::error::ApiError;

use super::cookie::{session_cookie, set_cookie_headers};
use super::password::verify_password;
use super::state::AuthState;
use super::storage::lookup_credentials;
use super::types::{LoginRequest, UserResponse};

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid username or password." })),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; sets the session cookie", body = UserResponse),
        (status = 400, description = "Missing credentials, inactive account, or password change required"),
        (status = 401, description = "Invalid username or password")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Please provide both a username and password." })),
            )
                .into_response()
        }
    };

    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Please provide both a username and password." })),
        )
            .into_response();
    }

    let record = match lookup_credentials(&pool, username).await {
        Ok(record) => record,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let Some(record) = record else {
        return invalid_credentials();
    };

    // Distinct signal so the client can route to a change-password flow
    // instead of showing "invalid credentials".
    if record.user.is_password_change_required {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "isPasswordChangeRequired": true })),
        )
            .into_response();
    }

    if !record.user.is_active {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "User is not active" })),
        )
            .into_response();
    }

    if !verify_password(&request.password, &record.password_hash) {
        return invalid_credentials();
    }

    let token = match auth_state.tokens().issue(&record.user) {
        Ok(token) => token,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let cookie = match session_cookie(&auth_state, &token) {
        Ok(cookie) => cookie,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    (
        StatusCode::OK,
        set_cookie_headers(cookie),
        Json(json!({ "user": UserResponse::from(&record.user) })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::cli::globals::GlobalArgs;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        let globals = GlobalArgs::new(
            SecretString::from("jwt-secret".to_string()),
            SecretString::from("cookie-secret".to_string()),
        );
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:8000".to_string()),
            &globals,
        ))
    }

    #[tokio::test]
    async fn login_missing_payload() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let response = login(Extension(pool), Extension(auth_state()), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_empty_fields() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let request = LoginRequest {
            username: "  ".to_string(),
            password: String::new(),
        };
        let response = login(Extension(pool), Extension(auth_state()), Some(Json(request))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
