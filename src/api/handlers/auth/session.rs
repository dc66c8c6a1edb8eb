//! Session endpoints: current-user resolution and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::cookie::{clear_session_cookie, set_cookie_headers};
use super::principal::require_auth;
use super::state::AuthState;
use super::types::UserResponse;

#[utoipa::path(
    get,
    path = "/api/auth/current-user",
    responses(
        (status = 200, description = "The authenticated user's sanitized profile", body = UserResponse),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "auth"
)]
pub async fn current_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    // Verify the cookie, then re-fetch the user: stale claims are never
    // returned, and a deleted account fails here instead of crashing.
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => (
            StatusCode::OK,
            Json(json!({ "user": UserResponse::from(&principal.user) })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> Response {
    // Logout is idempotent: there is no server-side session to check, so
    // clearing the cookie always succeeds.
    let mut response_headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            response_headers = set_cookie_headers(cookie);
        }
        Err(err) => error!("Failed to build clear cookie: {err}"),
    }
    (
        StatusCode::OK,
        response_headers,
        Json(json!({ "success": true })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::cli::globals::GlobalArgs;
    use secrecy::SecretString;
    use axum::http::header::SET_COOKIE;
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
    async fn current_user_without_cookie_is_unauthorized() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let response = current_user(HeaderMap::new(), Extension(pool), Extension(auth_state())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn current_user_with_tampered_cookie_is_unauthorized() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "token=forged.value".parse().expect("header"),
        );
        let response = current_user(headers, Extension(pool), Extension(auth_state())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let response = logout(Extension(auth_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("set-cookie");
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
