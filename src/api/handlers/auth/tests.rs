//! Cross-module auth tests: the session credential as a whole.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use secrecy::SecretString;
use uuid::Uuid;

use super::cookie::{extract_session_cookie, session_cookie};
use super::state::{AuthConfig, AuthState};
use super::storage::UserRecord;
use super::token::InvalidToken;
use super::types::Role;
use crate::cli::globals::GlobalArgs;

fn auth_state() -> AuthState {
    let globals = GlobalArgs::new(
        SecretString::from("jwt-secret".to_string()),
        SecretString::from("cookie-secret".to_string()),
    );
    AuthState::new(
        AuthConfig::new("http://localhost:8000".to_string()),
        &globals,
    )
}

fn user(role: Role) -> UserRecord {
    UserRecord {
        user_id: Uuid::new_v4(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Smith".to_string(),
        role,
        is_active: true,
        is_password_change_required: false,
    }
}

/// Turn a `Set-Cookie` header value into a request `Cookie` header.
fn request_headers_from_set_cookie(set_cookie: &HeaderValue) -> HeaderMap {
    let pair = set_cookie
        .to_str()
        .expect("ascii cookie")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string();
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, pair.parse().expect("header value"));
    headers
}

#[test]
fn session_credential_round_trip() {
    let state = auth_state();
    let user = user(Role::Standard);

    // Issue the token, wrap it in the signed cookie, then walk the request
    // path: extract, verify the cookie signature, verify the token.
    let token = state.tokens().issue(&user).expect("token");
    let set_cookie = session_cookie(&state, &token).expect("cookie");
    let headers = request_headers_from_set_cookie(&set_cookie);

    let signed = extract_session_cookie(&headers).expect("cookie present");
    let inner = state.cookies().verify(&signed).expect("valid signature");
    assert_eq!(inner, token);

    let claims = state.tokens().verify(&inner).expect("valid token");
    assert_eq!(claims.sub, user.user_id.to_string());
    assert_eq!(claims.username, user.username);
    assert_eq!(claims.role, Role::Standard);
    assert!(claims.active);
}

#[test]
fn tampered_cookie_dies_before_token_verification() {
    let state = auth_state();
    let token = state.tokens().issue(&user(Role::Standard)).expect("token");
    let signed = state.cookies().sign(&token).expect("signed");

    // Flip the first character of the embedded (still perfectly valid)
    // token.
    let first = signed.chars().next().expect("nonempty");
    let replacement = if first == 'x' { 'y' } else { 'x' };
    let tampered = format!("{replacement}{}", &signed[1..]);
    assert_ne!(signed, tampered);
    assert_eq!(state.cookies().verify(&tampered), None);
}

#[test]
fn cookie_from_a_different_deployment_is_rejected() {
    let state = auth_state();
    let other_globals = GlobalArgs::new(
        SecretString::from("jwt-secret".to_string()),
        SecretString::from("other-cookie-secret".to_string()),
    );
    let other = AuthState::new(
        AuthConfig::new("http://localhost:8000".to_string()),
        &other_globals,
    );

    let token = state.tokens().issue(&user(Role::Audit)).expect("token");
    let signed = other.cookies().sign(&token).expect("signed");
    assert_eq!(state.cookies().verify(&signed), None);
}

#[test]
fn token_from_a_rotated_signing_key_is_rejected() {
    let state = auth_state();
    let rotated_globals = GlobalArgs::new(
        SecretString::from("rotated-jwt-secret".to_string()),
        SecretString::from("cookie-secret".to_string()),
    );
    let rotated = AuthState::new(
        AuthConfig::new("http://localhost:8000".to_string()),
        &rotated_globals,
    );

    let token = state.tokens().issue(&user(Role::Standard)).expect("token");
    // Same cookie secret, so the outer layer still passes.
    let signed = rotated.cookies().sign(&token).expect("signed");
    let inner = rotated.cookies().verify(&signed).expect("cookie layer ok");
    assert_eq!(rotated.tokens().verify(&inner), Err(InvalidToken));
}
