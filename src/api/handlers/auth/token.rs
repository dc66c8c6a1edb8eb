//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs and are never stored server-side: validity is
//! determined purely by signature and expiry. The claims are an identity
//! snapshot taken at login time; protected requests re-fetch the user and
//! never trust the embedded role or active flag for authorization.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::storage::UserRecord;
use super::types::Role;

/// Claims embedded in a session token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub active: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Uniform verification failure. Malformed, tampered, and expired tokens all
/// collapse here; callers must not distinguish the causes in a response.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid or expired token")]
pub struct InvalidToken;

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    /// Issue a signed token carrying the user's identity snapshot, expiring
    /// `ttl_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, user: &UserRecord) -> Result<String> {
        let now = now_unix();
        let claims = SessionClaims {
            sub: user.user_id.to_string(),
            username: user.username.clone(),
            role: user.role,
            active: user.is_active,
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .context("failed to sign session token")
    }

    /// Verify signature and expiry; any failure is the one uniform error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for malformed, tampered, or expired tokens.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, InvalidToken> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| InvalidToken)
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
