//! Signed session cookie handling.
//!
//! The cookie value is `<token>.<base64url(HMAC-SHA256(cookie_secret,
//! token))>`. This signature is a second layer, independent of the token's
//! own signature: a tampered cookie is rejected here before token
//! verification even runs.

use anyhow::{Context, Result};
use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::state::{AuthConfig, AuthState};

pub(crate) const SESSION_COOKIE_NAME: &str = "token";

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies cookie values with the cookie secret.
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        Self {
            key: secret.expose_secret().as_bytes().to_vec(),
        }
    }

    /// Append the keyed signature to a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer cannot be initialized.
    pub fn sign(&self, value: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| anyhow::anyhow!("failed to initialize cookie signer"))?;
        mac.update(value.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!(
            "{value}.{}",
            Base64UrlUnpadded::encode_string(&tag)
        ))
    }

    /// Verify a signed value and return the embedded token.
    ///
    /// The signature sits after the last `.`; comparison is constant time.
    /// Any mismatch returns `None`.
    #[must_use]
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (value, signature) = signed.rsplit_once('.')?;
        let signature = Base64UrlUnpadded::decode_vec(signature).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }
}

/// Build the `Set-Cookie` header for a freshly issued session token.
pub(crate) fn session_cookie(auth_state: &AuthState, token: &str) -> Result<HeaderValue> {
    let signed = auth_state.cookies().sign(token)?;
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={signed}; Path=/; HttpOnly; SameSite=Strict; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("failed to build session cookie")
}

/// Build the `Set-Cookie` header that clears the session cookie.
pub(crate) fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("failed to build session cookie")
}

/// Pull the raw (still signed) session cookie value out of the headers.
pub(crate) fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

/// Attach a `Set-Cookie` header pair to a response header map.
pub(crate) fn set_cookie_headers(cookie: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::globals::GlobalArgs;

    fn signer() -> CookieSigner {
        CookieSigner::new(&SecretString::from("cookie-secret".to_string()))
    }

    fn auth_state(frontend: &str) -> AuthState {
        let globals = GlobalArgs::new(
            SecretString::from("jwt-secret".to_string()),
            SecretString::from("cookie-secret".to_string()),
        );
        AuthState::new(AuthConfig::new(frontend.to_string()), &globals)
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = signer();
        let signed = signer.sign("header.payload.signature").expect("sign");
        assert_eq!(
            signer.verify(&signed).as_deref(),
            Some("header.payload.signature")
        );
    }

    #[test]
    fn tampered_value_is_rejected() {
        let signer = signer();
        let signed = signer.sign("token-value").expect("sign");
        let tampered = signed.replace("token-value", "token-velue");
        assert_eq!(signer.verify(&tampered), None);
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let signer = signer();
        let signed = signer.sign("token-value").expect("sign");
        let truncated = &signed[..signed.len() - 2];
        assert_eq!(signer.verify(truncated), None);
    }

    #[test]
    fn different_secret_is_rejected() {
        let signed = signer().sign("token-value").expect("sign");
        let other = CookieSigner::new(&SecretString::from("another-secret".to_string()));
        assert_eq!(other.verify(&signed), None);
    }

    #[test]
    fn unsigned_value_is_rejected() {
        assert_eq!(signer().verify("token-value"), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let state = auth_state("http://localhost:8000");
        let cookie = session_cookie(&state, "jwt").expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("token=jwt."));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_secure_on_https_frontend() {
        let state = auth_state("https://crm.insight.dev");
        let cookie = session_cookie(&state, "jwt").expect("cookie");
        assert!(cookie.to_str().expect("ascii").contains("; Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let config = AuthConfig::new("http://localhost:8000".to_string());
        let cookie = clear_session_cookie(&config).expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn extract_finds_cookie_among_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def; lang=en"),
        );
        assert_eq!(extract_session_cookie(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn extract_none_when_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_cookie(&headers), None);
    }
}
