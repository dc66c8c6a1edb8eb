//! Small helpers for auth validation and reset token handling.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Basic email format check.
pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Password policy: at least 8 characters with one lowercase, one uppercase,
/// one digit, and one symbol.
pub(crate) fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

pub(crate) const PASSWORD_POLICY_MESSAGE: &str = "The password must be at least 8 characters long, contain at least 1 lowercase letter, 1 uppercase letter, 1 number, and 1 symbol.";

/// Create a new password reset token.
///
/// 32 bytes from the OS RNG, so the nonce clears the 160-bit floor with
/// room to spare. The raw value only travels in the reset link; the database
/// stores a digest.
///
/// # Errors
///
/// Returns an error if the OS RNG fails.
pub(crate) fn generate_reset_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a reset token so raw values never touch the database.
/// The digest is used for the lookup when the token comes back.
pub(crate) fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend reset link included in outbound emails.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_password_enforces_policy() {
        assert!(valid_password("Abcdef1!"));
        assert!(valid_password("Sup3r-secret"));
        // too short
        assert!(!valid_password("Ab1!"));
        // missing uppercase
        assert!(!valid_password("abcdef1!"));
        // missing lowercase
        assert!(!valid_password("ABCDEF1!"));
        // missing digit
        assert!(!valid_password("Abcdefg!"));
        // missing symbol
        assert!(!valid_password("Abcdefg1"));
    }

    #[test]
    fn generate_reset_token_entropy() {
        let token = generate_reset_token().expect("token");
        let decoded = Base64UrlUnpadded::decode_vec(&token).expect("base64url");
        assert_eq!(decoded.len(), 32);
        assert_ne!(token, generate_reset_token().expect("token"));
    }

    #[test]
    fn hash_reset_token_stable() {
        let first = hash_reset_token("token");
        let second = hash_reset_token("token");
        let different = hash_reset_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn build_reset_url_trims_trailing_slash() {
        let url = build_reset_url("http://localhost:8000/", "abc");
        assert_eq!(url, "http://localhost:8000/reset-password?token=abc");
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
