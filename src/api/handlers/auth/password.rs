//! Password hashing and verification.
//!
//! Argon2id with a per-call random salt embedded in the PHC string. Hashing
//! runs only when a plaintext password is supplied on a write path; a
//! hashing failure is fatal to the surrounding write.

use anyhow::{anyhow, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

/// Hash a plaintext password into a PHC string.
///
/// # Errors
///
/// Returns an error if Argon2 fails; callers must not persist the record.
pub(crate) fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext candidate against a stored digest.
///
/// An unparseable digest counts as a mismatch rather than an error: the
/// caller answers with the same uniform invalid-credentials response either
/// way.
pub(crate) fn verify_password(plaintext: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let digest = hash_password("Sup3r-secret!").expect("hash");
        assert!(verify_password("Sup3r-secret!", &digest));
    }

    #[test]
    fn verify_rejects_different_plaintext() {
        let digest = hash_password("Sup3r-secret!").expect("hash");
        assert!(!verify_password("Sup3r-secret", &digest));
        assert!(!verify_password("", &digest));
    }

    #[test]
    fn salts_are_randomized() {
        let first = hash_password("Sup3r-secret!").expect("hash");
        let second = hash_password("Sup3r-secret!").expect("hash");
        assert_ne!(first, second);
        assert!(verify_password("Sup3r-secret!", &second));
    }

    #[test]
    fn digest_is_phc_encoded() {
        let digest = hash_password("Sup3r-secret!").expect("hash");
        assert!(digest.starts_with("$argon2id$"));
    }

    #[test]
    fn garbage_digest_is_a_mismatch() {
        assert!(!verify_password("Sup3r-secret!", "not-a-digest"));
    }
}
