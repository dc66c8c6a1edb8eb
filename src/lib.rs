//! # Insight CRM Web API
//!
//! `insight` is a CRUD-oriented HTTP API for a small CRM/CMS: user accounts,
//! customer records, authentication, and transactional email notifications.
//!
//! ## Authentication
//!
//! Credentials are verified against Argon2id digests; a successful login
//! issues a signed, time-limited session token (HS256) carried in an
//! HttpOnly, SameSite=Strict cookie. The cookie value itself is signed with
//! an independent secret, so tampering is rejected before token verification
//! even runs. Sessions are stateless: validity is determined purely by
//! signature and expiry, and every protected request re-fetches the user so
//! role and active-flag changes take effect immediately.
//!
//! ## Authorization
//!
//! Roles form a closed set (`system_admin`, `administrator`, `standard`,
//! `audit`). The `system_admin` role satisfies every role check. Profile
//! routes additionally accept the account owner.
//!
//! ## Password reset
//!
//! Reset tokens are high-entropy stored nonces (only the digest is
//! persisted), valid for one hour and consumed exactly once. Requesting a new
//! reset overwrites any pending token.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
