use anyhow::{Context, Result};
use secrecy::SecretString;

/// Process-wide secrets, read-only after startup.
///
/// The token-signing and cookie-signing secrets are independent layers: the
/// session token is signed with `jwt_secret`, and the cookie that carries it
/// is signed again with `cookie_secret`.
#[derive(Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub cookie_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, cookie_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            cookie_secret,
        }
    }

    /// Build the secret holder from validated CLI matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a required secret argument is missing.
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>("jwt-secret")
            .cloned()
            .context("missing required argument: --jwt-secret")?;
        let cookie_secret = matches
            .get_one::<String>("cookie-secret")
            .cloned()
            .context("missing required argument: --cookie-secret")?;
        Ok(Self::new(jwt_secret.into(), cookie_secret.into()))
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("jwt_secret", &"***")
            .field("cookie_secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            SecretString::from("jwt".to_string()),
            SecretString::from("cookie".to_string()),
        );
        assert_eq!(args.jwt_secret.expose_secret(), "jwt");
        assert_eq!(args.cookie_secret.expose_secret(), "cookie");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let args = GlobalArgs::new(
            SecretString::from("hunter2".to_string()),
            SecretString::from("correct-horse".to_string()),
        );
        let debug = format!("{args:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("correct-horse"));
        assert!(debug.contains("***"));
    }
}
