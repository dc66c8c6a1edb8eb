//! Auth state and configuration.
//!
//! The token-signing and cookie-signing secrets are process-wide, read-only
//! configuration. They are injected here at construction instead of living
//! in globals, so the token service and cookie signer stay testable in
//! isolation. Rotating either secret invalidates all outstanding sessions.

use crate::cli::globals::GlobalArgs;

use super::cookie::CookieSigner;
use super::token::TokenService;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_MAIL_FROM: &str = "no-reply@insight-crm.dev";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    mail_from: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mail_from(mut self, mail_from: String) -> Self {
        self.mail_from = mail_from;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(crate) fn mail_from(&self) -> &str {
        &self.mail_from
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        // Only mark cookies secure when the frontend is served over HTTPS.
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    cookies: CookieSigner,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, globals: &GlobalArgs) -> Self {
        let tokens = TokenService::new(&globals.jwt_secret, config.session_ttl_seconds());
        let cookies = CookieSigner::new(&globals.cookie_secret);
        Self {
            config,
            tokens,
            cookies,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub(crate) fn cookies(&self) -> &CookieSigner {
        &self.cookies
    }
}
