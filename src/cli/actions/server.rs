use crate::api;
use crate::api::email::{LogMailer, Mailer};
use crate::api::handlers::auth::{AuthConfig, AuthState};
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            session_ttl_seconds,
            reset_token_ttl_seconds,
            frontend_base_url,
            mail_from,
        } => {
            let config = AuthConfig::new(frontend_base_url)
                .with_session_ttl_seconds(session_ttl_seconds)
                .with_reset_token_ttl_seconds(reset_token_ttl_seconds)
                .with_mail_from(mail_from);

            let auth_state = Arc::new(AuthState::new(config, globals));
            let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

            api::new(port, dsn, auth_state, mailer).await?;
        }
    }

    Ok(())
}
