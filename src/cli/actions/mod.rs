pub mod server;

/// Actions the CLI can dispatch to.
#[derive(Debug, Clone)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        session_ttl_seconds: i64,
        reset_token_ttl_seconds: i64,
        frontend_base_url: String,
        mail_from: String,
    },
}
