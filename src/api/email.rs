//! Mail delivery abstraction.
//!
//! Handlers enqueue nothing: mail is dispatched inline and is best-effort.
//! The `Mailer` decides how to deliver (SMTP, API, etc.) and returns
//! `Ok`/`Err`; callers that treat mail as incidental go through
//! [`send_best_effort`], which logs failures and moves on. The default
//! sender for local dev is `LogMailer`, which logs and returns `Ok(())`.
//!
//! Template rendering is the transport's concern: a message carries the
//! template name plus a JSON payload, exactly what a renderer needs.

use anyhow::Result;
use tracing::{error, info};

/// One outbound email: recipient, subject, template name, and payload.
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction.
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying transport fails to deliver.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Dispatch a message where mail is incidental to the request.
///
/// Failures are logged, never propagated; the persisted state the message
/// refers to (e.g. a reset token) stays valid either way.
pub fn send_best_effort(mailer: &dyn Mailer, message: &EmailMessage) {
    if let Err(err) = mailer.send(message) {
        error!(
            to = %message.to,
            template = %message.template,
            "email dispatch failed: {err}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingMailer;

    impl Mailer for FailingMailer {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            Err(anyhow!("smtp down"))
        }
    }

    struct CountingMailer {
        sent: AtomicUsize,
    }

    impl Mailer for CountingMailer {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: "alice@example.com".to_string(),
            subject: "Welcome".to_string(),
            template: "welcome".to_string(),
            payload_json: "{}".to_string(),
        }
    }

    #[test]
    fn log_mailer_succeeds() {
        assert!(LogMailer.send(&message()).is_ok());
    }

    #[test]
    fn best_effort_swallows_errors() {
        // Must not panic or propagate.
        send_best_effort(&FailingMailer, &message());
    }

    #[test]
    fn best_effort_delivers() {
        let mailer = CountingMailer {
            sent: AtomicUsize::new(0),
        };
        send_best_effort(&mailer, &message());
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
    }
}
