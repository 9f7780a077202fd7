//! Outbound SMTP client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use postrider_common::config::SmtpConfig;
use thiserror::Error;

/// Failures building the SMTP transport at startup.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid from address: {0}")]
    FromAddress(#[from] lettre::address::AddressError),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// The result of one send attempt. The engine cares about nothing beyond
/// the boolean; the error string is persisted for operators.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl SendOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

/// Single-shot send contract between the engine and the SMTP layer.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Compose and submit one message. Never returns `Err`: every
    /// transport, authentication, or protocol failure collapses into a
    /// failed [`SendOutcome`].
    async fn send(&self, to: &[String], subject: &str, html: &str) -> SendOutcome;
}

/// Lettre-backed [`Mailer`].
///
/// Generic over the transport so tests can inject
/// `lettre::transport::stub::AsyncStubTransport`.
pub struct SmtpMailer<T = AsyncSmtpTransport<Tokio1Executor>> {
    transport: T,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the production transport from configuration.
    ///
    /// STARTTLS is required when `use_tls` is set, otherwise the
    /// connection stays plaintext. Credentials are attached only when both
    /// username and password are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the from address or TLS parameters are invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
                .port(config.port);

        if config.use_tls {
            let tls = TlsParameters::new(config.server.clone())?;
            builder = builder.tls(Tls::Required(tls));
        }

        if !config.username.is_empty() && !config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(
                Some(config.from_name.clone()),
                config.from_email.parse()?,
            ),
        })
    }
}

impl<T> SmtpMailer<T> {
    /// Build a mailer over an arbitrary transport (test seam).
    ///
    /// # Errors
    ///
    /// Returns an error if the from address is invalid.
    pub fn with_transport(
        transport: T,
        from_name: &str,
        from_email: &str,
    ) -> Result<Self, MailerError> {
        Ok(Self {
            transport,
            from: Mailbox::new(Some(from_name.to_string()), from_email.parse()?),
        })
    }

    fn compose(&self, to: &[String], subject: &str, html: &str) -> Result<Message, String> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in to {
            builder = builder.to(recipient
                .parse::<Mailbox>()
                .map_err(|e| format!("invalid recipient {recipient}: {e}"))?);
        }
        builder
            .multipart(
                MultiPart::alternative().singlepart(SinglePart::html(html.to_string())),
            )
            .map_err(|e| format!("failed to compose message: {e}"))
    }
}

#[async_trait]
impl<T> Mailer for SmtpMailer<T>
where
    T: AsyncTransport + Send + Sync,
    T::Ok: Send,
    T::Error: std::fmt::Display + Send,
{
    async fn send(&self, to: &[String], subject: &str, html: &str) -> SendOutcome {
        let message = match self.compose(to, subject, html) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "failed to compose outbound message");
                return SendOutcome::failed(error);
            }
        };

        tracing::info!(to = %to.join(","), subject, "sending email");
        match self.transport.send(message).await {
            Ok(_) => SendOutcome::ok(),
            Err(error) => {
                let error = format!("failed to send email: {error}");
                tracing::error!(%error, "SMTP send failed");
                SendOutcome::failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lettre::transport::stub::AsyncStubTransport;

    use super::*;

    fn mailer(transport: AsyncStubTransport) -> SmtpMailer<AsyncStubTransport> {
        SmtpMailer::with_transport(transport, "Postrider", "postrider@example.org").unwrap()
    }

    #[tokio::test]
    async fn successful_send_reports_success() {
        let outcome = mailer(AsyncStubTransport::new_ok())
            .send(&["a@example.org".to_string()], "Hi", "<p>hi</p>")
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed_outcome() {
        let outcome = mailer(AsyncStubTransport::new_error())
            .send(&["a@example.org".to_string()], "Hi", "<p>hi</p>")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("failed to send email"));
    }

    #[tokio::test]
    async fn invalid_recipient_becomes_failed_outcome() {
        let outcome = mailer(AsyncStubTransport::new_ok())
            .send(&["not-an-address".to_string()], "Hi", "<p>hi</p>")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid recipient"));
    }

    #[tokio::test]
    async fn multiple_recipients_go_out_in_one_message() {
        let transport = AsyncStubTransport::new_ok();
        let outcome = mailer(transport.clone())
            .send(
                &["b@example.org".to_string(), "a@example.org".to_string()],
                "Hi",
                "<p>hi</p>",
            )
            .await;
        assert!(outcome.success);
        assert_eq!(transport.messages().await.len(), 1);
    }
}
