//! SMTP Client
//!
//! Mail delivery via lettre, behind the `MailTransport` seam.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use redress_utils::config::EmailConfig;

/// SMTP client configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl From<&EmailConfig> for SmtpConfig {
    fn from(config: &EmailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            username: config.smtp_username.clone(),
            password: config.smtp_password.clone(),
            from_email: config.from_address.clone(),
            from_name: config.from_name.clone(),
        }
    }
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the server's response text.
    async fn deliver(&self, email: &OutgoingEmail) -> Result<String>;
}

/// SMTP client for sending emails
pub struct SmtpClient {
    config: SmtpConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpClient {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Failed to create SMTP transport")?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            config,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .context("Invalid from address")?;

        let to_mailbox: Mailbox = format!("{} <{}>", email.to_name, email.to_email)
            .parse()
            .context("Invalid to address")?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.body_text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.body_html.clone()),
                    ),
            )
            .context("Failed to build email")
    }
}

#[async_trait]
impl MailTransport for SmtpClient {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<String> {
        let message = self.build_message(email)?;

        let response = self.mailer.send(message).await.context("Failed to send email")?;

        Ok(response.message().collect::<Vec<_>>().join("\n"))
    }
}

/// Used when email is disabled: logs the message and reports success.
#[derive(Debug, Clone, Default)]
pub struct NoopTransport;

#[async_trait]
impl MailTransport for NoopTransport {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<String> {
        tracing::debug!(to = %email.to_email, subject = %email.subject, "Email disabled, skipping delivery");
        Ok("email disabled".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to_email: "dana@example.com".to_string(),
            to_name: "Dana".to_string(),
            subject: "Update".to_string(),
            body_html: "<p>hi</p>".to_string(),
            body_text: "hi".to_string(),
        }
    }

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@redress.local".to_string(),
            from_name: "Redress".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_message_rejects_bad_recipient() {
        let client = SmtpClient::new(config()).unwrap();
        let mut bad = email();
        bad.to_email = "not an address".to_string();
        assert!(client.build_message(&bad).is_err());
        assert!(client.build_message(&email()).is_ok());
    }

    #[tokio::test]
    async fn test_noop_transport_reports_success() {
        assert!(NoopTransport.deliver(&email()).await.is_ok());
    }
}
