//! Outgoing account mail: verification and password reset links.

use crate::config::SmtpConfig;
use crate::lang::{Locale, trans};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailKind {
    VerifyEmail,
    ResetPassword,
}

/// A rendered plain-text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub kind: MailKind,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The link the recipient is asked to open.
    pub url: String,
}

impl OutgoingMail {
    pub fn verify_email(locale: &Locale, to: &str, url: &str) -> Self {
        Self::render(MailKind::VerifyEmail, "mail.verify", locale, to, url)
    }

    pub fn reset_password(locale: &Locale, to: &str, url: &str) -> Self {
        Self::render(MailKind::ResetPassword, "mail.reset", locale, to, url)
    }

    fn render(kind: MailKind, prefix: &str, locale: &Locale, to: &str, url: &str) -> Self {
        Self {
            kind,
            to: to.to_string(),
            subject: trans(locale, &format!("{prefix}.subject"), &[]),
            body: trans(locale, &format!("{prefix}.body"), &[("url", url)]),
            url: url.to_string(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            from: config.from.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = lettre::Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)?;

        self.transport.send(message).await?;
        tracing::info!(to = %mail.to, kind = ?mail.kind, "mail sent");
        Ok(())
    }
}
