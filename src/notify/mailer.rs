//! Outgoing mail.
//!
//! Everything that sends mail goes through the [`Mailer`] trait so the
//! transport can be swapped: [`SmtpMailer`] in production, [`ConsoleMailer`]
//! when no SMTP host is configured.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpSettings;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailBody {
    Text(String),
    Html(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: EmailBody,
    pub attachment: Option<EmailAttachment>,
}

impl Email {
    pub fn text(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Email {
            to: to.into(),
            subject: subject.into(),
            body: EmailBody::Text(body.into()),
            attachment: None,
        }
    }

    pub fn html(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Email {
            to: to.into(),
            subject: subject.into(),
            body: EmailBody::Html(body.into()),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: EmailAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// SMTP delivery through lettre.
///
/// The blocking transport runs on the blocking pool so a slow relay never
/// stalls the async workers.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let builder = if settings.tls {
            SmtpTransport::starttls_relay(&settings.host)
                .map_err(|e| MailError::Transport(format!("SMTP relay error: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&settings.host)
        };
        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone());

        let body = match &email.body {
            EmailBody::Text(text) => SinglePart::plain(text.clone()),
            EmailBody::Html(html) => SinglePart::html(html.clone()),
        };

        let message = match &email.attachment {
            None => builder.singlepart(body),
            Some(attachment) => {
                let content_type =
                    ContentType::parse(&attachment.content_type).map_err(|e| MailError::Build(e.to_string()))?;
                let part = Attachment::new(attachment.file_name.clone()).body(attachment.content.clone(), content_type);
                builder.multipart(MultiPart::mixed().singlepart(body).singlepart(part))
            }
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address(format!("{}: {}", address, e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = self.build_message(&email)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::Transport(format!("mail task failed: {}", e)))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Logs mail instead of delivering it. Used when `SMTP_HOST` is unset.
#[derive(Clone, Debug, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let (kind, body) = match &email.body {
            EmailBody::Text(text) => ("text", text.as_str()),
            EmailBody::Html(html) => ("html", html.as_str()),
        };
        info!(
            to = %email.to,
            subject = %email.subject,
            kind,
            attachment = email.attachment.as_ref().map(|a| a.file_name.as_str()).unwrap_or("-"),
            "Email (console mode)"
        );
        info!("{}", body);
        Ok(())
    }
}
