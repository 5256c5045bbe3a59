use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use std::time::Duration;
use thiserror::Error;

use super::manager::SecureEmailManager;
use super::message::NotificationEmail;
use super::smtp::SmtpCredentials;

/// Failures while building or delivering an email
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send email: {0}")]
    Transport(String),
    #[error("{0}")]
    Credentials(String),
}

/// Delivers formatted notification emails
pub trait NotificationSender {
    fn send(&self, email: &NotificationEmail) -> Result<(), MailError>;
}

impl<T: NotificationSender + ?Sized> NotificationSender for Box<T> {
    fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
        (**self).send(email)
    }
}

/// Sends mail through an authenticated, TLS-required SMTP relay
pub struct SmtpNotificationSender {
    mailer: SmtpTransport,
    from: String,
}

impl SmtpNotificationSender {
    pub fn new(creds: SmtpCredentials, sender_name: &str) -> Result<Self, MailError> {
        let tls_parameters = TlsParameters::builder(creds.host.clone())
            .build()
            .map_err(|e| MailError::Transport(format!("Failed to build TLS parameters: {}", e)))?;

        let mailer = SmtpTransport::relay(&creds.host)
            .map_err(|e| MailError::Transport(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(creds.username.clone(), creds.password))
            .port(creds.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self {
            mailer,
            from: format!("{} <{}>", sender_name, creds.username),
        })
    }

    /// Build a sender from the credentials stored by [`SecureEmailManager`]
    pub fn from_keyring(sender_name: &str) -> Result<Self, MailError> {
        let creds = SecureEmailManager::new()?.get_credentials()?;
        Self::new(creds, sender_name)
    }
}

impl NotificationSender for SmtpNotificationSender {
    fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
        let message = build_message(&self.from, email)?;
        self.mailer
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!("Email sent successfully: subject={:?}", email.subject);
        Ok(())
    }
}

fn build_message(from: &str, email: &NotificationEmail) -> Result<Message, MailError> {
    let from: Mailbox = from.parse().map_err(|e| MailError::InvalidAddress {
        address: from.to_string(),
        reason: format!("{}", e),
    })?;
    let to: Mailbox = email
        .recipient
        .parse()
        .map_err(|e| MailError::InvalidAddress {
            address: email.recipient.clone(),
            reason: format!("{}", e),
        })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

/// Writes emails to the log instead of delivering them. Used for local
/// development where no SMTP relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, email: &NotificationEmail) -> Result<(), MailError> {
        info!(
            "Outgoing email: to={}, subject={:?}, body={:?}",
            email.recipient, email.subject, email.body
        );
        Ok(())
    }
}
