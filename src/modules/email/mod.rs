pub mod manager;
mod message;
mod sender;
mod smtp;
mod templates;

pub use manager::SecureEmailManager;
pub use message::NotificationEmail;
pub use sender::{LogNotificationSender, MailError, NotificationSender, SmtpNotificationSender};
pub use smtp::SmtpCredentials;
pub use templates::{activation_email, activation_link, ActivationSettings};
