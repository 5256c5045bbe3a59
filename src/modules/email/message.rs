use serde::{Deserialize, Serialize};

/// A plain-text email handed to a [`super::NotificationSender`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NotificationEmail {
    pub subject: String,
    pub recipient: String,
    pub body: String,
}

impl NotificationEmail {
    pub fn new(subject: &str, recipient: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
        }
    }
}
