use chrono::Utc;
use keyring::Entry;

use super::sender::MailError;
use super::smtp::SmtpCredentials;

const KEYRING_SERVICE: &str = "reddit-accounts-email";
const KEYRING_USER: &str = "smtp-credentials";

/// Structure to manage SMTP credentials kept in the OS keyring
pub struct SecureEmailManager {
    keyring: Entry,
}

impl SecureEmailManager {
    pub fn new() -> Result<Self, MailError> {
        let keyring = Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| MailError::Credentials(format!("Failed to open keyring entry: {}", e)))?;
        Ok(Self { keyring })
    }

    // Store new SMTP credentials in the system keyring
    pub fn store_credentials(
        &self,
        username: &str,
        password: &str,
        host: &str,
        port: u16,
    ) -> Result<(), MailError> {
        let credentials = SmtpCredentials {
            username: username.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
            last_updated: Utc::now(),
        };

        let creds_json = serde_json::to_string(&credentials).map_err(|e| {
            MailError::Credentials(format!("Failed to serialize credentials: {}", e))
        })?;

        self.keyring
            .set_password(&creds_json)
            .map_err(|e| MailError::Credentials(format!("Failed to store credentials: {}", e)))
    }

    // Retrieve stored SMTP credentials from the system keyring
    pub fn get_credentials(&self) -> Result<SmtpCredentials, MailError> {
        let creds_json = self.keyring.get_password().map_err(|e| {
            MailError::Credentials(format!("Failed to retrieve credentials: {}", e))
        })?;

        parse_credentials(&creds_json)
    }
}

fn parse_credentials(creds_json: &str) -> Result<SmtpCredentials, MailError> {
    serde_json::from_str(creds_json)
        .map_err(|e| MailError::Credentials(format!("Failed to parse credentials: {}", e)))
}
