use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::password::{validate_password, PasswordError};
use crate::modules::utils::io::is_valid_email;

/// Signup input as received by the inbound layer
#[derive(Serialize, Deserialize, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

// Keep the password out of debug output
impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Rejections raised before a request reaches the account service
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("username must not contain whitespace")]
    UsernameWhitespace,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error(transparent)]
    WeakPassword(#[from] PasswordError),
}

impl RegisterRequest {
    pub fn new(username: &str, password: &str, email: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            email: email.to_string(),
        }
    }

    /// Inbound validation. The account service itself trusts its input.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if self.username.chars().any(char::is_whitespace) {
            return Err(ValidationError::UsernameWhitespace);
        }
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        validate_password(&self.password)?;
        Ok(())
    }
}
