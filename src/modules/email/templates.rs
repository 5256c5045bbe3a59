use super::message::NotificationEmail;
use crate::{DEFAULT_ACTIVATION_BASE_URL, DEFAULT_APP_NAME};

const ACTIVATION_SUBJECT: &str = "Please Activate Your Account";

/// What the activation email needs to know about the deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSettings {
    pub app_name: String,
    pub activation_base_url: String,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            activation_base_url: DEFAULT_ACTIVATION_BASE_URL.to_string(),
        }
    }
}

/// URL the user follows to verify their account
pub fn activation_link(base_url: &str, token: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), token)
}

/// Build the activation email sent right after signup
pub fn activation_email(
    settings: &ActivationSettings,
    recipient: &str,
    token: &str,
) -> NotificationEmail {
    let body = format!(
        "Thank you for signing up for {}. Please click on the below \
        url to activate your account: {}",
        settings.app_name,
        activation_link(&settings.activation_base_url, token)
    );

    NotificationEmail::new(ACTIVATION_SUBJECT, recipient, &body)
}
