use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::modules::auth::password::DEFAULT_ITERATIONS;
use crate::modules::email::ActivationSettings;
use crate::{DEFAULT_ACTIVATION_BASE_URL, DEFAULT_APP_NAME, DEFAULT_DATA_FILE, DEFAULT_LOG_FILE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How activation emails leave the process
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// SMTP relay with credentials from the OS keyring
    Smtp,
    /// Write emails to the log only
    #[default]
    Log,
}

/// Application settings read from a JSON file. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub log_file: PathBuf,
    pub app_name: String,
    pub activation_base_url: String,
    pub mail_transport: MailTransport,
    pub hash_iterations: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            app_name: DEFAULT_APP_NAME.to_string(),
            activation_base_url: DEFAULT_ACTIVATION_BASE_URL.to_string(),
            mail_transport: MailTransport::default(),
            hash_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn activation_settings(&self) -> ActivationSettings {
        ActivationSettings {
            app_name: self.app_name.clone(),
            activation_base_url: self.activation_base_url.clone(),
        }
    }
}
