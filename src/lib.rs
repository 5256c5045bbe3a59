// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, email, storage, utils};

// Re-export commonly used types
pub use modules::auth::{AccountService, AuthError, RegisterRequest};
pub use modules::config::AppConfig;
pub use modules::email::{NotificationEmail, NotificationSender};
pub use modules::storage::JsonDatastore;

// Constants
pub const DEFAULT_DATA_FILE: &str = "accounts.json";
pub const DEFAULT_LOG_FILE: &str = "application.log";
pub const DEFAULT_CONFIG_FILE: &str = "reddit-accounts.json";
pub const DEFAULT_APP_NAME: &str = "Spring Reddit";
pub const DEFAULT_ACTIVATION_BASE_URL: &str = "http://localhost:8080/api/auth/accountVerification";

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
