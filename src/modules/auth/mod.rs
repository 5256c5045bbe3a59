pub mod error;
pub mod password;
pub mod request;
pub mod service;
pub mod store;
pub mod tokens;

// Re-export the main types and functions
pub use error::AuthError;
pub use password::{validate_password, CredentialHasher, PasswordError, Pbkdf2Hasher};
pub use request::{RegisterRequest, ValidationError};
pub use service::{AccountService, DispatchReport};
pub use store::{
    Datastore, OutboxEntry, OutboxId, OutboxStore, StoreError, Transaction, User, UserStore,
    VerificationStatus, VerificationToken, VerificationTokenStore,
};
pub use tokens::generate_verification_token;
