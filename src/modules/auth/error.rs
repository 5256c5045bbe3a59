use thiserror::Error;

use super::store::StoreError;

/// Errors surfaced to callers of the account service.
///
/// Signup failures are deliberately opaque: the message never says whether
/// the username was taken or the datastore was down. The cause is kept as
/// the error source so it can be logged.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Registration failed")]
    Registration {
        #[source]
        source: StoreError,
    },
    #[error("Invalid verification token")]
    InvalidToken,
    #[error("User not found with name {username}")]
    UserNotFound { username: String },
    #[error("account storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    pub fn registration(source: StoreError) -> Self {
        AuthError::Registration { source }
    }
}
