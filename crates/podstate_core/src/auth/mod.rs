//! Identity provider seam and the observable sign-in session.
//!
//! # Responsibility
//! - Define how credentials are obtained (`IdentityProvider`).
//! - Track the current subject and notify observers of transitions
//!   (`IdentitySession`).
//!
//! # Invariants
//! - Sign-in failure leaves the subject absent; nothing retries.

use crate::db::DbError;
use crate::model::subject::Session;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod local;
mod session;

pub use local::LocalIdentityProvider;
pub use session::{AuthListener, AuthSubscription, IdentitySession};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug)]
pub enum AuthError {
    Db(DbError),
    /// The presented custom token is unknown or empty.
    InvalidToken,
    InvalidData(String),
    Unavailable(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidToken => write!(f, "custom token rejected"),
            Self::InvalidData(message) => write!(f, "invalid identity data: {message}"),
            Self::Unavailable(message) => write!(f, "identity provider unavailable: {message}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for AuthError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Issues credentials and remembers the device's signed-in identity.
pub trait IdentityProvider: Send + Sync {
    /// Signs in anonymously. Reuses the device's persisted anonymous session
    /// when present; otherwise creates a new identity.
    fn sign_in_anonymously(&self) -> AuthResult<Session>;

    /// Signs in with a pre-issued token.
    fn sign_in_with_custom_token(&self, token: &str) -> AuthResult<Session>;

    /// Session persisted on this device, if any.
    fn current_session(&self) -> AuthResult<Option<Session>>;

    /// Forgets the persisted session.
    fn sign_out(&self) -> AuthResult<()>;
}
