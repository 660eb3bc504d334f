//! The single SQLite file behind PodState: calculation documents and the
//! device identity live side by side in it.
//!
//! # Responsibility
//! - Hand out connections that are already migrated to the current schema.
//!
//! # Invariants
//! - `PRAGMA user_version` equals the last applied migration.
//! - A file written by a newer build is refused, never downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or migrating the PodState database.
#[derive(Debug)]
pub enum DbError {
    /// Connection setup or pragma failure.
    Sqlite(rusqlite::Error),
    /// Migration `version` was rolled back together with the rest of its batch.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// The file's `user_version` is ahead of this build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::Migration { version, source } => {
                write!(f, "schema migration to v{version} rolled back: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "podstate database is at schema v{db_version}; this build reads up to v{latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
