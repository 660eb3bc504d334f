//! Read side: live per-subject record subscriptions.
//!
//! # Responsibility
//! - Map store snapshots of a subject's partition to `CalculationRecord`s.
//! - Own re-subscription when the subject changes.
//!
//! # Invariants
//! - Reads are confined to one subject's partition; there is no
//!   cross-partition query.
//! - A closed subscription delivers nothing further.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod calculation_repo;
pub mod subscription;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Store(StoreError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
