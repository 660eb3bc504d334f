//! Domain model for calculation records and identities.
//!
//! # Invariants
//! - Every record belongs to exactly one subject's partition.
//! - Identifiers are opaque strings assigned by the store or identity provider.

pub mod calculation;
pub mod subject;
