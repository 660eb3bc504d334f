//! Write side: record mutations.
//!
//! # Responsibility
//! - Translate create/delete/rename use-cases into document writes.
//! - Keep UI/FFI layers decoupled from storage paths and wire shapes.

pub mod calculation_service;
