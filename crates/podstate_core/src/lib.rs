//! Core logic for PodState.
//! Identity, per-subject calculation records and the calculator view state
//! all live here; front ends only forward input and draw the view model.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;
pub mod view;

pub use auth::{AuthError, IdentityProvider, IdentitySession, LocalIdentityProvider};
pub use client::{ClientContext, ClientError, ClientResult};
pub use config::{AppCredentials, ClientConfig, ConfigError, INITIAL_AUTH_TOKEN_ENV};
pub use events::{FailureEvent, FailureKind, FailureObserver, FailureReporter};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::calculation::{
    format_number, CalculationId, CalculationRecord, NewCalculation, Operand,
};
pub use model::subject::{Session, SignInMethod, SubjectId};
pub use repo::calculation_repo::{CalculationFeed, FeedEvent, RecordSubscription};
pub use repo::subscription::{SlotChange, SubscriptionSlot};
pub use repo::{RepoError, RepoResult};
pub use service::calculation_service::{CalculationService, MutationError, MutationResult};
pub use store::{DocumentStore, SqliteDocumentStore, StoreError, WriteMode};
pub use view::{
    render_text, ActionOutcome, CalculatorController, EditState, ItemMode, ItemView,
    ListStatus, ViewModel,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
