//! Failure reporting.
//!
//! Every failure is caught where it happens, logged, and otherwise swallowed.
//! Front ends that want to surface failures register a `FailureObserver`.

use log::{error, warn};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Sign-in rejected.
    Authentication,
    /// Permission or transport error on a live query.
    Subscription,
    /// Create, delete or rename rejected.
    Write,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication_failure",
            Self::Subscription => "subscription_failure",
            Self::Write => "write_failure",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    pub kind: FailureKind,
    /// Operation name, e.g. `create_calculation`.
    pub operation: &'static str,
    pub message: String,
}

pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, event: &FailureEvent);
}

impl<F> FailureObserver for F
where
    F: Fn(&FailureEvent) + Send + Sync,
{
    fn on_failure(&self, event: &FailureEvent) {
        self(event)
    }
}

/// Shared fan-out point for failure events.
#[derive(Default)]
pub struct FailureReporter {
    observers: RwLock<Vec<Arc<dyn FailureObserver>>>,
}

impl FailureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn FailureObserver>) {
        match self.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(_) => warn!("event=failure_observer_add module=events status=error"),
        }
    }

    /// Logs the failure and forwards it to every observer.
    pub fn report(&self, kind: FailureKind, operation: &'static str, message: impl Into<String>) {
        let event = FailureEvent {
            kind,
            operation,
            message: message.into(),
        };
        error!(
            "event={} module=events status=error kind={} error={}",
            event.operation, event.kind, event.message
        );

        let observers = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(_) => return,
        };
        for observer in observers {
            observer.on_failure(&event);
        }
    }
}
