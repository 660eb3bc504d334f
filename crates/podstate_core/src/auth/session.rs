//! Observable sign-in state.
//!
//! # Invariants
//! - Observers get the current subject on registration, then once per
//!   transition (absent -> present, present -> absent, or subject change).
//! - Sign-in failure is reported as an authentication failure and leaves the
//!   subject absent.

use super::IdentityProvider;
use crate::events::{FailureKind, FailureReporter};
use crate::model::subject::{Session, SubjectId};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Receives the current subject, or `None` when signed out.
pub type AuthListener = Arc<dyn Fn(Option<SubjectId>) + Send + Sync>;

pub struct IdentitySession {
    provider: Arc<dyn IdentityProvider>,
    initial_token: Option<String>,
    failures: Arc<FailureReporter>,
    state: Arc<Mutex<SessionState>>,
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    next_listener_id: u64,
    listeners: BTreeMap<u64, (AuthListener, Arc<AtomicBool>)>,
}

/// Keeps an auth observer attached; detaches on `unsubscribe` or drop.
pub struct AuthSubscription {
    id: u64,
    active: Arc<AtomicBool>,
    state: Weak<Mutex<SessionState>>,
}

impl IdentitySession {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        initial_token: Option<String>,
        failures: Arc<FailureReporter>,
    ) -> Self {
        Self {
            provider,
            initial_token,
            failures,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Signs in with the injected token when one was supplied, otherwise
    /// anonymously. Returns the resulting subject.
    pub fn start(&self) -> Option<SubjectId> {
        let (method, outcome) = match self.initial_token.as_deref() {
            Some(token) => ("custom_token", self.provider.sign_in_with_custom_token(token)),
            None => ("anonymous", self.provider.sign_in_anonymously()),
        };

        match outcome {
            Ok(session) => {
                let subject = session.subject_id.clone();
                self.transition(Some(session));
                Some(subject)
            }
            Err(err) => {
                self.failures.report(
                    FailureKind::Authentication,
                    "sign_in",
                    format!("{method} sign-in failed: {err}"),
                );
                None
            }
        }
    }

    /// Clears the session on this device and notifies observers.
    pub fn sign_out(&self) {
        if let Err(err) = self.provider.sign_out() {
            warn!("event=sign_out module=auth status=error error={err}");
        }
        self.transition(None);
    }

    pub fn subject_id(&self) -> Option<SubjectId> {
        self.session().map(|session| session.subject_id)
    }

    pub fn session(&self) -> Option<Session> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.current.clone())
    }

    /// Attaches `listener` and immediately delivers the current subject.
    pub fn on_auth_state_changed(&self, listener: AuthListener) -> AuthSubscription {
        let active = Arc::new(AtomicBool::new(true));
        let (id, current) = match self.state.lock() {
            Ok(mut state) => {
                let id = state.next_listener_id;
                state.next_listener_id += 1;
                state
                    .listeners
                    .insert(id, (Arc::clone(&listener), Arc::clone(&active)));
                (id, state.current.as_ref().map(|s| s.subject_id.clone()))
            }
            Err(_) => {
                warn!("event=auth_listen module=auth status=error error=state_poisoned");
                active.store(false, Ordering::SeqCst);
                (u64::MAX, None)
            }
        };

        listener(current);
        AuthSubscription {
            id,
            active,
            state: Arc::downgrade(&self.state),
        }
    }

    fn transition(&self, next: Option<Session>) {
        let (subject, listeners) = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let unchanged = state.current.as_ref().map(|s| &s.subject_id)
                == next.as_ref().map(|s| &s.subject_id);
            state.current = next;
            if unchanged {
                return;
            }
            let listeners = state
                .listeners
                .values()
                .map(|(listener, active)| (Arc::clone(listener), Arc::clone(active)))
                .collect::<Vec<_>>();
            (
                state.current.as_ref().map(|s| s.subject_id.clone()),
                listeners,
            )
        };

        info!(
            "event=auth_state module=auth status=ok signed_in={} observers={}",
            subject.is_some(),
            listeners.len()
        );
        for (listener, active) in listeners {
            if active.load(Ordering::SeqCst) {
                listener(subject.clone());
            }
        }
    }
}

impl AuthSubscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            if let Ok(mut state) = state.lock() {
                state.listeners.remove(&self.id);
            }
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthListener, IdentitySession};
    use crate::auth::LocalIdentityProvider;
    use crate::events::FailureReporter;
    use crate::model::subject::SubjectId;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Option<SubjectId>>>>;

    fn recorder() -> (Seen, AuthListener) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: AuthListener = Arc::new(move |subject: Option<SubjectId>| {
            sink.lock().unwrap().push(subject);
        });
        (seen, listener)
    }

    fn session() -> IdentitySession {
        IdentitySession::new(
            Arc::new(LocalIdentityProvider::open_in_memory().unwrap()),
            None,
            Arc::new(FailureReporter::new()),
        )
    }

    #[test]
    fn observer_sees_absent_then_signed_in_subject() {
        let session = session();
        let (seen, listener) = recorder();
        let _subscription = session.on_auth_state_changed(listener);

        let subject = session.start().expect("anonymous sign-in succeeds");

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(subject.clone())]);
        assert_eq!(session.subject_id(), Some(subject));
    }

    #[test]
    fn repeated_start_with_same_subject_does_not_renotify() {
        let session = session();
        let (seen, listener) = recorder();
        let _subscription = session.on_auth_state_changed(listener);

        session.start();
        session.start();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn sign_out_notifies_absent_and_unsubscribed_observer_is_silent() {
        let session = session();
        let (seen, listener) = recorder();
        let subscription = session.on_auth_state_changed(listener);
        session.start();
        session.sign_out();
        assert_eq!(seen.lock().unwrap().last(), Some(&None));

        subscription.unsubscribe();
        session.start();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}
