use podstate_core::auth::AuthListener;
use podstate_core::{
    AppCredentials, CalculatorController, ClientConfig, ClientContext, FailureEvent,
    FailureKind, IdentityProvider, ListStatus, LocalIdentityProvider, SignInMethod,
    SqliteDocumentStore, SubjectId,
};
use std::sync::{Arc, Mutex};

fn config() -> ClientConfig {
    ClientConfig::new(AppCredentials::default())
}

#[test]
fn restarted_process_keeps_subject_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("podstate.sqlite3");

    let first_subject = {
        let client = ClientContext::open(config().with_store_path(&path)).unwrap();
        let mut controller = CalculatorController::new(&client);
        controller.mount();
        controller.set_name("survives restart");
        controller.submit();
        controller.pump();
        assert_eq!(controller.records().len(), 1);
        controller.subject().cloned().unwrap()
    };

    let client = ClientContext::open(config().with_store_path(&path)).unwrap();
    let mut controller = CalculatorController::new(&client);
    controller.mount();

    assert_eq!(controller.subject(), Some(&first_subject));
    assert_eq!(controller.records().len(), 1);
    assert_eq!(controller.records()[0].name, "survives restart");
}

#[test]
fn sign_out_then_anonymous_sign_in_creates_a_new_subject() {
    let provider = LocalIdentityProvider::open_in_memory().unwrap();
    let first = provider.sign_in_anonymously().unwrap();
    assert_eq!(provider.sign_in_anonymously().unwrap(), first);

    provider.sign_out().unwrap();
    assert!(provider.current_session().unwrap().is_none());
    let second = provider.sign_in_anonymously().unwrap();
    assert_ne!(second.subject_id, first.subject_id);
}

#[test]
fn injected_token_signs_in_as_its_subject() {
    let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let provider = Arc::new(LocalIdentityProvider::open_in_memory().unwrap());
    let subject = SubjectId::new("pre-issued");
    let token = provider.mint_custom_token(&subject).unwrap();

    let client = ClientContext::with_backends(
        config().with_initial_auth_token(Some(token)),
        store,
        provider.clone(),
    )
    .unwrap();
    let identity = client.identity();
    assert_eq!(identity.start(), Some(subject.clone()));
    assert_eq!(
        identity.session().map(|session| session.method),
        Some(SignInMethod::CustomToken)
    );
    assert_eq!(
        provider.current_session().unwrap().map(|s| s.subject_id),
        Some(subject)
    );
}

#[test]
fn rejected_token_leaves_view_authenticating_and_reports_failure() {
    let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let provider = Arc::new(LocalIdentityProvider::open_in_memory().unwrap());
    let client = ClientContext::with_backends(
        config().with_initial_auth_token(Some("unknown-token".to_string())),
        store,
        provider,
    )
    .unwrap();

    let failures = Arc::new(Mutex::new(Vec::<FailureEvent>::new()));
    let sink = Arc::clone(&failures);
    client.add_failure_observer(Arc::new(move |event: &FailureEvent| {
        sink.lock().unwrap().push(event.clone());
    }));

    let mut controller = CalculatorController::new(&client);
    controller.mount();

    assert!(controller.subject().is_none());
    assert!(!controller.is_loading());
    assert_eq!(controller.list_status(), ListStatus::Authenticating);
    assert!(controller.view_model().header().contains("Authenticating"));

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::Authentication);
    assert!(!failures[0].message.contains("unknown-token"));
}

#[test]
fn session_observers_follow_sign_out() {
    let client = ClientContext::open(config()).unwrap();
    let identity = client.identity();
    let seen = Arc::new(Mutex::new(Vec::<Option<SubjectId>>::new()));
    let sink = Arc::clone(&seen);
    let listener: AuthListener = Arc::new(move |subject: Option<SubjectId>| {
        sink.lock().unwrap().push(subject);
    });
    let _subscription = identity.on_auth_state_changed(listener);

    let subject = identity.start().unwrap();
    identity.sign_out();

    assert_eq!(*seen.lock().unwrap(), vec![None, Some(subject), None]);
}

#[test]
fn controller_returns_to_authenticating_after_sign_out() {
    let client = ClientContext::open(config()).unwrap();
    let mut controller = CalculatorController::new(&client);
    controller.mount();
    controller.set_name("gone from view");
    controller.submit();
    controller.pump();
    assert_eq!(controller.list_status(), ListStatus::Ready);

    client.identity().sign_out();
    controller.pump();

    assert!(controller.subject().is_none());
    assert!(controller.records().is_empty());
    assert_eq!(controller.list_status(), ListStatus::Authenticating);
}
