//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the calculator page to Dart via FRB as one opaque app handle.
//! - Flatten the view model into plain DTOs the UI can draw directly.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Actions apply queued snapshots before returning, so the next `view`
//!   call already reflects accepted writes.

use flutter_rust_bridge::frb;
use log::{error, info};
use podstate_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    render_text, ActionOutcome, AppCredentials, CalculationId, CalculatorController,
    ClientConfig, ClientContext, FailureEvent, ItemMode, ViewModel,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// One list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationItem {
    pub id: String,
    pub name: String,
    /// `"<num1> + <num2> = <result>"`.
    pub equation: String,
    pub editing: bool,
    /// Name draft while `editing`.
    pub draft_name: Option<String>,
}

/// Everything the page draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppView {
    pub subject_id: Option<String>,
    /// Subject line or the authenticating indicator.
    pub header: String,
    pub form_name: String,
    pub form_num1: String,
    pub form_num2: String,
    /// `loading|authenticating|empty|ready`.
    pub status: String,
    /// Text shown above the list; `None` once records are shown.
    pub status_message: Option<String>,
    pub items: Vec<CalculationItem>,
}

/// Outcome envelope for user actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppActionResponse {
    /// Whether the write was accepted.
    pub ok: bool,
    /// Human-readable response message for diagnostics.
    pub message: String,
}

impl AppActionResponse {
    fn from_outcome(action: &str, outcome: ActionOutcome, failure: Option<FailureEvent>) -> Self {
        match outcome {
            ActionOutcome::Applied => Self {
                ok: true,
                message: format!("{action} accepted."),
            },
            ActionOutcome::Skipped => Self {
                ok: false,
                message: format!("{action} skipped."),
            },
            ActionOutcome::Failed => Self {
                ok: false,
                message: match failure {
                    Some(event) => format!("{action} failed: {}", event.message),
                    None => format!("{action} failed."),
                },
            },
        }
    }
}

/// Opaque calculator page handle owned by the Dart side.
#[frb(opaque)]
pub struct PodStateApp {
    controller: Mutex<CalculatorController>,
    last_failure: Arc<Mutex<Option<FailureEvent>>>,
}

/// Opens the local store and identity provider and builds an unmounted page.
///
/// Input semantics:
/// - `credentials_json`: credentials object; blank means defaults.
/// - `db_path`: database file; blank means in-memory.
/// - `initial_auth_token`: pre-issued token; `None` falls back to
///   `PODSTATE_INITIAL_AUTH_TOKEN`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics; invalid config or storage failure is returned as error.
#[frb(sync)]
pub fn app_open(
    credentials_json: String,
    db_path: String,
    initial_auth_token: Option<String>,
) -> Result<PodStateApp, String> {
    let config = if credentials_json.trim().is_empty() {
        ClientConfig::new(AppCredentials::default())
    } else {
        ClientConfig::from_credentials_json(&credentials_json).map_err(open_failed)?
    };
    let config = match initial_auth_token {
        Some(token) => config.with_initial_auth_token(Some(token)),
        None => config.with_env_token(),
    };
    let config = match db_path.trim() {
        "" => config,
        path => config.with_store_path(path),
    };

    let client = ClientContext::open(config).map_err(open_failed)?;
    let last_failure = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last_failure);
    client.add_failure_observer(Arc::new(move |event: &FailureEvent| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(event.clone());
        }
    }));

    info!("event=app_open module=ffi status=ok");
    Ok(PodStateApp {
        controller: Mutex::new(CalculatorController::new(&client)),
        last_failure,
    })
}

fn open_failed(err: impl std::fmt::Display) -> String {
    error!("event=app_open module=ffi status=error error={err}");
    format!("app_open failed: {err}")
}

impl PodStateApp {
    /// Signs in and starts the record subscription.
    #[frb(sync)]
    pub fn mount(&self) {
        self.controller().mount();
    }

    /// Releases both subscriptions.
    #[frb(sync)]
    pub fn unmount(&self) {
        self.controller().unmount();
    }

    /// Applies queued snapshot and identity events; returns how many.
    #[frb(sync)]
    pub fn pump(&self) -> u32 {
        u32::try_from(self.controller().pump()).unwrap_or(u32::MAX)
    }

    #[frb(sync)]
    pub fn set_name(&self, name: String) {
        self.controller().set_name(name);
    }

    #[frb(sync)]
    pub fn set_num1(&self, value: String) {
        self.controller().set_num1(value);
    }

    #[frb(sync)]
    pub fn set_num2(&self, value: String) {
        self.controller().set_num2(value);
    }

    #[frb(sync)]
    pub fn submit(&self) -> AppActionResponse {
        self.act("create", |controller| controller.submit())
    }

    #[frb(sync)]
    pub fn delete(&self, id: String) -> AppActionResponse {
        let id = CalculationId::new(id);
        self.act("delete", |controller| controller.delete(&id))
    }

    #[frb(sync)]
    pub fn start_edit(&self, id: String) -> AppActionResponse {
        let id = CalculationId::new(id);
        self.act("edit", |controller| controller.start_edit(&id))
    }

    #[frb(sync)]
    pub fn set_edit_name(&self, name: String) {
        self.controller().set_edit_name(name);
    }

    #[frb(sync)]
    pub fn cancel_edit(&self) {
        self.controller().cancel_edit();
    }

    #[frb(sync)]
    pub fn save_edit(&self) -> AppActionResponse {
        self.act("rename", |controller| controller.save_edit())
    }

    /// Current page state as plain DTOs.
    #[frb(sync)]
    pub fn view(&self) -> AppView {
        to_app_view(self.controller().view_model())
    }

    /// Current page as plain text, for diagnostics.
    #[frb(sync)]
    pub fn render_text(&self) -> String {
        render_text(&self.controller().view_model())
    }

    fn controller(&self) -> MutexGuard<'_, CalculatorController> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn act(
        &self,
        action: &str,
        run: impl FnOnce(&mut CalculatorController) -> ActionOutcome,
    ) -> AppActionResponse {
        let mut controller = self.controller();
        self.take_failure();
        let outcome = run(&mut controller);
        controller.pump();
        AppActionResponse::from_outcome(action, outcome, self.take_failure())
    }

    fn take_failure(&self) -> Option<FailureEvent> {
        self.last_failure
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }
}

fn to_app_view(view: ViewModel) -> AppView {
    let header = view.header();
    let status_message = view.status_line().map(str::to_string);
    let items = view
        .items
        .into_iter()
        .map(|item| {
            let draft_name = match item.mode {
                ItemMode::Editing { draft } => Some(draft),
                ItemMode::Viewing => None,
            };
            CalculationItem {
                id: item.id.to_string(),
                name: item.name,
                equation: item.equation,
                editing: draft_name.is_some(),
                draft_name,
            }
        })
        .collect();

    AppView {
        subject_id: view.subject.map(|subject| subject.to_string()),
        header,
        form_name: view.form.name,
        form_num1: view.form.num1.to_string(),
        form_num2: view.form.num2.to_string(),
        status: view.status.as_str().to_string(),
        status_message,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::{app_open, core_version, init_logging, ping, PodStateApp};

    fn mounted_app(db_path: &str) -> PodStateApp {
        let app = app_open(String::new(), db_path.to_string(), None).expect("open app");
        app.mount();
        app
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn app_open_rejects_malformed_credentials() {
        let result = app_open("{".to_string(), String::new(), None);
        assert!(result.is_err());
    }

    #[test]
    fn submit_then_rename_then_delete_round_trips_through_view() {
        let app = mounted_app("");
        let view = app.view();
        assert!(view.subject_id.is_some());
        assert_eq!(view.status, "empty");

        app.set_name("Sum A".to_string());
        app.set_num1("2".to_string());
        app.set_num2("3".to_string());
        let created = app.submit();
        assert!(created.ok, "{}", created.message);

        let view = app.view();
        assert_eq!(view.form_name, "");
        assert_eq!(view.form_num1, "0");
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].equation, "2 + 3 = 5");
        let id = view.items[0].id.clone();

        assert!(app.start_edit(id.clone()).ok);
        app.set_edit_name("Sum B".to_string());
        assert_eq!(app.view().items[0].draft_name.as_deref(), Some("Sum B"));
        let renamed = app.save_edit();
        assert!(renamed.ok, "{}", renamed.message);

        let view = app.view();
        assert_eq!(view.items[0].name, "Sum B");
        assert!(!view.items[0].editing);
        assert_eq!(view.items[0].equation, "2 + 3 = 5");

        assert!(app.delete(id).ok);
        assert_eq!(app.view().status, "empty");
    }

    #[test]
    fn submit_without_name_is_skipped() {
        let app = mounted_app("");
        let response = app.submit();
        assert!(!response.ok);
        assert!(response.message.contains("skipped"));
    }

    #[test]
    fn reopening_the_same_database_restores_records() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("podstate.sqlite3");
        let db_path = db_path.to_string_lossy().to_string();

        let first = mounted_app(&db_path);
        first.set_name("kept".to_string());
        assert!(first.submit().ok);
        let subject = first.view().subject_id;
        drop(first);

        let second = mounted_app(&db_path);
        let view = second.view();
        assert_eq!(view.subject_id, subject);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].name, "kept");
    }
}
