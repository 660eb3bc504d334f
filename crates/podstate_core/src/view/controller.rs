//! Calculator view controller.
//!
//! # Responsibility
//! - Own the transient UI state: form inputs, edit state, loading flag and
//!   the latest record snapshot.
//! - Keep exactly one record subscription scoped to the current subject.
//! - Dispatch user actions to the record mutator.
//!
//! # Invariants
//! - Store and identity callbacks never touch controller state; they enqueue
//!   [`UiEvent`]s that [`CalculatorController::pump`] applies in order.
//! - Snapshots from a closed or superseded subscription are dropped.
//! - At most one record is in edit mode.

use crate::auth::{AuthListener, AuthSubscription, IdentitySession};
use crate::client::ClientContext;
use crate::model::calculation::{CalculationId, CalculationRecord, NewCalculation, Operand};
use crate::model::subject::SubjectId;
use crate::repo::calculation_repo::{FeedEvent, FeedSink};
use crate::repo::subscription::{SlotChange, SubscriptionSlot};
use crate::service::calculation_service::CalculationService;
use crate::view::render::{ItemMode, ItemView, ListStatus, ViewModel};
use log::{debug, info};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// State change delivered from a callback to the UI context.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    AuthChanged(Option<SubjectId>),
    Snapshot {
        generation: u64,
        records: Vec<CalculationRecord>,
    },
    SnapshotFailed {
        generation: u64,
    },
}

/// Creation form inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub name: String,
    pub num1: Operand,
    pub num2: Operand,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            name: String::new(),
            num1: Operand::default(),
            num2: Operand::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Viewing,
    Editing { id: CalculationId, draft: String },
}

/// Result of a user action as seen by the caller.
///
/// `Applied` only means the write was accepted; the visible effect arrives
/// with a later snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Gated out (no subject, empty name, nothing in edit).
    Skipped,
    /// The write failed and was reported; local state is unchanged.
    Failed,
}

pub struct CalculatorController {
    identity: Arc<IdentitySession>,
    mutator: CalculationService,
    slot: SubscriptionSlot,
    events_tx: Sender<UiEvent>,
    events_rx: Receiver<UiEvent>,
    auth_subscription: Option<AuthSubscription>,
    subject: Option<SubjectId>,
    subject_applied: bool,
    records: Vec<CalculationRecord>,
    loading: bool,
    form: FormState,
    edit: EditState,
}

impl CalculatorController {
    pub fn new(client: &ClientContext) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            identity: client.identity(),
            mutator: client.mutator(),
            slot: SubscriptionSlot::new(client.feed()),
            events_tx,
            events_rx,
            auth_subscription: None,
            subject: None,
            subject_applied: false,
            records: Vec::new(),
            loading: true,
            form: FormState::default(),
            edit: EditState::Viewing,
        }
    }

    /// Attaches the identity observer, starts sign-in and applies whatever
    /// arrived. Calling it on a mounted controller does nothing.
    pub fn mount(&mut self) {
        if self.auth_subscription.is_some() {
            return;
        }
        let tx = self.events_tx.clone();
        let listener: AuthListener = Arc::new(move |subject: Option<SubjectId>| {
            let _ = tx.send(UiEvent::AuthChanged(subject));
        });
        self.auth_subscription = Some(self.identity.on_auth_state_changed(listener));
        info!("event=view_mount module=view status=start");

        self.identity.start();
        self.pump();
    }

    /// Releases both subscriptions and drops queued events.
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.auth_subscription.take() {
            subscription.unsubscribe();
        }
        self.slot.reset();
        while self.events_rx.try_recv().is_ok() {}
        self.subject_applied = false;
        info!("event=view_unmount module=view status=ok");
    }

    pub fn is_mounted(&self) -> bool {
        self.auth_subscription.is_some()
    }

    /// Applies every queued event. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::AuthChanged(subject) => self.on_subject(subject),
            UiEvent::Snapshot {
                generation,
                records,
            } => {
                if !self.is_current(generation) {
                    debug!("event=snapshot_apply module=view status=skipped generation={generation}");
                    return;
                }
                if let EditState::Editing { id, .. } = &self.edit {
                    if !records.iter().any(|record| &record.id == id) {
                        self.edit = EditState::Viewing;
                    }
                }
                self.records = records;
                self.loading = false;
            }
            UiEvent::SnapshotFailed { generation } => {
                if self.is_current(generation) {
                    self.loading = false;
                }
            }
        }
    }

    // Closing a subscription always clears the subject or bumps the
    // generation, so this also rejects events queued before a close.
    fn is_current(&self, generation: u64) -> bool {
        self.slot.subject().is_some() && self.slot.generation() == generation
    }

    fn on_subject(&mut self, subject: Option<SubjectId>) {
        let changed = self.subject != subject;
        if !changed && self.subject_applied {
            return;
        }
        self.subject_applied = true;
        if changed {
            self.subject = subject;
            self.records.clear();
            self.edit = EditState::Viewing;
        }

        let Some(subject) = self.subject.clone() else {
            self.slot.on_subject_change(None, |_| noop_sink());
            self.loading = false;
            return;
        };

        self.loading = true;
        let tx = self.events_tx.clone();
        let change = self.slot.on_subject_change(Some(&subject), move |generation| {
            let sink: FeedSink = Arc::new(move |event: FeedEvent| {
                let ui_event = match event {
                    FeedEvent::Snapshot(records) => UiEvent::Snapshot {
                        generation,
                        records,
                    },
                    FeedEvent::Failed(_) => UiEvent::SnapshotFailed { generation },
                };
                let _ = tx.send(ui_event);
            });
            sink
        });
        if let SlotChange::Failed { .. } = change {
            self.loading = false;
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.form.name = name.into();
    }

    pub fn set_num1(&mut self, value: impl Into<Operand>) {
        self.form.num1 = value.into();
    }

    pub fn set_num2(&mut self, value: impl Into<Operand>) {
        self.form.num2 = value.into();
    }

    /// Creates a record from the form.
    ///
    /// Gated only by a non-empty name and a present subject. The form resets
    /// to `("", 0, 0)` on success and is kept on failure.
    pub fn submit(&mut self) -> ActionOutcome {
        let Some(subject) = self.subject.as_ref() else {
            return ActionOutcome::Skipped;
        };
        if self.form.name.is_empty() {
            return ActionOutcome::Skipped;
        }

        let draft = NewCalculation::new(
            self.form.name.clone(),
            self.form.num1.clone(),
            self.form.num2.clone(),
        );
        match self.mutator.create(subject, draft) {
            Ok(_) => {
                self.form = FormState::default();
                ActionOutcome::Applied
            }
            Err(_) => ActionOutcome::Failed,
        }
    }

    pub fn delete(&mut self, id: &CalculationId) -> ActionOutcome {
        let Some(subject) = self.subject.as_ref() else {
            return ActionOutcome::Skipped;
        };
        match self.mutator.delete(subject, id) {
            Ok(()) => ActionOutcome::Applied,
            Err(_) => ActionOutcome::Failed,
        }
    }

    /// Puts `id` into edit mode seeded with its current name. Any other
    /// record in edit mode loses its draft.
    pub fn start_edit(&mut self, id: &CalculationId) -> ActionOutcome {
        let Some(record) = self.records.iter().find(|record| &record.id == id) else {
            return ActionOutcome::Skipped;
        };
        self.edit = EditState::Editing {
            id: record.id.clone(),
            draft: record.name.clone(),
        };
        ActionOutcome::Applied
    }

    pub fn set_edit_name(&mut self, name: impl Into<String>) {
        if let EditState::Editing { draft, .. } = &mut self.edit {
            *draft = name.into();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit = EditState::Viewing;
    }

    /// Renames the record in edit mode; edit mode ends only on success.
    pub fn save_edit(&mut self) -> ActionOutcome {
        let Some(subject) = self.subject.as_ref() else {
            return ActionOutcome::Skipped;
        };
        let EditState::Editing { id, draft } = &self.edit else {
            return ActionOutcome::Skipped;
        };
        match self.mutator.rename(subject, id, draft) {
            Ok(()) => {
                self.edit = EditState::Viewing;
                ActionOutcome::Applied
            }
            Err(_) => ActionOutcome::Failed,
        }
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    pub fn records(&self) -> &[CalculationRecord] {
        &self.records
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn edit_state(&self) -> &EditState {
        &self.edit
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn list_status(&self) -> ListStatus {
        if self.loading {
            ListStatus::Loading
        } else if self.subject.is_none() {
            ListStatus::Authenticating
        } else if self.records.is_empty() {
            ListStatus::Empty
        } else {
            ListStatus::Ready
        }
    }

    pub fn view_model(&self) -> ViewModel {
        let items = self
            .records
            .iter()
            .map(|record| {
                let mode = match &self.edit {
                    EditState::Editing { id, draft } if id == &record.id => ItemMode::Editing {
                        draft: draft.clone(),
                    },
                    _ => ItemMode::Viewing,
                };
                ItemView {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    equation: record.equation(),
                    mode,
                }
            })
            .collect();

        ViewModel {
            subject: self.subject.clone(),
            form: self.form.clone(),
            status: self.list_status(),
            items,
        }
    }
}

impl Drop for CalculatorController {
    fn drop(&mut self) {
        if self.is_mounted() {
            self.unmount();
        }
    }
}

fn noop_sink() -> FeedSink {
    Arc::new(|_event: FeedEvent| {})
}

#[cfg(test)]
mod tests {
    use super::{ActionOutcome, CalculatorController, EditState, UiEvent};
    use crate::client::ClientContext;
    use crate::config::{AppCredentials, ClientConfig};
    use crate::model::calculation::CalculationId;
    use crate::model::subject::SubjectId;
    use crate::view::render::ListStatus;

    fn mounted() -> CalculatorController {
        let client = ClientContext::open(ClientConfig::new(AppCredentials::default())).unwrap();
        let mut controller = CalculatorController::new(&client);
        controller.mount();
        controller
    }

    #[test]
    fn mount_signs_in_and_reaches_empty_list() {
        let controller = mounted();
        assert!(controller.subject().is_some());
        assert!(!controller.is_loading());
        assert_eq!(controller.list_status(), ListStatus::Empty);
    }

    #[test]
    fn snapshot_from_superseded_generation_is_dropped() {
        let mut controller = mounted();
        let stale = controller.slot.generation() - 1;
        controller
            .events_tx
            .send(UiEvent::Snapshot {
                generation: stale,
                records: Vec::new(),
            })
            .unwrap();
        controller.set_name("keep");
        assert_eq!(controller.submit(), ActionOutcome::Applied);
        controller.pump();
        assert_eq!(controller.records().len(), 1);
    }

    #[test]
    fn subject_change_clears_edit_and_records() {
        let mut controller = mounted();
        controller.set_name("A");
        controller.submit();
        controller.pump();
        let id = controller.records()[0].id.clone();
        controller.start_edit(&id);

        controller
            .events_tx
            .send(UiEvent::AuthChanged(Some(SubjectId::new("someone-else"))))
            .unwrap();
        controller.pump();

        assert_eq!(controller.edit_state(), &EditState::Viewing);
        assert_eq!(controller.list_status(), ListStatus::Empty);
    }

    #[test]
    fn start_edit_on_unknown_id_is_skipped() {
        let mut controller = mounted();
        assert_eq!(
            controller.start_edit(&CalculationId::new("missing")),
            ActionOutcome::Skipped
        );
        assert_eq!(controller.save_edit(), ActionOutcome::Skipped);
    }
}
