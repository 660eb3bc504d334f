//! Subject-scoped subscription slot.
//!
//! Holds at most one record subscription and swaps it whenever the subject
//! changes: the old subscription is closed before a new one opens, so no
//! subscription scoped to a stale identity outlives the change.

use crate::model::subject::SubjectId;
use crate::repo::calculation_repo::{CalculationFeed, FeedSink, RecordSubscription};
use log::info;

/// Outcome of [`SubscriptionSlot::on_subject_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// Same subject as before; nothing was touched.
    Unchanged,
    /// Subject became absent; the previous subscription (if any) was closed.
    Closed,
    /// A subscription for the new subject is open under `generation`.
    Opened { generation: u64 },
    /// Opening failed; the failure was already reported.
    Failed { generation: u64 },
}

pub struct SubscriptionSlot {
    feed: CalculationFeed,
    current: Option<RecordSubscription>,
    subject: Option<SubjectId>,
    generation: u64,
}

impl SubscriptionSlot {
    pub fn new(feed: CalculationFeed) -> Self {
        Self {
            feed,
            current: None,
            subject: None,
            generation: 0,
        }
    }

    /// Re-scopes the slot to `subject`.
    ///
    /// `make_sink` receives the generation number of the subscription about
    /// to open so that deliveries can be tagged and stale ones discarded.
    pub fn on_subject_change(
        &mut self,
        subject: Option<&SubjectId>,
        make_sink: impl FnOnce(u64) -> FeedSink,
    ) -> SlotChange {
        if self.subject.as_ref() == subject {
            return SlotChange::Unchanged;
        }

        self.close();
        self.subject = subject.cloned();
        let Some(subject) = subject else {
            return SlotChange::Closed;
        };

        self.generation += 1;
        let generation = self.generation;
        match self.feed.subscribe(subject, make_sink(generation)) {
            Ok(subscription) => {
                info!(
                    "event=records_subscribe module=repo status=ok generation={generation}"
                );
                self.current = Some(subscription);
                SlotChange::Opened { generation }
            }
            Err(_) => SlotChange::Failed { generation },
        }
    }

    /// Closes the current subscription, if any.
    ///
    /// The remembered subject is kept; use `on_subject_change(None, ..)` to
    /// forget it.
    pub fn close(&mut self) {
        if let Some(subscription) = self.current.take() {
            subscription.close();
            info!(
                "event=records_unsubscribe module=repo status=ok generation={}",
                self.generation
            );
        }
    }

    /// Closes the subscription and forgets the subject.
    pub fn reset(&mut self) {
        self.close();
        self.subject = None;
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    /// Generation of the most recently opened subscription.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(RecordSubscription::is_open)
    }
}
