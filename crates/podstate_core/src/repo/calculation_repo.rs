//! Record store client for a subject's calculations.
//!
//! # Responsibility
//! - Open live subscriptions on `/artifacts/{ns}/users/{subject}/calculations`.
//! - Decode every snapshot into the ordered record list the view renders.
//!
//! # Invariants
//! - Each delivery is the full current list; callers replace, never merge.
//! - Listener errors are reported as subscription failures and end the
//!   subscription with `FeedEvent::Failed`.

use crate::events::{FailureKind, FailureReporter};
use crate::model::calculation::{CalculationDocument, CalculationId, CalculationRecord};
use crate::model::subject::SubjectId;
use crate::repo::RepoResult;
use crate::store::{
    partition_path, CollectionPath, DocumentSnapshot, DocumentStore, ListenerRegistration,
    QuerySnapshot, SnapshotListener, StoreResult,
};
use log::{debug, warn};
use serde_json::error::Category;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a feed subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full ordered list after a change.
    Snapshot(Vec<CalculationRecord>),
    /// The subscription ended with an error; nothing follows.
    Failed(String),
}

pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Live reader of one subject's calculations.
#[derive(Clone)]
pub struct CalculationFeed {
    store: Arc<dyn DocumentStore>,
    namespace: String,
    failures: Arc<FailureReporter>,
}

/// An open record subscription; closes on `close` or drop.
pub struct RecordSubscription {
    subject: SubjectId,
    open: Arc<AtomicBool>,
    registration: Option<ListenerRegistration>,
}

impl CalculationFeed {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        namespace: impl Into<String>,
        failures: Arc<FailureReporter>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            failures,
        }
    }

    /// Partition holding `subject`'s records.
    pub fn partition(&self, subject: &SubjectId) -> RepoResult<CollectionPath> {
        Ok(partition_path(&self.namespace, subject)?)
    }

    /// Reads the partition once.
    pub fn fetch(&self, subject: &SubjectId) -> RepoResult<Vec<CalculationRecord>> {
        let partition = self.partition(subject)?;
        let documents = self.store.list_documents(&partition)?;
        Ok(decode_documents(&documents))
    }

    /// Subscribes `sink` to `subject`'s partition.
    ///
    /// The initial snapshot is delivered before this returns.
    pub fn subscribe(&self, subject: &SubjectId, sink: FeedSink) -> RepoResult<RecordSubscription> {
        let open = Arc::new(AtomicBool::new(true));
        let result = self.partition(subject).and_then(|partition| {
            let listener = self.listener(Arc::clone(&open), sink);
            Ok(self.store.on_snapshot(&partition, listener)?)
        });

        match result {
            Ok(registration) => Ok(RecordSubscription {
                subject: subject.clone(),
                open,
                registration: Some(registration),
            }),
            Err(err) => {
                open.store(false, Ordering::SeqCst);
                self.failures.report(
                    FailureKind::Subscription,
                    "subscribe_calculations",
                    err.to_string(),
                );
                Err(err)
            }
        }
    }

    fn listener(&self, open: Arc<AtomicBool>, sink: FeedSink) -> SnapshotListener {
        let failures = Arc::clone(&self.failures);
        Arc::new(move |event: StoreResult<QuerySnapshot>| {
            if !open.load(Ordering::SeqCst) {
                return;
            }
            match event {
                Ok(snapshot) => {
                    let records = decode_documents(&snapshot.documents);
                    debug!(
                        "event=calculations_snapshot module=repo status=ok count={}",
                        records.len()
                    );
                    sink(FeedEvent::Snapshot(records));
                }
                Err(err) => {
                    open.store(false, Ordering::SeqCst);
                    failures.report(
                        FailureKind::Subscription,
                        "calculations_snapshot",
                        err.to_string(),
                    );
                    sink(FeedEvent::Failed(err.to_string()));
                }
            }
        })
    }
}

impl RecordSubscription {
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// False once closed or terminated by an error.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }
}

impl Drop for RecordSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decodes documents in store order, skipping any that do not match the
/// calculation shape.
pub fn decode_documents(documents: &[DocumentSnapshot]) -> Vec<CalculationRecord> {
    documents
        .iter()
        .filter_map(|document| {
            match CalculationDocument::from_fields(document.fields.clone()) {
                Ok(decoded) => Some(CalculationRecord::from_document(
                    CalculationId::new(document.id.clone()),
                    decoded,
                )),
                Err(err) => {
                    warn!(
                        "event=calculation_decode module=repo status=skipped doc_id={} error_category={}",
                        document.id,
                        error_category(&err)
                    );
                    None
                }
            }
        })
        .collect()
}

// Field values never reach the log; serde messages can quote them.
fn error_category(err: &serde_json::Error) -> &'static str {
    match err.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}
