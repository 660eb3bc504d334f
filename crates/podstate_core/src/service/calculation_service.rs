//! Calculation mutations.
//!
//! # Responsibility
//! - Create a record with its result computed once.
//! - Delete a record.
//! - Rename a record with a merge-write of `name` only.
//!
//! # Invariants
//! - Every operation is scoped to one subject's partition.
//! - Failures are reported as write failures before being returned.
//! - Callers observe the effect through the record feed, not through the
//!   return value.

use crate::events::{FailureKind, FailureReporter};
use crate::model::calculation::{CalculationId, NewCalculation};
use crate::model::subject::SubjectId;
use crate::store::{partition_path, DocumentPath, DocumentStore, Fields, StoreError, WriteMode};
use chrono::{SecondsFormat, Utc};
use log::info;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type MutationResult<T> = Result<T, MutationError>;

#[derive(Debug)]
pub enum MutationError {
    Store(StoreError),
    Encoding(serde_json::Error),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Encoding(err) => write!(f, "calculation encoding failed: {err}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Encoding(err) => Some(err),
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<serde_json::Error> for MutationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}

/// Record mutator over one app namespace.
#[derive(Clone)]
pub struct CalculationService {
    store: Arc<dyn DocumentStore>,
    namespace: String,
    failures: Arc<FailureReporter>,
}

impl CalculationService {
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

    /// Stores a new calculation and returns its store-assigned id.
    ///
    /// # Contract
    /// - `result = operand1 + operand2` (floating point), computed here once.
    /// - `createdAt` is the current UTC time in RFC 3339 with milliseconds.
    pub fn create(
        &self,
        subject: &SubjectId,
        draft: NewCalculation,
    ) -> MutationResult<CalculationId> {
        self.reported("create_calculation", || {
            let partition = partition_path(&self.namespace, subject)?;
            let fields = draft.into_document(now_iso8601()).to_fields()?;
            let id = self.store.add_document(&partition, fields)?;
            info!("event=create_calculation module=service status=ok");
            Ok(CalculationId::new(id))
        })
    }

    /// Deletes a calculation. Missing ids succeed silently.
    pub fn delete(&self, subject: &SubjectId, id: &CalculationId) -> MutationResult<()> {
        self.reported("delete_calculation", || {
            self.store.delete_document(&self.document(subject, id)?)?;
            info!("event=delete_calculation module=service status=ok");
            Ok(())
        })
    }

    /// Merges `{name: new_name}` into the record; other fields are untouched.
    pub fn rename(
        &self,
        subject: &SubjectId,
        id: &CalculationId,
        new_name: &str,
    ) -> MutationResult<()> {
        self.reported("rename_calculation", || {
            let mut fields = Fields::new();
            fields.insert("name".to_string(), Value::String(new_name.to_string()));
            self.store
                .set_document(&self.document(subject, id)?, fields, WriteMode::Merge)?;
            info!("event=rename_calculation module=service status=ok");
            Ok(())
        })
    }

    fn document(&self, subject: &SubjectId, id: &CalculationId) -> MutationResult<DocumentPath> {
        let partition = partition_path(&self.namespace, subject)?;
        Ok(partition.document(id.as_str())?)
    }

    fn reported<T>(
        &self,
        operation: &'static str,
        run: impl FnOnce() -> MutationResult<T>,
    ) -> MutationResult<T> {
        run().map_err(|err| {
            self.failures
                .report(FailureKind::Write, operation, err.to_string());
            err
        })
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::now_iso8601;

    #[test]
    fn timestamp_has_millisecond_utc_shape() {
        let stamp = now_iso8601();
        assert_eq!(stamp.len(), "2026-01-01T00:00:00.000Z".len());
        assert!(stamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
