//! Structured failures recorded during a rebuild.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::application::repos::RepoError;
use crate::cache::lock::mutex_lock;
use crate::domain::types::EntityKind;

const SOURCE: &str = "application::update::error";
const METRIC_UPDATE_FAILURES: &str = "sos_cache_update_failures_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Query or connection error.
    Storage,
    /// Dangling relationship reference.
    DataInconsistency,
    /// Unexpected absent value, timeout or panic during aggregation.
    Aggregation,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Storage => "storage",
            FailureClass::DataInconsistency => "data_inconsistency",
            FailureClass::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause of one recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateFailure {
    #[error(transparent)]
    Storage(#[from] RepoError),
    #[error("{kind} `{identifier}` is not present in the store")]
    Missing { kind: EntityKind, identifier: String },
    #[error("referenced through {relations} but does not exist")]
    Dangling { relations: String },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("no worker left to run the task")]
    NoWorker,
    #[error("worker pool could not be started: {0}")]
    Pool(String),
}

impl UpdateFailure {
    pub fn class(&self) -> FailureClass {
        match self {
            UpdateFailure::Storage(_) => FailureClass::Storage,
            UpdateFailure::Dangling { .. } => FailureClass::DataInconsistency,
            UpdateFailure::Missing { .. }
            | UpdateFailure::InvalidRecord(_)
            | UpdateFailure::DeadlineExceeded(_)
            | UpdateFailure::Panicked(_)
            | UpdateFailure::NoWorker
            | UpdateFailure::Pool(_) => FailureClass::Aggregation,
        }
    }
}

/// A failure with enough context to act on: which entity, which step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{operation} failed for {entity_kind} {}: {cause}",
    .identifier.as_deref().unwrap_or("(all)")
)]
pub struct CacheUpdateError {
    pub class: FailureClass,
    pub entity_kind: EntityKind,
    pub identifier: Option<String>,
    pub operation: &'static str,
    #[source]
    pub cause: UpdateFailure,
}

impl CacheUpdateError {
    pub fn new(
        entity_kind: EntityKind,
        identifier: Option<&str>,
        operation: &'static str,
        cause: impl Into<UpdateFailure>,
    ) -> Self {
        let cause = cause.into();
        Self {
            class: cause.class(),
            entity_kind,
            identifier: identifier.map(str::to_string),
            operation,
            cause,
        }
    }

    /// A failure of a whole phase rather than one instance.
    pub fn for_kind(
        entity_kind: EntityKind,
        operation: &'static str,
        cause: impl Into<UpdateFailure>,
    ) -> Self {
        Self::new(entity_kind, None, operation, cause)
    }
}

/// Thread-safe, append-only collection of recorded failures.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<CacheUpdateError>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: CacheUpdateError) {
        warn!(
            class = error.class.as_str(),
            entity_kind = error.entity_kind.as_str(),
            identifier = error.identifier.as_deref().unwrap_or(""),
            operation = error.operation,
            error = %error.cause,
            "Content cache update failed"
        );
        counter!(METRIC_UPDATE_FAILURES, "class" => error.class.as_str()).increment(1);
        mutex_lock(&self.errors, SOURCE, "record").push(error);
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.errors, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<CacheUpdateError> {
        mutex_lock(&self.errors, SOURCE, "snapshot").clone()
    }

    /// Identifiers of `kind` whose own update recorded a failure.
    pub fn failed_identifiers(&self, kind: EntityKind) -> BTreeSet<String> {
        mutex_lock(&self.errors, SOURCE, "failed_identifiers")
            .iter()
            .filter(|error| error.entity_kind == kind)
            .filter_map(|error| error.identifier.clone())
            .collect()
    }

    /// Kinds whose update failed as a whole, e.g. enumeration errors.
    pub fn failed_kinds(&self) -> BTreeSet<EntityKind> {
        mutex_lock(&self.errors, SOURCE, "failed_kinds")
            .iter()
            .filter(|error| error.identifier.is_none())
            .map(|error| error.entity_kind)
            .collect()
    }

    pub fn into_inner(self) -> Vec<CacheUpdateError> {
        self.errors
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_follows_cause() {
        let storage = CacheUpdateError::new(
            EntityKind::Offering,
            Some("A"),
            "load_datasets",
            RepoError::Timeout,
        );
        assert_eq!(storage.class, FailureClass::Storage);

        let timeout = CacheUpdateError::new(
            EntityKind::Procedure,
            Some("P"),
            "execute",
            UpdateFailure::DeadlineExceeded(Duration::from_secs(1)),
        );
        assert_eq!(timeout.class, FailureClass::Aggregation);
    }

    #[test]
    fn display_names_instance_and_operation() {
        let error = CacheUpdateError::new(
            EntityKind::Procedure,
            Some("urn:p"),
            "load_procedure",
            UpdateFailure::Missing {
                kind: EntityKind::Procedure,
                identifier: "urn:p".into(),
            },
        );
        assert_eq!(
            error.to_string(),
            "load_procedure failed for procedure urn:p: procedure `urn:p` is not present in the store"
        );

        let phase = CacheUpdateError::for_kind(
            EntityKind::FeatureOfInterest,
            "enumerate",
            RepoError::Timeout,
        );
        assert_eq!(
            phase.to_string(),
            "enumerate failed for feature_of_interest (all): database timeout"
        );
    }

    #[test]
    fn collector_tracks_failed_identifiers() {
        let collector = ErrorCollector::new();
        collector.record(CacheUpdateError::new(
            EntityKind::Procedure,
            Some("P"),
            "execute",
            UpdateFailure::Panicked("boom".into()),
        ));
        collector.record(CacheUpdateError::for_kind(
            EntityKind::Procedure,
            "enumerate",
            RepoError::Timeout,
        ));
        assert_eq!(collector.len(), 2);
        assert_eq!(
            collector.failed_identifiers(EntityKind::Procedure),
            BTreeSet::from(["P".to_string()])
        );
        assert!(collector.failed_identifiers(EntityKind::Offering).is_empty());
        assert_eq!(collector.into_inner().len(), 2);
    }
}
