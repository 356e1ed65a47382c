//! Storage collaborator traits describing persistence adapters.
//!
//! The cache engine never holds a storage handle across threads: a
//! [`ContentStore`] is shared, and every worker opens its own
//! [`StoreSession`] on its own thread. Sessions are intentionally not
//! `Send`.

use std::fmt;

use thiserror::Error;

use crate::cache::CacheImage;
use crate::domain::entities::{
    DatasetRecord, FeatureRecord, ObservablePropertyRecord, OfferingRecord, ProcedureRecord,
    ResultTemplateRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("no storage session available: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Filter applied when loading dataset records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetCriterion {
    All,
    Offering(String),
    Procedure(String),
    ObservableProperty(String),
    Feature(String),
}

impl DatasetCriterion {
    pub fn matches(&self, dataset: &DatasetRecord) -> bool {
        match self {
            DatasetCriterion::All => true,
            DatasetCriterion::Offering(id) => dataset.offering == *id,
            DatasetCriterion::Procedure(id) => dataset.procedure == *id,
            DatasetCriterion::ObservableProperty(id) => dataset.observable_property == *id,
            DatasetCriterion::Feature(id) => dataset.feature.as_deref() == Some(id.as_str()),
        }
    }
}

impl fmt::Display for DatasetCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetCriterion::All => f.write_str("all datasets"),
            DatasetCriterion::Offering(id) => write!(f, "datasets of offering `{id}`"),
            DatasetCriterion::Procedure(id) => write!(f, "datasets of procedure `{id}`"),
            DatasetCriterion::ObservableProperty(id) => {
                write!(f, "datasets of observable property `{id}`")
            }
            DatasetCriterion::Feature(id) => write!(f, "datasets of feature `{id}`"),
        }
    }
}

/// Shared factory of storage sessions.
pub trait ContentStore: Send + Sync {
    /// Opens a session bound to the calling thread.
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, RepoError>;
}

/// A single-threaded view of the store.
pub trait StoreSession {
    fn offering_identifiers(&mut self) -> Result<Vec<String>, RepoError>;
    fn procedure_identifiers(&mut self) -> Result<Vec<String>, RepoError>;
    fn offering(&mut self, identifier: &str) -> Result<Option<OfferingRecord>, RepoError>;
    fn procedure(&mut self, identifier: &str) -> Result<Option<ProcedureRecord>, RepoError>;
    fn observable_properties(&mut self) -> Result<Vec<ObservablePropertyRecord>, RepoError>;
    fn features(&mut self) -> Result<Vec<FeatureRecord>, RepoError>;
    fn result_templates(&mut self) -> Result<Vec<ResultTemplateRecord>, RepoError>;
    fn datasets(&mut self, criterion: &DatasetCriterion) -> Result<Vec<DatasetRecord>, RepoError>;
}

/// Durable home of the published snapshot.
pub trait SnapshotRepo: Send + Sync {
    fn save(&self, image: &CacheImage) -> Result<(), RepoError>;
    /// `Ok(None)` when nothing was persisted yet.
    fn load(&self) -> Result<Option<CacheImage>, RepoError>;
}
