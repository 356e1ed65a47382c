//! In-memory content store, loaded from a TOML archive.
//!
//! Used for demos, tests and deployments that ship a static catalogue
//! instead of a database.

use std::{fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::application::repos::{ContentStore, DatasetCriterion, RepoError, StoreSession};
use crate::domain::entities::{
    DatasetRecord, FeatureRecord, ObservablePropertyRecord, OfferingRecord, ProcedureRecord,
    ResultTemplateRecord,
};

use super::error::InfraError;

/// Every record the store serves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentArchive {
    pub offerings: Vec<OfferingRecord>,
    pub procedures: Vec<ProcedureRecord>,
    pub observable_properties: Vec<ObservablePropertyRecord>,
    pub features: Vec<FeatureRecord>,
    pub result_templates: Vec<ResultTemplateRecord>,
    pub datasets: Vec<DatasetRecord>,
}

impl ContentArchive {
    pub fn from_toml_str(data: &str) -> Result<Self, InfraError> {
        toml::from_str(data).map_err(|err| InfraError::archive(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, InfraError> {
        toml::to_string_pretty(self).map_err(|err| InfraError::archive(err.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    archive: Arc<ContentArchive>,
}

impl MemoryStore {
    pub fn new(archive: ContentArchive) -> Self {
        Self {
            archive: Arc::new(archive),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, InfraError> {
        let data =
            fs::read_to_string(path).map_err(|err| InfraError::archive_read(path, err))?;
        Ok(Self::new(ContentArchive::from_toml_str(&data)?))
    }

    pub fn archive(&self) -> &ContentArchive {
        &self.archive
    }
}

impl ContentStore for MemoryStore {
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, RepoError> {
        Ok(Box::new(MemorySession {
            archive: &self.archive,
        }))
    }
}

struct MemorySession<'a> {
    archive: &'a ContentArchive,
}

fn find<'a, T: Clone>(
    records: &'a [T],
    identifier: &str,
    id_of: impl Fn(&'a T) -> &'a str,
) -> Option<T> {
    records
        .iter()
        .find(|record| id_of(record) == identifier)
        .cloned()
}

impl StoreSession for MemorySession<'_> {
    fn offering_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        Ok(self
            .archive
            .offerings
            .iter()
            .map(|offering| offering.identifier.clone())
            .collect())
    }

    fn procedure_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        Ok(self
            .archive
            .procedures
            .iter()
            .map(|procedure| procedure.identifier.clone())
            .collect())
    }

    fn offering(&mut self, identifier: &str) -> Result<Option<OfferingRecord>, RepoError> {
        Ok(find(&self.archive.offerings, identifier, |o| o.identifier.as_str()))
    }

    fn procedure(&mut self, identifier: &str) -> Result<Option<ProcedureRecord>, RepoError> {
        Ok(find(&self.archive.procedures, identifier, |p| p.identifier.as_str()))
    }

    fn observable_properties(&mut self) -> Result<Vec<ObservablePropertyRecord>, RepoError> {
        Ok(self.archive.observable_properties.clone())
    }

    fn features(&mut self) -> Result<Vec<FeatureRecord>, RepoError> {
        Ok(self.archive.features.clone())
    }

    fn result_templates(&mut self) -> Result<Vec<ResultTemplateRecord>, RepoError> {
        Ok(self.archive.result_templates.clone())
    }

    fn datasets(&mut self, criterion: &DatasetCriterion) -> Result<Vec<DatasetRecord>, RepoError> {
        Ok(self
            .archive
            .datasets
            .iter()
            .filter(|dataset| criterion.matches(dataset))
            .cloned()
            .collect())
    }
}
