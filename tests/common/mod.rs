//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sos_cache::application::repos::{ContentStore, DatasetCriterion, RepoError, StoreSession};
use sos_cache::domain::entities::{
    DatasetRecord, FeatureRecord, ObservablePropertyRecord, OfferingRecord, ProcedureRecord,
    ResultTemplateRecord,
};
use sos_cache::domain::geometry::Geometry;
use sos_cache::domain::types::{DatasetType, ObservationType};
use sos_cache::infra::memory::{ContentArchive, MemoryStore};
use time::OffsetDateTime;

pub fn offering(identifier: &str) -> OfferingRecord {
    OfferingRecord {
        identifier: identifier.to_string(),
        name: Some(format!("{identifier} name")),
        description: None,
        translations: Vec::new(),
        parents: Vec::new(),
        geometry: None,
        phenomenon_time: None,
        result_time: None,
    }
}

pub fn procedure(identifier: &str) -> ProcedureRecord {
    ProcedureRecord {
        identifier: identifier.to_string(),
        name: None,
        description: None,
        translations: Vec::new(),
        parents: Vec::new(),
        description_format: Some("http://www.opengis.net/sensorml/2.0".to_string()),
        type_of: None,
        is_type: false,
        is_aggregation: false,
    }
}

pub fn property(identifier: &str) -> ObservablePropertyRecord {
    ObservablePropertyRecord {
        identifier: identifier.to_string(),
        name: None,
        description: None,
        translations: Vec::new(),
        children: Vec::new(),
    }
}

pub fn feature(identifier: &str, geometry: Option<Geometry>) -> FeatureRecord {
    FeatureRecord {
        identifier: identifier.to_string(),
        name: None,
        description: None,
        translations: Vec::new(),
        feature_type: Some(
            "http://www.opengis.net/def/samplingFeatureType/OGC-OM/2.0/SF_SamplingPoint"
                .to_string(),
        ),
        parents: Vec::new(),
        geometry,
    }
}

pub fn result_template(
    identifier: &str,
    offering: &str,
    procedure: &str,
    property: &str,
) -> ResultTemplateRecord {
    ResultTemplateRecord {
        identifier: identifier.to_string(),
        offering: offering.to_string(),
        procedure: procedure.to_string(),
        observable_property: property.to_string(),
        features: Vec::new(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn dataset(
    id: i64,
    offering: &str,
    procedure: &str,
    property: &str,
    feature: Option<(&str, Geometry)>,
    first: Option<OffsetDateTime>,
    last: Option<OffsetDateTime>,
) -> DatasetRecord {
    DatasetRecord {
        id,
        offering: offering.to_string(),
        procedure: procedure.to_string(),
        observable_property: property.to_string(),
        feature: feature.as_ref().map(|(id, _)| id.to_string()),
        feature_type: None,
        feature_geometry: feature.map(|(_, geometry)| geometry),
        dataset_type: DatasetType::Timeseries,
        observation_type: Some(ObservationType::Measurement),
        published: true,
        hidden: false,
        first_value_at: first,
        last_value_at: last,
        result_time: None,
    }
}

/// Wraps a [`MemoryStore`] and injects failures into chosen calls.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    /// Dataset queries for this offering time out.
    pub fail_offering_datasets: Option<String>,
    /// Loading this procedure panics inside the worker.
    pub panic_on_procedure: Option<String>,
    /// Loading features fails with a persistence error.
    pub fail_features: AtomicBool,
    /// Enumerating procedures fails.
    pub fail_procedure_enumeration: bool,
    pub sessions: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(archive: ContentArchive) -> Self {
        Self {
            inner: MemoryStore::new(archive),
            ..Self::default()
        }
    }

    pub fn set_fail_features(&self, fail: bool) {
        self.fail_features.store(fail, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl ContentStore for ScriptedStore {
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, RepoError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            inner: self.inner.open_session()?,
            script: self,
        }))
    }
}

struct ScriptedSession<'a> {
    inner: Box<dyn StoreSession + 'a>,
    script: &'a ScriptedStore,
}

impl StoreSession for ScriptedSession<'_> {
    fn offering_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        self.inner.offering_identifiers()
    }

    fn procedure_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        if self.script.fail_procedure_enumeration {
            return Err(RepoError::Unavailable("procedure table locked".into()));
        }
        self.inner.procedure_identifiers()
    }

    fn offering(&mut self, identifier: &str) -> Result<Option<OfferingRecord>, RepoError> {
        self.inner.offering(identifier)
    }

    fn procedure(&mut self, identifier: &str) -> Result<Option<ProcedureRecord>, RepoError> {
        if self.script.panic_on_procedure.as_deref() == Some(identifier) {
            panic!("corrupt procedure row for {identifier}");
        }
        self.inner.procedure(identifier)
    }

    fn observable_properties(&mut self) -> Result<Vec<ObservablePropertyRecord>, RepoError> {
        self.inner.observable_properties()
    }

    fn features(&mut self) -> Result<Vec<FeatureRecord>, RepoError> {
        if self.script.fail_features.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("relation \"features\" does not exist"));
        }
        self.inner.features()
    }

    fn result_templates(&mut self) -> Result<Vec<ResultTemplateRecord>, RepoError> {
        self.inner.result_templates()
    }

    fn datasets(&mut self, criterion: &DatasetCriterion) -> Result<Vec<DatasetRecord>, RepoError> {
        let failing = self.script.fail_offering_datasets.as_deref();
        if matches!(criterion, DatasetCriterion::Offering(id) if Some(id.as_str()) == failing) {
            return Err(RepoError::Timeout);
        }
        self.inner.datasets(criterion)
    }
}
