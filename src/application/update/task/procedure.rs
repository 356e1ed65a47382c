use std::collections::BTreeSet;

use crate::application::repos::{ContentStore, DatasetCriterion, StoreSession};
use crate::application::update::error::{CacheUpdateError, UpdateFailure};
use crate::application::update::support::{
    ancestor_closure, record_hierarchy, record_names, validate_dataset,
};
use crate::cache::{CacheConfig, ContentCache, Relation};
use crate::domain::{
    entities::{DatasetRecord, ProcedureRecord, is_published},
    extent::covering,
    types::EntityKind,
};

use super::{UpdateTask, build_local, with_session};

const KIND: EntityKind = EntityKind::Procedure;

/// Aggregates one procedure: hierarchy, type/instance links, description
/// formats, observed properties, offerings and phenomenon time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureTask {
    identifier: String,
}

#[derive(Debug, Clone)]
pub struct LoadedProcedure {
    record: ProcedureRecord,
    datasets: Vec<DatasetRecord>,
    ancestors: BTreeSet<String>,
}

impl ProcedureTask {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub fn initialize(
        &self,
        session: &mut dyn StoreSession,
    ) -> Result<LoadedProcedure, CacheUpdateError> {
        let id = self.identifier.as_str();
        let fail = |operation: &'static str, cause: UpdateFailure| {
            CacheUpdateError::new(KIND, Some(id), operation, cause)
        };

        let Some(record) = session
            .procedure(id)
            .map_err(|err| fail("load_procedure", err.into()))?
        else {
            return Err(fail(
                "load_procedure",
                UpdateFailure::Missing {
                    kind: KIND,
                    identifier: id.to_string(),
                },
            ));
        };
        let datasets = session
            .datasets(&DatasetCriterion::Procedure(id.to_string()))
            .map_err(|err| fail("load_datasets", err.into()))?;
        let ancestors = ancestor_closure(id, &record.parents, |parent| {
            session
                .procedure(parent)
                .map(|found| found.map(|procedure| procedure.parents).unwrap_or_default())
        })
        .map_err(|err| fail("load_parents", err.into()))?;

        Ok(LoadedProcedure {
            record,
            datasets,
            ancestors,
        })
    }
}

impl LoadedProcedure {
    pub fn execute(self, cache: &ContentCache, config: &CacheConfig) -> Result<(), CacheUpdateError> {
        let record = &self.record;
        let id = record.identifier.as_str();
        for dataset in &self.datasets {
            validate_dataset(KIND, id, dataset)?;
        }

        cache.add_entity(KIND, id);
        if is_published(&self.datasets) {
            cache.add_published(KIND, id);
        }
        record_names(
            cache,
            config,
            KIND,
            id,
            record.name.as_deref(),
            record.description.as_deref(),
            &record.translations,
        );
        record_hierarchy(
            cache,
            Relation::ProcedureParents,
            Relation::ProcedureChildren,
            id,
            &self.ancestors,
        );

        if let Some(format) = &record.description_format {
            cache.relate(Relation::ProcedureDescriptionFormats, id, format);
        }
        if let Some(type_of) = &record.type_of {
            cache.set_procedure_type_of(id, type_of);
            cache.relate(Relation::ProcedureInstances, type_of, id);
        }
        if record.is_type {
            cache.add_type_procedure(id);
        }
        if record.is_aggregation {
            cache.add_aggregate_procedure(id);
        }

        for dataset in &self.datasets {
            cache.relate(
                Relation::ProcedureObservableProperties,
                id,
                &dataset.observable_property,
            );
            cache.relate(
                Relation::ObservablePropertyProcedures,
                &dataset.observable_property,
                id,
            );
            cache.relate(Relation::ProcedureOfferings, id, &dataset.offering);
        }

        let observed: Vec<_> = self
            .datasets
            .iter()
            .filter_map(DatasetRecord::phenomenon_time)
            .collect();
        if let Some(range) = covering(&observed) {
            cache.expand_procedure_phenomenon_time(id, range);
        }
        Ok(())
    }
}

impl UpdateTask for ProcedureTask {
    fn entity_kind(&self) -> EntityKind {
        KIND
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn run(
        &self,
        store: &dyn ContentStore,
        config: &CacheConfig,
    ) -> Result<ContentCache, CacheUpdateError> {
        let loaded = with_session(store, KIND, &self.identifier, |session| {
            self.initialize(session)
        })?;
        build_local(|cache| loaded.execute(cache, config))
    }
}
