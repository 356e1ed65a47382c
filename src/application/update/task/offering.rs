use std::collections::BTreeSet;

use crate::application::repos::{ContentStore, DatasetCriterion, StoreSession};
use crate::application::update::error::{CacheUpdateError, UpdateFailure};
use crate::application::update::support::{
    ancestor_closure, record_hierarchy, record_names, validate_dataset,
};
use crate::cache::{CacheConfig, ContentCache, Relation};
use crate::domain::{
    entities::{DatasetRecord, OfferingRecord, is_published},
    extent::{TimeRange, covering},
    types::{EntityKind, ProcedureFlag},
};

use super::{UpdateTask, build_local, with_session};

const KIND: EntityKind = EntityKind::Offering;

/// Aggregates one offering: hierarchy, procedures, properties, features,
/// observation and feature types, envelope and time extents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferingTask {
    identifier: String,
}

/// An offering with everything loaded from storage; no session attached.
#[derive(Debug, Clone)]
pub struct LoadedOffering {
    record: OfferingRecord,
    datasets: Vec<DatasetRecord>,
    ancestors: BTreeSet<String>,
}

impl OfferingTask {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub fn initialize(
        &self,
        session: &mut dyn StoreSession,
    ) -> Result<LoadedOffering, CacheUpdateError> {
        let id = self.identifier.as_str();
        let fail = |operation: &'static str, cause: UpdateFailure| {
            CacheUpdateError::new(KIND, Some(id), operation, cause)
        };

        let record = session
            .offering(id)
            .map_err(|err| fail("load_offering", err.into()))?
            .ok_or_else(|| {
                fail(
                    "load_offering",
                    UpdateFailure::Missing {
                        kind: KIND,
                        identifier: id.to_string(),
                    },
                )
            })?;
        let datasets = session
            .datasets(&DatasetCriterion::Offering(id.to_string()))
            .map_err(|err| fail("load_datasets", err.into()))?;
        let ancestors = ancestor_closure(id, &record.parents, |parent| {
            session
                .offering(parent)
                .map(|found| found.map(|offering| offering.parents).unwrap_or_default())
        })
        .map_err(|err| fail("load_parents", err.into()))?;

        Ok(LoadedOffering {
            record,
            datasets,
            ancestors,
        })
    }
}

impl LoadedOffering {
    pub fn execute(self, cache: &ContentCache, config: &CacheConfig) -> Result<(), CacheUpdateError> {
        let id = self.record.identifier.as_str();
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
            self.record.name.as_deref(),
            self.record.description.as_deref(),
            &self.record.translations,
        );
        record_hierarchy(
            cache,
            Relation::OfferingParents,
            Relation::OfferingChildren,
            id,
            &self.ancestors,
        );

        for dataset in &self.datasets {
            let procedures = match dataset.procedure_flag() {
                ProcedureFlag::Parent => Relation::OfferingProcedures,
                ProcedureFlag::HiddenChild => Relation::OfferingHiddenChildProcedures,
            };
            cache.relate(procedures, id, &dataset.procedure);
            cache.relate(Relation::ProcedureOfferings, &dataset.procedure, id);
            cache.relate(
                Relation::OfferingObservableProperties,
                id,
                &dataset.observable_property,
            );
            cache.relate(
                Relation::ObservablePropertyOfferings,
                &dataset.observable_property,
                id,
            );
            if let Some(feature) = &dataset.feature {
                cache.relate(Relation::OfferingFeatures, id, feature);
                cache.relate(Relation::FeatureOfferings, feature, id);
            }
            if let Some(observation_type) = dataset.observation_type {
                cache.relate(Relation::OfferingObservationTypes, id, observation_type.uri());
            }
            if let Some(feature_type) = &dataset.feature_type {
                cache.relate(Relation::OfferingFeatureTypes, id, feature_type);
            }
        }

        let normalizer = config.axis_normalizer();
        let envelope = match self.record.geometry.as_ref().filter(|g| !g.is_empty()) {
            Some(own) => normalizer.union_envelope([own]),
            None => normalizer.union_envelope(
                self.datasets
                    .iter()
                    .filter_map(|dataset| dataset.feature_geometry.as_ref()),
            ),
        };
        if let Some(envelope) = envelope {
            cache.expand_offering_envelope(id, envelope);
        }

        let observed: Vec<TimeRange> = self
            .datasets
            .iter()
            .filter_map(DatasetRecord::phenomenon_time)
            .collect();
        if let Some(range) = self.record.phenomenon_time.or_else(|| covering(&observed)) {
            cache.expand_offering_phenomenon_time(id, range);
        }
        let result_time = self.record.result_time.or_else(|| {
            covering(
                self.datasets
                    .iter()
                    .filter_map(|dataset| dataset.result_time.as_ref()),
            )
        });
        if let Some(range) = result_time {
            cache.expand_offering_result_time(id, range);
        }
        Ok(())
    }
}

impl UpdateTask for OfferingTask {
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
