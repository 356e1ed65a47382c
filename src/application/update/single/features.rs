use std::collections::BTreeMap;
use std::convert::Infallible;

use tracing::debug;

use crate::application::repos::DatasetCriterion;
use crate::application::update::UpdateContext;
use crate::application::update::support::{
    ancestor_closure, group_datasets, record_hierarchy, record_names,
};
use crate::cache::Relation;
use crate::domain::{entities::is_published, types::EntityKind};

use super::{SingleEntityUpdate, UpdateSummary, recorded};

const KIND: EntityKind = EntityKind::FeatureOfInterest;

/// Features of interest: names, publication, the feature hierarchy, the
/// procedures observing each feature and the SRIDs in use.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureUpdate;

impl SingleEntityUpdate for FeatureUpdate {
    fn name(&self) -> &'static str {
        "features"
    }

    fn entity_kind(&self) -> EntityKind {
        KIND
    }

    fn execute(&self, ctx: &UpdateContext<'_>) -> UpdateSummary {
        let Some(mut session) = recorded(ctx, KIND, "open_session", ctx.store.open_session())
        else {
            return UpdateSummary::default();
        };
        let Some(features) = recorded(ctx, KIND, "load_features", session.features()) else {
            return UpdateSummary::default();
        };
        // Without datasets the publication state is unknown; leave it unset.
        let datasets = recorded(
            ctx,
            KIND,
            "load_datasets",
            session.datasets(&DatasetCriterion::All),
        );
        drop(session);

        let by_feature = datasets
            .as_deref()
            .map(|datasets| group_datasets(datasets, |dataset| dataset.feature.as_deref()));
        let parents: BTreeMap<&str, &[String]> = features
            .iter()
            .map(|feature| (feature.identifier.as_str(), feature.parents.as_slice()))
            .collect();
        let normalizer = ctx.config.axis_normalizer();

        for feature in &features {
            let identifier = feature.identifier.as_str();
            ctx.cache.add_entity(KIND, identifier);
            record_names(
                ctx.cache,
                ctx.config,
                KIND,
                identifier,
                feature.name.as_deref(),
                feature.description.as_deref(),
                &feature.translations,
            );

            if let Some(grouped) = &by_feature {
                let own = grouped.get(identifier).map(Vec::as_slice).unwrap_or_default();
                if is_published(own.iter().copied()) {
                    ctx.cache.add_published(KIND, identifier);
                }
                ctx.cache.relate_all(
                    Relation::FeatureProcedures,
                    identifier,
                    own.iter().map(|dataset| dataset.procedure.as_str()),
                );
            }

            let ancestors = ancestor_closure(identifier, &feature.parents, |parent| {
                Ok::<_, Infallible>(parents.get(parent).map(|p| p.to_vec()).unwrap_or_default())
            })
            .unwrap_or_else(|never| match never {});
            record_hierarchy(
                ctx.cache,
                Relation::FeatureParents,
                Relation::FeatureChildren,
                identifier,
                &ancestors,
            );

            if let Some(geometry) = feature.geometry.as_ref().filter(|g| !g.is_empty()) {
                ctx.cache.add_srid(normalizer.srid_of(geometry));
            }
        }

        debug!(features = features.len(), "Cached features of interest");
        UpdateSummary {
            instances: features.len(),
            enumerated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::application::update::ErrorCollector;
    use crate::cache::{CacheConfig, ContentCache, ReadableCache};
    use crate::domain::entities::{FeatureRecord, fixtures::dataset};
    use crate::domain::geometry::Geometry;
    use crate::infra::memory::{ContentArchive, MemoryStore};

    use super::*;

    fn feature(identifier: &str, parents: &[&str]) -> FeatureRecord {
        FeatureRecord {
            identifier: identifier.to_string(),
            name: None,
            description: None,
            translations: Vec::new(),
            feature_type: None,
            parents: parents.iter().map(|p| p.to_string()).collect(),
            geometry: None,
        }
    }

    #[test]
    fn features_get_closure_procedures_and_publication() {
        let mut station = feature("urn:station", &["urn:river"]);
        station.geometry = Some(Geometry::point(31467, 3.0, 4.0));
        let mut hidden = dataset(1, "o", "p-hidden", "op");
        hidden.feature = Some("urn:basin".into());
        hidden.published = false;
        let mut observed = dataset(2, "o", "p1", "op");
        observed.feature = Some("urn:station".into());

        let store = MemoryStore::new(ContentArchive {
            features: vec![
                station,
                feature("urn:river", &["urn:basin"]),
                feature("urn:basin", &[]),
            ],
            datasets: vec![hidden, observed],
            ..ContentArchive::default()
        });
        let cache = ContentCache::new();
        let errors = ErrorCollector::new();
        let config = CacheConfig::default();
        let summary = FeatureUpdate.execute(&UpdateContext {
            store: &store,
            cache: &cache,
            errors: &errors,
            config: &config,
        });

        assert_eq!(summary, UpdateSummary { instances: 3, enumerated: true });
        assert!(errors.is_empty());
        assert_eq!(
            cache.related(Relation::FeatureParents, "urn:station"),
            BTreeSet::from(["urn:river".to_string(), "urn:basin".to_string()])
        );
        assert!(cache.related(Relation::FeatureChildren, "urn:basin").contains("urn:station"));
        assert_eq!(
            cache.related(Relation::FeatureProcedures, "urn:station"),
            BTreeSet::from(["p1".to_string()])
        );
        // No datasets at all: published by default.
        assert!(cache.is_published(KIND, "urn:river"));
        assert!(cache.is_published(KIND, "urn:station"));
        assert!(!cache.is_published(KIND, "urn:basin"));
        assert!(cache.srids().contains(&31467));
        assert_eq!(cache.display_name(KIND, "urn:river").as_deref(), Some("river"));
    }
}
