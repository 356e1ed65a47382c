use tracing::debug;

use crate::application::repos::DatasetCriterion;
use crate::application::update::UpdateContext;
use crate::application::update::support::{group_datasets, record_names};
use crate::cache::Relation;
use crate::domain::{entities::is_published, types::EntityKind};

use super::{SingleEntityUpdate, UpdateSummary, recorded};

const KIND: EntityKind = EntityKind::ObservableProperty;

/// Observable properties with names, publication and composite membership.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservablePropertyUpdate;

impl SingleEntityUpdate for ObservablePropertyUpdate {
    fn name(&self) -> &'static str {
        "observable_properties"
    }

    fn entity_kind(&self) -> EntityKind {
        KIND
    }

    fn execute(&self, ctx: &UpdateContext<'_>) -> UpdateSummary {
        let Some(mut session) = recorded(ctx, KIND, "open_session", ctx.store.open_session())
        else {
            return UpdateSummary::default();
        };
        let Some(properties) = recorded(
            ctx,
            KIND,
            "load_observable_properties",
            session.observable_properties(),
        ) else {
            return UpdateSummary::default();
        };
        let datasets = recorded(
            ctx,
            KIND,
            "load_datasets",
            session.datasets(&DatasetCriterion::All),
        );
        drop(session);

        let by_property = datasets.as_deref().map(|datasets| {
            group_datasets(datasets, |dataset| Some(dataset.observable_property.as_str()))
        });

        for property in &properties {
            let identifier = property.identifier.as_str();
            ctx.cache.add_entity(KIND, identifier);
            record_names(
                ctx.cache,
                ctx.config,
                KIND,
                identifier,
                property.name.as_deref(),
                property.description.as_deref(),
                &property.translations,
            );
            if let Some(grouped) = &by_property {
                let own = grouped.get(identifier).map(Vec::as_slice).unwrap_or_default();
                if is_published(own.iter().copied()) {
                    ctx.cache.add_published(KIND, identifier);
                }
            }
            ctx.cache
                .relate_all(Relation::CompositeMembers, identifier, &property.children);
            for member in &property.children {
                ctx.cache.relate(Relation::MemberComposites, member, identifier);
            }
        }

        debug!(properties = properties.len(), "Cached observable properties");
        UpdateSummary {
            instances: properties.len(),
            enumerated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::application::update::ErrorCollector;
    use crate::cache::{CacheConfig, ContentCache, ReadableCache};
    use crate::domain::entities::{ObservablePropertyRecord, fixtures::dataset};
    use crate::domain::i18n::LocalizedName;
    use crate::infra::memory::{ContentArchive, MemoryStore};

    use super::*;

    fn property(identifier: &str, children: &[&str]) -> ObservablePropertyRecord {
        ObservablePropertyRecord {
            identifier: identifier.to_string(),
            name: None,
            description: None,
            translations: Vec::new(),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn composites_and_names_are_recorded() {
        let mut weather = property("weather", &["temp", "wind"]);
        weather.translations.push(LocalizedName {
            locale: "ger".into(),
            name: Some("Wetter".into()),
            description: None,
        });
        let mut unpublished = dataset(1, "o", "p", "temp");
        unpublished.published = false;
        let store = MemoryStore::new(ContentArchive {
            observable_properties: vec![weather, property("temp", &[]), property("wind", &[])],
            datasets: vec![unpublished],
            ..ContentArchive::default()
        });
        let cache = ContentCache::new();
        let errors = ErrorCollector::new();
        let config = CacheConfig::default();
        ObservablePropertyUpdate.execute(&UpdateContext {
            store: &store,
            cache: &cache,
            errors: &errors,
            config: &config,
        });

        assert_eq!(
            cache.related(Relation::CompositeMembers, "weather"),
            BTreeSet::from(["temp".to_string(), "wind".to_string()])
        );
        assert_eq!(
            cache.related(Relation::MemberComposites, "wind"),
            BTreeSet::from(["weather".to_string()])
        );
        assert!(!cache.is_published(KIND, "temp"));
        assert!(cache.is_published(KIND, "wind"));
        let names = cache.names(KIND, "weather").expect("names");
        assert_eq!(names.get("ger"), Some("Wetter"));
        assert!(cache.supported_languages().contains("ger"));
    }
}
